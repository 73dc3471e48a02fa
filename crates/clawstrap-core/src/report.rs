/// A non-fatal condition that the run surfaces but does not stop for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub title: String,
    /// Commands the operator can run to finish the job by hand.
    pub remediation: Vec<String>,
}

impl Advisory {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            remediation: Vec::new(),
        }
    }

    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.remediation.push(cmd.into());
        self
    }
}

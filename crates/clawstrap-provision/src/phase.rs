//! Phase framework: an ordered chain of probe → apply → verify units.
//!
//! Nothing is persisted between runs. Each probe re-derives "already done?"
//! from the live host, so re-running after a partial failure skips whatever
//! landed and resumes at the phase that broke.

use crate::context::InstallContext;
use crate::host::Host;
use async_trait::async_trait;
use clawstrap_core::{Advisory, AppError, Logger};

/// Result of a phase's apply step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The mutation ran; the sequencer verifies next.
    Done,
    /// The phase chose not to act; surfaced as an advisory, not verified.
    Skipped(Advisory),
}

#[async_trait]
pub trait Phase: Send + Sync {
    /// Stable short name used in logs and errors.
    fn name(&self) -> &'static str;

    fn title(&self) -> &'static str;

    fn enabled(&self, _ctx: &InstallContext) -> bool {
        true
    }

    /// Does the desired end state already hold?
    async fn probe(&self, host: &dyn Host, ctx: &InstallContext) -> Result<bool, AppError>;

    async fn apply(&self, host: &dyn Host, ctx: &InstallContext) -> Result<Applied, AppError>;

    /// Re-check after apply; return [`AppError::Verify`] naming what is missing.
    async fn verify(&self, host: &dyn Host, ctx: &InstallContext) -> Result<(), AppError>;
}

/// Fail verification for `phase` unless `ok`.
pub fn ensure(ok: bool, phase: &str, missing: impl Into<String>) -> Result<(), AppError> {
    if ok {
        Ok(())
    } else {
        Err(AppError::Verify {
            phase: phase.to_string(),
            missing: missing.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Satisfied,
    Applied,
    Skipped,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRecord {
    pub name: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct Report {
    pub phases: Vec<PhaseRecord>,
    pub advisories: Vec<Advisory>,
}

impl Report {
    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.phases
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    pub fn applied(&self) -> usize {
        self.phases
            .iter()
            .filter(|r| r.outcome == Outcome::Applied)
            .count()
    }

    pub fn advise(&mut self, advisory: Advisory) {
        self.advisories.push(advisory);
    }
}

pub struct Sequencer {
    phases: Vec<Box<dyn Phase>>,
}

impl Sequencer {
    pub fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        Self { phases }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    /// Run every enabled phase in order. The first failure stops the chain.
    pub async fn run(
        &self,
        host: &dyn Host,
        ctx: &InstallContext,
        log: &Logger,
    ) -> Result<Report, AppError> {
        let mut report = Report::default();
        let enabled: Vec<&dyn Phase> = self
            .phases
            .iter()
            .map(|p| &**p)
            .filter(|p| p.enabled(ctx))
            .collect();
        let total = enabled.len();

        for phase in &self.phases {
            if !phase.enabled(ctx) {
                report.phases.push(PhaseRecord {
                    name: phase.name(),
                    outcome: Outcome::Disabled,
                });
            }
        }

        for (i, phase) in enabled.into_iter().enumerate() {
            let name = phase.name();
            log.step(i + 1, total, phase.title());

            if phase.probe(host, ctx).await.map_err(attribute(name))? {
                log.success(&format!("{name}: already satisfied"));
                report.phases.push(PhaseRecord {
                    name,
                    outcome: Outcome::Satisfied,
                });
                continue;
            }

            let applied = phase.apply(host, ctx).await.map_err(attribute(name))?;

            let outcome = match applied {
                Applied::Done => {
                    phase.verify(host, ctx).await.map_err(attribute(name))?;
                    log.success(&format!("{name}: done"));
                    Outcome::Applied
                }
                Applied::Skipped(advisory) => {
                    log.warn(&format!("{name}: skipped, {}", advisory.title));
                    report.advise(advisory);
                    Outcome::Skipped
                }
            };
            report.phases.push(PhaseRecord { name, outcome });
        }

        Ok(report)
    }
}

/// Tie any stray error to the phase it came from, so it exits as a provisioning failure.
fn attribute(name: &'static str) -> impl Fn(AppError) -> AppError {
    move |e| match e {
        AppError::Provision { .. } | AppError::Verify { .. } => e,
        other => AppError::provision(name, other),
    }
}

//! In-memory [`Host`] for unit tests.
//!
//! Commands are matched by substring against [`Cmd::render`]; the most
//! recently registered rule wins. Unmatched commands succeed with empty
//! output, so tests only script the probes they care about.

use crate::host::{Cmd, CmdOutput, Host};
use async_trait::async_trait;
use clawstrap_core::AppError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

struct Rule {
    pattern: String,
    outputs: VecDeque<CmdOutput>,
}

#[derive(Default)]
pub struct FakeHost {
    rules: Mutex<Vec<Rule>>,
    effects: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    binaries: Mutex<HashSet<String>>,
    files: Mutex<HashMap<PathBuf, (String, u32)>>,
    http: Mutex<HashMap<String, u16>>,
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    slept: Mutex<Duration>,
    free: Mutex<u64>,
}

fn output(status: i32, stdout: &str, stderr: &str) -> CmdOutput {
    CmdOutput {
        status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self::default();
        *host.free.lock().unwrap() = 40 * 1024 * 1024 * 1024;
        host
    }

    pub fn respond(&self, pattern: &str, status: i32, stdout: &str, stderr: &str) {
        self.respond_seq(pattern, vec![output(status, stdout, stderr)]);
    }

    pub fn respond_ok(&self, pattern: &str, stdout: &str) {
        self.respond(pattern, 0, stdout, "");
    }

    pub fn fail(&self, pattern: &str) {
        self.respond(pattern, 1, "", "");
    }

    /// Successive matches consume `outputs` in order; the last one repeats.
    pub fn respond_seq(&self, pattern: &str, outputs: Vec<CmdOutput>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            outputs: outputs.into(),
        });
    }

    /// Running a command matching `pattern` makes `binary` appear.
    pub fn installs(&self, pattern: &str, binary: &str) {
        self.effects
            .lock()
            .unwrap()
            .push((pattern.to_string(), binary.to_string()));
    }

    pub fn add_binary(&self, name: &str) {
        self.binaries.lock().unwrap().insert(name.to_string());
    }

    pub fn put_file(&self, path: &str, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), (contents.to_string(), 0o644));
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(c, _)| c.clone())
    }

    pub fn mode(&self, path: &Path) -> Option<u32> {
        self.files.lock().unwrap().get(path).map(|(_, m)| *m)
    }

    pub fn set_free_space(&self, bytes: u64) {
        *self.free.lock().unwrap() = bytes;
    }

    pub fn http(&self, url: &str, status: u16) {
        self.http.lock().unwrap().insert(url.to_string(), status);
    }

    pub fn payload(&self, url: &str, bytes: &[u8]) {
        self.payloads
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn called(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    pub fn stdin_for(&self, pattern: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| c.contains(pattern))
            .and_then(|(_, stdin)| stdin.clone())
    }

    pub fn slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn run(&self, cmd: &Cmd) -> Result<CmdOutput, AppError> {
        let rendered = cmd.render();
        let stdin = cmd
            .stdin
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned());
        self.calls.lock().unwrap().push((rendered.clone(), stdin));

        for (pattern, binary) in self.effects.lock().unwrap().iter() {
            if rendered.contains(pattern.as_str()) {
                self.binaries.lock().unwrap().insert(binary.clone());
            }
        }

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules
            .iter_mut()
            .rev()
            .find(|r| rendered.contains(r.pattern.as_str()))
        else {
            return Ok(CmdOutput::default());
        };
        let out = if rule.outputs.len() > 1 {
            rule.outputs.pop_front().unwrap_or_default()
        } else {
            rule.outputs.front().cloned().unwrap_or_default()
        };
        Ok(out)
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        let binaries = self.binaries.lock().unwrap();
        if binaries.contains(program) {
            if program.starts_with('/') {
                return Some(PathBuf::from(program));
            }
            return Some(PathBuf::from("/usr/bin").join(program));
        }
        None
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
            || self
                .binaries
                .lock()
                .unwrap()
                .contains(path.to_string_lossy().as_ref())
    }

    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        self.file(path)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
    }

    fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<(), AppError> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), (contents.to_string(), mode));
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<(), AppError> {
        if let Some(entry) = self.files.lock().unwrap().get_mut(path) {
            entry.1 = mode;
        }
        Ok(())
    }

    fn free_space(&self, _path: &Path) -> Result<u64, AppError> {
        Ok(*self.free.lock().unwrap())
    }

    async fn http_status(&self, url: &str, _timeout: Duration) -> Option<u16> {
        self.http.lock().unwrap().get(url).copied()
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((format!("download {url} -> {}", dest.display()), None));
        let payload = self.payloads.lock().unwrap().get(url).cloned();
        match payload {
            Some(bytes) => {
                std::fs::write(dest, bytes)?;
                Ok(())
            }
            // An `http` status scripted for the URL stands in for a failing server.
            None => match self.http.lock().unwrap().get(url) {
                Some(&status) if status != 404 => {
                    Err(AppError::Download(format!("{url} returned {status}")))
                }
                _ => Err(AppError::NotPublished(url.to_string())),
            },
        }
    }

    async fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
    }
}

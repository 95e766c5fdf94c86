use std::{
    collections::VecDeque,
    ffi::OsString,
    os::unix::process::ExitStatusExt,
    process::{ExitStatus, Output},
    sync::{Arc, Mutex},
};

use osutils::dependencies::{Dependency, DependencyError, Executor};

/// Executor returning canned results in order and recording every command line it receives.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Output>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, stdout: &str) {
        self.push_exit(0, stdout, "");
    }

    pub fn push_exit(&self, code: i32, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().push_back(Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        });
    }

    /// Rendered command lines executed so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(
        &self,
        _dependency: Dependency,
        argv: &[OsString],
    ) -> Result<Output, Box<DependencyError>> {
        self.calls.lock().unwrap().push(
            argv.iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" "),
        );
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command: {argv:?}")))
    }
}

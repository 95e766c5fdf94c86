use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use osutils::dependencies::{
    Command, CommandOutput, Dependency, DependencyError, Executor, SystemExecutor,
};

/// Default NVMe over TCP service id.
pub const NVME_PORT: &str = "4420";

/// Exit status of `nvme connect` when the controller is already connected.
pub const EXIT_CODE_ALREADY_CONNECTED: i32 = 114;

/// Builds `nvme` invocations for the configured root and runs them.
#[derive(Clone)]
pub struct NvmeCli {
    root: Option<PathBuf>,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for NvmeCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmeCli").field("root", &self.root).finish()
    }
}

impl NvmeCli {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self::with_executor(root, Arc::new(SystemExecutor))
    }

    pub fn with_executor(root: Option<PathBuf>, executor: Arc<dyn Executor>) -> Self {
        Self { root, executor }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Returns an `nvme` command with the given arguments, wrapped in chroot when needed.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Dependency::Nvme.cmd();
        cmd.args(args);
        if let Some(root) = &self.root {
            cmd.chroot(root);
        }
        cmd
    }

    /// Runs the command and returns its output without checking the exit status.
    pub fn run(&self, cmd: &Command) -> Result<CommandOutput, Box<DependencyError>> {
        cmd.output_with(self.executor.as_ref())
    }

    /// Runs the command and returns stdout if it exited successfully.
    pub fn output_and_check(&self, cmd: &Command) -> Result<String, Box<DependencyError>> {
        self.run(cmd)?.check_output()
    }

    pub fn run_and_check(&self, cmd: &Command) -> Result<(), Box<DependencyError>> {
        self.run(cmd)?.check()
    }
}

#[cfg(test)]
mod tests {
    use crate::testutils::ScriptedExecutor;

    use super::*;

    #[test]
    fn test_build_command() {
        let cli = NvmeCli::new(None);
        let cmd = cli.command(["list"]);
        assert_eq!(cmd.argv(), vec!["nvme", "list"]);

        let initial = ["/bin/ls"];
        let cli = NvmeCli::new(Some(PathBuf::from("/test")));
        let argv = cli.command(initial).argv();
        // chroot and its directory are prepended to the nvme invocation
        assert_eq!(argv.len(), initial.len() + 3);
        assert_eq!(argv[0], "chroot");
        assert_eq!(argv[1], "/test");
        assert_eq!(argv[2], "nvme");
        assert_eq!(cli.root(), Some(Path::new("/test")));
    }

    #[test]
    fn test_run_through_executor() {
        let executor = ScriptedExecutor::new();
        executor.push_ok("hello\n");
        executor.push_exit(2, "", "boom");
        let cli = NvmeCli::with_executor(None, executor.clone());

        assert_eq!(
            cli.output_and_check(&cli.command(["version"])).unwrap(),
            "hello\n"
        );
        let error = cli.run_and_check(&cli.command(["list"])).unwrap_err();
        assert_eq!(error.exit_code(), Some(2));
        assert_eq!(executor.calls(), vec!["nvme version", "nvme list"]);
    }
}

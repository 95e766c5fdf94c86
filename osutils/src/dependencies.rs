use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::{Command as StdCommand, Output},
};

use log::trace;
use strum_macros::IntoStaticStr;

use initiator_api::error::{InitiatorError, InitiatorResultExt, ProcessError};

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("Failed to find dependency '{dependency}': {source}")]
    NotFound {
        dependency: Dependency,
        #[source]
        source: which::Error,
    },

    #[error("Failed to execute dependency '{dependency}': {inner}")]
    CouldNotExecute {
        dependency: Dependency,
        #[source]
        inner: io::Error,
    },

    #[error("Dependency '{dependency}' finished unsuccessfully: {explanation}\nCmdline: {rendered_command}\n{output}")]
    ExecutionFailed {
        dependency: Dependency,
        rendered_command: String,
        code: Option<i32>,
        signal: Option<i32>,
        stdout: String,
        stderr: String,
        explanation: String,
        output: String,
    },
}

impl DependencyError {
    /// Exit code of a command that ran to completion unsuccessfully.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            DependencyError::ExecutionFailed { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<DependencyError> for InitiatorError {
    #[track_caller]
    fn from(value: DependencyError) -> Self {
        match value {
            DependencyError::NotFound { dependency, source } => InitiatorError::with_source(
                ProcessError::MissingBinary {
                    binary: dependency.name(),
                },
                source.into(),
            ),
            DependencyError::CouldNotExecute { dependency, inner } => InitiatorError::with_source(
                ProcessError::CommandCouldNotExecute {
                    binary: dependency.name(),
                },
                inner.into(),
            ),
            DependencyError::ExecutionFailed {
                dependency,
                explanation,
                stderr,
                output,
                ..
            } => InitiatorError::with_source(
                ProcessError::CommandFailed {
                    binary: dependency.name(),
                    explanation: match last_line(&stderr) {
                        Some(summary) => format!("{explanation}: {summary}"),
                        None => explanation,
                    },
                },
                anyhow::anyhow!(output),
            ),
        }
    }
}

/// Last non-empty line of a command's stderr, usually the tool's own error message.
fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

pub trait DependencyResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, InitiatorError>;
}

impl<T> DependencyResultExt<T> for Result<T, Box<DependencyError>> {
    #[track_caller]
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, InitiatorError> {
        let result: Result<T, InitiatorError> = self.map_err(|e| (*e).into());
        result.message(context)
    }
}

/// Enum of runtime and test dependencies used in the code base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Dependency {
    Chroot,
    Nvme,
    #[cfg(test)]
    DoesNotExist,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

impl Dependency {
    /// Gets the name of the dependency
    ///
    /// For example, Dependency::Nvme => "nvme"
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Gets the path of the dependency
    pub fn path(&self) -> Result<PathBuf, Box<DependencyError>> {
        which::which(self.name()).map_err(|source| {
            Box::new(DependencyError::NotFound {
                dependency: *self,
                source,
            })
        })
    }

    /// Converts the dependency to a new Command instance
    /// (Note this does not create a std::process::Command instance)
    pub fn cmd(&self) -> Command {
        Command {
            dependency: *self,
            root: None,
            args: vec![],
        }
    }
}

/// Runs a fully built command line and captures its output.
///
/// The first element of `argv` is the program name as it should be looked up.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        dependency: Dependency,
        argv: &[OsString],
    ) -> Result<Output, Box<DependencyError>>;
}

/// Executes commands as child processes of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(
        &self,
        dependency: Dependency,
        argv: &[OsString],
    ) -> Result<Output, Box<DependencyError>> {
        let mut cmd = StdCommand::new(dependency.path()?);
        cmd.args(argv.iter().skip(1));
        cmd.output()
            .map_err(|inner| Box::new(DependencyError::CouldNotExecute { dependency, inner }))
    }
}

pub struct Command {
    dependency: Dependency,
    root: Option<PathBuf>,
    args: Vec<OsString>,
}

impl Command {
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg.as_ref());
        }
        self
    }

    /// Runs the command inside `chroot <root>`. A root of `/` leaves the command unwrapped.
    pub fn chroot(&mut self, root: impl AsRef<Path>) -> &mut Command {
        let root = root.as_ref();
        self.root = (root != Path::new("/") && !root.as_os_str().is_empty())
            .then(|| root.to_path_buf());
        self
    }

    /// The program that is actually spawned.
    fn program(&self) -> Dependency {
        match self.root {
            Some(_) => Dependency::Chroot,
            None => self.dependency,
        }
    }

    /// Full argument vector, including the chroot wrapper when a root is set.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        if let Some(root) = &self.root {
            argv.push(Dependency::Chroot.name().into());
            argv.push(root.as_os_str().to_os_string());
        }
        argv.push(self.dependency.name().into());
        argv.extend(self.args.iter().cloned());
        argv
    }

    pub fn render_command(&self) -> String {
        self.argv()
            .iter()
            .map(|arg| arg.to_string_lossy())
            .map(|arg| {
                if arg.contains(' ') {
                    format!("'{arg}'")
                } else {
                    arg.into()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command through the given executor.
    pub fn output_with(
        &self,
        executor: &dyn Executor,
    ) -> Result<CommandOutput, Box<DependencyError>> {
        let rendered_command = self.render_command();
        trace!("Executing '{rendered_command}'");
        let output = executor.execute(self.program(), &self.argv())?;
        let output = CommandOutput {
            rendered_command: rendered_command.clone(),
            dependency: self.dependency,
            inner: output,
        };
        trace!(
            "Executed '{rendered_command}': {}. Report:\n{}",
            output.explain_exit(),
            output.output_report(),
        );
        Ok(output)
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    rendered_command: String,
    dependency: Dependency,
    inner: Output,
}

impl CommandOutput {
    /// Checks if the process exited successfully
    pub fn success(&self) -> bool {
        self.inner.status.success()
    }

    /// Gets the exit code of the process, if it exited normally
    pub fn code(&self) -> Option<i32> {
        self.inner.status.code()
    }

    /// Gets the signal that terminated the process, if it was terminated by a signal
    fn signal(&self) -> Option<i32> {
        self.inner.status.signal()
    }

    /// Gets stderr
    pub fn error_output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stderr).into()
    }

    /// Gets stdout
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stdout).into()
    }

    /// Gets all available output, useful for reporting or debugging
    pub fn output_report(&self) -> String {
        let stdout = self.output();
        let stderr = self.error_output();

        let mut res = String::with_capacity(stdout.len() + stderr.len() + 20);

        if !stdout.is_empty() {
            res += &format!("stdout:\n{stdout}\n");
        }

        if !stderr.is_empty() {
            if !res.is_empty() {
                res += "\n";
            }
            res += &format!("stderr:\n{stderr}\n");
        }

        res
    }

    /// Checks if the process exited successfully, otherwise produces an error
    pub fn check(&self) -> Result<(), Box<DependencyError>> {
        if self.success() {
            return Ok(());
        }

        Err(Box::new(DependencyError::ExecutionFailed {
            dependency: self.dependency,
            rendered_command: self.rendered_command.clone(),
            code: self.code(),
            signal: self.signal(),
            stdout: self.output(),
            stderr: self.error_output(),
            explanation: self.explain_exit(),
            output: match self.output_report() {
                s if !s.is_empty() => s,
                _ => "(no output collected)".into(),
            },
        }))
    }

    /// Checks if the process exited successfully and returns the output,
    /// otherwise produces an error with the output
    pub fn check_output(&self) -> Result<String, Box<DependencyError>> {
        self.check()?;
        Ok(self.output())
    }

    /// Produces a string explaining the exit status of the process
    fn explain_exit(&self) -> String {
        if let Some(code) = self.code() {
            format!("exited with status: {code}")
        } else if let Some(signal) = self.signal() {
            format!("terminated by signal: {signal}")
        } else {
            "exited with unknown status".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::process::ExitStatus;

    use initiator_api::error::ErrorKind;

    use super::*;

    struct Canned {
        code: i32,
        stdout: &'static str,
        stderr: &'static str,
    }

    impl Executor for Canned {
        fn execute(&self, _: Dependency, _: &[OsString]) -> Result<Output, Box<DependencyError>> {
            Ok(Output {
                status: ExitStatus::from_raw(self.code << 8),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    #[test]
    fn test_chroot_argv() {
        let mut cmd = Dependency::Nvme.cmd();
        cmd.args(["list", "-o", "json"]);
        assert_eq!(cmd.argv(), vec!["nvme", "list", "-o", "json"]);
        assert_eq!(cmd.program(), Dependency::Nvme);

        cmd.chroot("/test");
        assert_eq!(
            cmd.argv(),
            vec!["chroot", "/test", "nvme", "list", "-o", "json"]
        );
        assert_eq!(cmd.program(), Dependency::Chroot);
        assert_eq!(cmd.render_command(), "chroot /test nvme list -o json");

        cmd.chroot("/");
        assert_eq!(cmd.argv(), vec!["nvme", "list", "-o", "json"]);
    }

    #[test]
    fn test_render_command_quotes_spaces() {
        let mut cmd = Dependency::Nvme.cmd();
        cmd.arg("discover").arg("--hostnqn=a b");
        assert_eq!(cmd.render_command(), "nvme discover '--hostnqn=a b'");
    }

    #[test]
    fn test_nonexistent_dep() {
        let output = Dependency::DoesNotExist
            .cmd()
            .output_with(&SystemExecutor)
            .unwrap_err();
        assert!(matches!(*output, DependencyError::NotFound { .. }));
        assert_eq!(
            output.to_string(),
            "Failed to find dependency 'doesnotexist': cannot find binary path"
        );
        assert_eq!(output.exit_code(), None);
    }

    #[test]
    fn test_commandoutput() {
        let output = Dependency::Nvme
            .cmd()
            .output_with(&Canned {
                code: 0,
                stdout: "nvme version 2.4\n",
                stderr: "",
            }).unwrap();
        assert!(output.success());
        assert_eq!(output.code(), Some(0));
        assert_eq!(output.signal(), None);
        assert_eq!(output.error_output(), "");
        assert_eq!(output.output(), "nvme version 2.4\n");
        assert_eq!(output.output_report(), "stdout:\nnvme version 2.4\n\n");
        assert!(matches!(output.check(), Ok(())));
        assert!(matches!(output.check_output(), Ok(s) if s == "nvme version 2.4\n"));
        assert_eq!(output.explain_exit(), "exited with status: 0");

        let output = Dependency::Nvme.cmd().output_with(&Canned {
            code: 1,
            stdout: "",
            stderr: "",
        }).unwrap();
        assert!(!output.success());
        assert_eq!(output.code(), Some(1));
        assert_eq!(output.output_report(), "");
        let error = output.check().unwrap_err();
        assert!(matches!(*error, DependencyError::ExecutionFailed { .. }));
        assert_eq!(error.exit_code(), Some(1));
        assert!(error.to_string().contains("(no output collected)"));
        assert_eq!(output.explain_exit(), "exited with status: 1");
    }

    #[test]
    fn test_failure_explanation_carries_stderr() {
        let error = Dependency::Nvme
            .cmd()
            .output_with(&Canned {
                code: 114,
                stdout: "partial",
                stderr: "Failed to write to /dev/nvme-fabrics\nalready connected\n\n",
            }).unwrap()
            .check()
            .unwrap_err();
        assert_eq!(error.exit_code(), Some(114));

        let structured: InitiatorError = (*error).into();
        assert_eq!(
            structured.kind(),
            &ErrorKind::Process(ProcessError::CommandFailed {
                binary: "nvme",
                explanation: "exited with status: 114: already connected".into(),
            })
        );

        let error = Dependency::Nvme
            .cmd()
            .output_with(&Canned {
                code: 2,
                stdout: "",
                stderr: "  \n",
            }).unwrap()
            .check()
            .unwrap_err();
        let structured: InitiatorError = (*error).into();
        assert_eq!(
            structured.to_string(),
            "Command 'nvme' failed: exited with status: 2"
        );
    }
}

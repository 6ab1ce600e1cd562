use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Bytes of stderr kept in the error message of a failed program.
const STDERR_TAIL_BYTES: usize = 2000;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Empty command line")]
    Empty,
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to open '{path}' for redirection: {source}", path = path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// An external program invocation built from a shell-like command string.
///
/// The string is split on whitespace into program and arguments; no shell is
/// involved, so redirections are expressed with [`stdin_from`] and [`stdout_to`].
///
/// [`stdin_from`]: ExternalCommand::stdin_from
/// [`stdout_to`]: ExternalCommand::stdout_to
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    stdin: Option<PathBuf>,
    stdout: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn parse(command_line: &str) -> Result<Self, CommandError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(CommandError::Empty)?;
        Ok(Self {
            program,
            args: parts.collect(),
            current_dir: None,
            stdin: None,
            stdout: None,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Feeds the file to the program's stdin. Relative paths resolve against
    /// the working directory.
    pub fn stdin_from(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin = Some(path.as_ref().to_path_buf());
        self
    }

    /// Redirects stdout to the file. Relative paths resolve against the
    /// working directory.
    pub fn stdout_to(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.current_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Runs the program to completion.
    pub fn run(&self) -> Result<(), CommandError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        if let Some(stdin) = &self.stdin {
            let path = self.resolve(stdin);
            let file = File::open(&path).map_err(|source| CommandError::Redirect {
                path: path.clone(),
                source,
            })?;
            command.stdin(Stdio::from(file));
        } else {
            command.stdin(Stdio::null());
        }

        if let Some(stdout) = &self.stdout {
            let path = self.resolve(stdout);
            let file = File::create(&path).map_err(|source| CommandError::Redirect {
                path: path.clone(),
                source,
            })?;
            command.stdout(Stdio::from(file));
        } else {
            command.stdout(Stdio::null());
        }

        debug!(
            "Running '{} {}' in {:?}",
            self.program,
            self.args.join(" "),
            self.current_dir
        );
        let output = command.output().map_err(|source| CommandError::Launch {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let trimmed = stderr.trim();
        let start = trimmed
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| trimmed.len() - i <= STDERR_TAIL_BYTES)
            .unwrap_or(trimmed.len());
        Err(CommandError::Failed {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: trimmed[start..].to_string(),
        })
    }
}

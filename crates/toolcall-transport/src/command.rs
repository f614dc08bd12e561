//! Launch command building for the pipe transport.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default interpreter for the local server script.
pub const DEFAULT_INTERPRETER: &str = "node";

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Failed to quote command: {0}")]
    QuoteError(#[from] shlex::QuoteError),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an executable path.
    ///
    /// # Errors
    /// Returns error if the executable cannot be found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::ExecutableNotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for the server launch command.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base command line, split shell-style.
    pub base: String,
    /// Extra arguments appended verbatim.
    pub params: Option<Vec<String>>,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: None,
        }
    }

    /// Command running a server script with an interpreter.
    ///
    /// An empty interpreter runs the script directly.
    ///
    /// # Errors
    /// Returns error if the script path cannot be quoted.
    pub fn server(interpreter: &str, script: &Path) -> Result<Self, CommandBuildError> {
        let script = script.to_string_lossy();
        let quoted = shlex::try_quote(&script)?;
        let base = if interpreter.trim().is_empty() {
            quoted.into_owned()
        } else {
            format!("{interpreter} {quoted}")
        };
        Ok(Self::new(base))
    }

    /// Default server command: `node <dir>/dist/index.js`.
    ///
    /// # Errors
    /// Returns error if the script path cannot be quoted.
    pub fn default_server(dir: &Path) -> Result<Self, CommandBuildError> {
        Self::server(DEFAULT_INTERPRETER, &dir.join("dist").join("index.js"))
    }

    /// Append arguments.
    #[must_use]
    pub fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let extra: Vec<String> = more.into_iter().map(Into::into).collect();
        match &mut self.params {
            Some(p) => p.extend(extra),
            None => self.params = Some(extra),
        }
        self
    }

    /// Split into program and arguments.
    ///
    /// # Errors
    /// Returns error if the command is unparsable or empty.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        if let Some(ref params) = self.params {
            parts.extend(params.iter().cloned());
        }
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

/// Resolve an executable by name.
///
/// Paths (absolute, or containing a separator) are taken as they are when the
/// file exists; bare names are looked up on PATH.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

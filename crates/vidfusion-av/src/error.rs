//! Error types for vidfusion-av.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a transformation session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external program exited unsuccessfully.
    ///
    /// `output` holds the combined stdout/stderr exactly as the program
    /// produced it.
    #[error("{tool} exited with {status}:\n{output}")]
    Invocation {
        tool: String,
        status: String,
        output: String,
    },

    /// Probe output did not match the expected scalar or `WxH` format.
    #[error("failed to parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// Temp artifact, directory or copy failure.
    ///
    /// The io error is exposed as the source only, so reporters that walk
    /// the chain print it once.
    #[error("{context}")]
    Resource {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The clip pool cannot reach the requested duration.
    #[error(
        "insufficient clip duration: {available:.2}s available, {requested:.2}s requested"
    )]
    InsufficientDuration { available: f64, requested: f64 },

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The external program did not finish before its deadline.
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The session has no current artifact to operate on.
    #[error("session has no current artifact")]
    NoCurrentArtifact,

    /// The session was finalized or cleaned up.
    #[error("session is closed")]
    SessionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invocation failure error.
    pub fn invocation(
        tool: impl Into<String>,
        status: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Invocation {
            tool: tool.into(),
            status: status.into(),
            output: output.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a resource error with context.
    pub fn resource(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    /// Create a resource error naming the path involved.
    pub fn resource_at(action: &str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::resource(format!("{} {}", action, path.into().display()), source)
    }

    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// True for failures while measuring a clip.
    ///
    /// Assembly skips a clip on these instead of aborting.
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            Error::Invocation { .. } | Error::Parse { .. } | Error::Timeout { .. }
        )
    }
}

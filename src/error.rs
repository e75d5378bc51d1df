use std::process::ExitStatus;
use thiserror::Error;

/// Failure kinds surfaced by a build.
///
/// Functions return `anyhow::Result` and raise these with `anyhow!(..)`, so
/// callers that need the kind recover it with `downcast_ref::<BuildError>()`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Failed to parse {0}")]
    Parse(String),

    #[error("Interrupted by signal")]
    Interrupted,

    #[error("{program} exited with {status}{}", format_stderr(.stderr))]
    ExternalTool {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn format_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Find the `BuildError` anywhere in an error chain.
pub fn build_error(err: &anyhow::Error) -> Option<&BuildError> {
    err.downcast_ref::<BuildError>()
        .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<BuildError>()))
}

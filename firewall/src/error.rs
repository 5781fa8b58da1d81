//! Error type shared by every firewall operation.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FirewallError>;

#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program} {args}` exited with {}: {message}", describe_code(.code))]
    CommandFailed {
        program: String,
        args: String,
        code: Option<i32>,
        message: String,
    },

    #[error("changing firewall rules needs administrator rights; run from an elevated shell")]
    ElevationRequired,

    #[error("invalid program path `{path}`: expected a file named `{expected}`")]
    InvalidProgram { path: String, expected: String },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no exit status".to_string(),
    }
}

use thiserror::Error;

/// Core error type for forge-client.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport-level failure: DNS, connection refused, timeout, reset mid-body.
    #[error("network error: {cause}")]
    Network { cause: String },

    /// Server answered with a non-2xx status.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },

    /// Response or stream content that cannot be reconciled with the wire format.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("container {app_id} failed to start")]
    ContainerFailed { app_id: String },

    #[error("container {app_id} did not become ready within {attempts} attempts")]
    ContainerTimeout { app_id: String, attempts: u32 },

    #[error("container {app_id} disappeared while waiting for it")]
    ContainerGone { app_id: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    /// HTTP status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type CoreResult<T> = std::result::Result<T, ForgeError>;

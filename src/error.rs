use thiserror::Error;

/// Failure of a remote aggregate call.
///
/// Cloneable so a single in-flight request can hand the same failure to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("{procedure} returned {status}: {message}")]
    Remote {
        procedure: String,
        status: u16,
        message: String,
    },

    #[error("{procedure} request failed: {message}")]
    Transport { procedure: String, message: String },

    #[error("{procedure} returned an unreadable payload: {message}")]
    Decode { procedure: String, message: String },
}

impl FetchError {
    pub(crate) fn decode(procedure: &str, err: impl std::fmt::Display) -> Self {
        FetchError::Decode {
            procedure: procedure.to_string(),
            message: err.to_string(),
        }
    }
}

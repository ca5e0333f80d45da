//! Crate-wide error taxonomy.
//!
//! Callers (transport adapters) translate these variants to their own status
//! codes. User-lookup misses and bad passwords both surface as
//! [`Error::InvalidCredentials`] so responses cannot be used to enumerate
//! accounts. Storage failures are wrapped as [`Error::Internal`]; the cause is
//! kept for logs and never shown to the caller.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account is disabled")]
    UserDisabled,
    #[error("invalid token")]
    InvalidToken,
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid request")]
    InvalidRequest,
    #[error("not found")]
    NotFound,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Stable machine-readable code for audit records and API mappings.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::UserDisabled => "user_disabled",
            Self::InvalidToken => "invalid_token",
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InvalidCredentials.code(), "invalid_credentials");
        assert_eq!(Error::UserDisabled.code(), "user_disabled");
        assert_eq!(Error::InvalidToken.code(), "invalid_token");
        assert_eq!(Error::Unauthorized.code(), "unauthorized");
        assert_eq!(Error::InvalidRequest.code(), "invalid_request");
        assert_eq!(Error::NotFound.code(), "not_found");
        assert_eq!(
            Error::Internal(anyhow::anyhow!("boom")).code(),
            "internal_error"
        );
    }

    #[test]
    fn internal_hides_cause_in_display() {
        let err = Error::Internal(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "internal error");
    }
}

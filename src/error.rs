//! Error types.
//!
//! Each failure domain has its own enum. Stores absorb persistence errors,
//! the auth session turns token and network errors into state, and only
//! the request pipeline and configuration loading hand errors back to the
//! caller.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// A token could not be decoded into claims.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token does not have a payload segment")]
    MissingPayload,

    #[error("token payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token payload names no user (neither `username` nor `sub`)")]
    MissingSubject,
}

/// A call to the authentication endpoints failed.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server rejected request with status {status}")]
    Rejected {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error("could not decode token response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The message the server supplied with a rejection, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// The durable key-value adapter failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("persisted state for `{0}` is not a JSON object")]
    NotAnObject(String),

    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}

/// An HTTP call made through the request pipeline failed.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("request failed with status {status}")]
    Status { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid header value for `{0}`")]
    InvalidHeader(String),
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// The environment configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse environment: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("snapshot is malformed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rejections_carry_detail() {
        let rejected = ApiError::Rejected {
            status: StatusCode::BAD_REQUEST,
            detail: Some("bad credentials".into()),
        };
        assert_eq!(rejected.detail(), Some("bad credentials"));
        assert_eq!(ApiError::Decode("eof".into()).detail(), None);
    }

    #[test]
    fn unauthorized_is_detected_from_status() {
        let error = HttpError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert!(error.is_unauthorized());
        assert!(!HttpError::Transport("reset".into()).is_unauthorized());
    }
}

use clusterop_kv_storage::KvError;
use clusterop_model::{ApiStatus, FieldErrorList, StatusDetails, StatusReason};

use crate::codec::CodecError;
use crate::config::ConfigError;

const CONFLICT_MESSAGE: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// errors returned to registry callers
#[derive(thiserror::Error, Debug, Clone)]
pub enum ApiError {
    #[error("{kind} \"{name}\" is invalid: {errors}")]
    Invalid {
        kind: String,
        name: String,
        errors: FieldErrorList,
    },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("Operation cannot be fulfilled on {kind} \"{name}\": {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },
    #[error("resource expired: {0}")]
    ResourceExpired(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{}", render_aggregate(.0))]
    Aggregate(Vec<ApiError>),
}

fn render_aggregate(errors: &[ApiError]) -> String {
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

impl ApiError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// map backend failure on a single object
    pub fn from_kv(err: KvError, kind: &str, name: &str) -> Self {
        match err {
            KvError::KeyExists(_) => Self::AlreadyExists {
                kind: kind.to_owned(),
                name: name.to_owned(),
            },
            KvError::KeyNotFound(_) => Self::not_found(kind, name),
            KvError::RevisionMismatch { .. } => Self::conflict(kind, name, CONFLICT_MESSAGE),
            KvError::Compacted {
                requested,
                compacted,
            } => Self::ResourceExpired(format!(
                "too old resource version: {requested} ({compacted})"
            )),
            KvError::FutureRevision { requested, current } => Self::BadRequest(format!(
                "too large resource version: {requested}, current: {current}"
            )),
            KvError::Unavailable(msg) => Self::Internal(msg),
        }
    }

    pub fn reason(&self) -> StatusReason {
        match self {
            Self::Invalid { .. } => StatusReason::Invalid,
            Self::AlreadyExists { .. } => StatusReason::AlreadyExists,
            Self::Conflict { .. } => StatusReason::Conflict,
            Self::NotFound { .. } => StatusReason::NotFound,
            Self::ResourceExpired(_) => StatusReason::Expired,
            Self::BadRequest(_) => StatusReason::BadRequest,
            Self::Internal(_) | Self::Aggregate(_) => StatusReason::InternalError,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Invalid { .. } => 422,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::ResourceExpired(_) => 410,
            Self::BadRequest(_) => 400,
            Self::Internal(_) | Self::Aggregate(_) => 500,
        }
    }

    pub fn to_status(&self) -> ApiStatus {
        let details = match self {
            Self::Invalid { kind, name, .. }
            | Self::AlreadyExists { kind, name }
            | Self::Conflict { kind, name, .. }
            | Self::NotFound { kind, name } => Some(StatusDetails {
                name: name.clone(),
                kind: kind.clone(),
            }),
            _ => None,
        };
        ApiStatus {
            code: self.code(),
            reason: self.reason(),
            message: self.to_string(),
            details,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::ResourceExpired(_))
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::Internal(format!("storage misconfigured: {err}"))
    }
}

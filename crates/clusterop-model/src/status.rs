use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusReason {
    Success,
    Invalid,
    AlreadyExists,
    Conflict,
    NotFound,
    Gone,
    Expired,
    BadRequest,
    InternalError,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// outcome of an operation that does not return an object,
/// also carried by watch error events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    pub code: u16,
    pub reason: StatusReason,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

impl ApiStatus {
    pub fn success(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: 200,
            reason: StatusReason::Success,
            message: String::new(),
            details: Some(StatusDetails {
                name: name.into(),
                kind: kind.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.reason == StatusReason::Success
    }
}

impl fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.reason, self.code, self.message)
    }
}

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use clusterop_kv_storage::Revision;

use crate::error::ApiError;

const TOKEN_VERSION: &str = "meta.k8s.io/v1";

/// opaque list continuation.
/// start is relative to the list prefix so a token cannot escape its scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ContinueToken {
    #[serde(rename = "v")]
    version: String,
    #[serde(rename = "rv")]
    revision: Revision,
    start: String,
}

/// encode token resuming strictly after `last_key` at snapshot `revision`
pub fn encode_continue(last_key: &str, prefix: &str, revision: Revision) -> Result<String, ApiError> {
    let relative = last_key.strip_prefix(prefix).ok_or_else(|| {
        ApiError::Internal(format!("key {last_key} is outside list prefix {prefix}"))
    })?;
    let token = ContinueToken {
        version: TOKEN_VERSION.to_owned(),
        revision,
        start: format!("{relative}\0"),
    };
    let json = serde_json::to_vec(&token).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// returns absolute start key and snapshot revision
pub fn decode_continue(token: &str, prefix: &str) -> Result<(String, Revision), ApiError> {
    let invalid = |reason: &str| ApiError::BadRequest(format!("continue key is not valid: {reason}"));

    let data = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|_| invalid("not base64"))?;
    let token: ContinueToken = serde_json::from_slice(&data).map_err(|_| invalid("not json"))?;

    if token.version != TOKEN_VERSION {
        return Err(invalid("incorrect encoded version"));
    }
    if token.revision <= 0 {
        return Err(invalid("incorrect encoded resource version"));
    }
    if token.start.is_empty() {
        return Err(invalid("encoded start key empty"));
    }
    if token.start.starts_with('/') || token.start.split('/').any(|s| s == "..") {
        return Err(invalid("encoded start key escapes prefix"));
    }

    Ok((format!("{prefix}{}", token.start), token.revision))
}

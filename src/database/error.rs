use std::fmt::{Display, Formatter};

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseErrorCode {
    /// The bridge or the remote engine rejected the operation.
    Bridge,
    /// The caller broke the client contract (for example cancelling a listener twice).
    Misuse,
    InvalidArgument,
    Internal,
}

impl DatabaseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseErrorCode::Bridge => "database/bridge",
            DatabaseErrorCode::Misuse => "database/misuse",
            DatabaseErrorCode::InvalidArgument => "database/invalid-argument",
            DatabaseErrorCode::Internal => "database/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatabaseError {
    pub code: DatabaseErrorCode,
    message: String,
    details: Option<Value>,
}

impl DatabaseError {
    pub fn new(code: DatabaseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches the raw error payload reported by the bridge.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Opaque payload supplied by the bridge, untouched by the client.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn is_bridge_error(&self) -> bool {
        self.code == DatabaseErrorCode::Bridge
    }

    pub fn is_misuse(&self) -> bool {
        self.code == DatabaseErrorCode::Misuse
    }
}

impl Display for DatabaseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for DatabaseError {}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

pub fn bridge_error(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Bridge, message)
}

pub fn misuse(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Misuse, message)
}

pub fn invalid_argument(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::InvalidArgument, message)
}

pub fn internal_error(message: impl Into<String>) -> DatabaseError {
    DatabaseError::new(DatabaseErrorCode::Internal, message)
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_includes_code() {
        let err = misuse("listener already cancelled");
        assert_eq!(
            err.to_string(),
            "listener already cancelled (database/misuse)"
        );
    }

    #[test]
    fn bridge_details_are_kept_verbatim() {
        let payload = json!({ "code": "PERMISSION_DENIED", "native": [1, 2] });
        let err = bridge_error("permission denied").with_details(payload.clone());
        assert!(err.is_bridge_error());
        assert_eq!(err.details(), Some(&payload));
    }
}

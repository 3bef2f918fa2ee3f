use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure categories shared by every backend and by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unauthorized,
    Forbidden,
    Conflict,
    /// Payload could not be unpacked.
    Decode,
    /// No domain response (connection failure or an unmapped status).
    Transport,
    Internal,
}

impl ErrorKind {
    /// HTTP status the server answers with for this kind.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::Conflict => 409,
            Self::Decode => 422,
            Self::Transport => 502,
            Self::Internal => 500,
        }
    }

    /// Inverse of [`Self::status`] for statuses that carry domain meaning.
    #[must_use]
    pub const fn from_status(status: u16) -> Option<Self> {
        match status {
            400 => Some(Self::BadRequest),
            401 => Some(Self::Unauthorized),
            403 => Some(Self::Forbidden),
            404 => Some(Self::NotFound),
            409 => Some(Self::Conflict),
            422 => Some(Self::Decode),
            _ => None,
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Decode => "decode",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            hint: default_hint(code).map(str::to_string),
        }
    }
}

fn default_hint(code: ErrorKind) -> Option<&'static str> {
    match code {
        ErrorKind::Unauthorized => {
            Some("Send X-Wordvec-Username and X-Wordvec-Password, or a valid X-Wordvec-Session.")
        }
        ErrorKind::BadRequest => Some("Check field names and filter value shapes."),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn statuses_map_back_to_kinds() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::BadRequest,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::Conflict,
            ErrorKind::Decode,
        ] {
            assert_eq!(ErrorKind::from_status(kind.status()), Some(kind));
        }
        assert_eq!(ErrorKind::from_status(500), None);
        assert_eq!(ErrorKind::from_status(418), None);
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = ErrorEnvelope::new(ErrorKind::Conflict, "model 'm1' already exists");
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            serde_json::json!({"code": "conflict", "message": "model 'm1' already exists"})
        );
    }
}

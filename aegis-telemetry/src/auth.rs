//! Login and logout against the backend
//!
//! Login submits form-encoded credentials and expects a bearer token plus a
//! user descriptor back. The token goes straight into the credential store;
//! nothing else writes it.

use crate::credentials::Credential;
use crate::decoder::{ContentKind, Decoder};
use crate::error::{Result, TelemetryError};
use crate::request::{Call, Endpoint, Method, RequestEngine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// User returned alongside the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub username: String,
    pub id: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub credential: Credential,
    pub user: UserDescriptor,
}

pub async fn authenticate(
    engine: &RequestEngine,
    username: &str,
    password: &str,
) -> Result<AuthSession> {
    let call = Call::new(Endpoint::Login, Method::Post).with_form(vec![
        ("grant_type".to_string(), "password".to_string()),
        ("username".to_string(), username.to_string()),
        ("password".to_string(), password.to_string()),
    ]);
    let response = engine.execute(&call).await?;

    let decoded = Decoder::default().decode(&response.body, ContentKind::Structured);

    if !response.is_success() {
        let message = decoded
            .ok()
            .and_then(|parsed| parsed.into_structured())
            .and_then(|value| error_message(&value))
            .unwrap_or_else(|| "login rejected".to_string());
        warn!("Login failed for {}: HTTP {} {}", username, response.status, message);
        return Err(TelemetryError::HttpStatus {
            status: response.status,
            message,
            database_fault: false,
        });
    }

    let decoded = decoded
        .map_err(TelemetryError::MalformedPayload)?
        .into_structured()
        .unwrap_or(Value::Null);
    let token = ["access_token", "token"]
        .iter()
        .find_map(|key| decoded.get(key).and_then(Value::as_str))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TelemetryError::Unauthenticated("response carried no token".into()))?;

    let user = parse_user(decoded.get("user"), username);
    let credential = engine.credentials().set(token);
    info!("Authenticated as {}", user.username);

    Ok(AuthSession { credential, user })
}

/// Forget the bearer credential; later calls go out unauthenticated
pub fn logout(engine: &RequestEngine) {
    engine.credentials().clear();
    info!("Logged out");
}

fn parse_user(value: Option<&Value>, fallback: &str) -> UserDescriptor {
    let field = |key: &str| {
        value.and_then(|u| u.get(key)).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    UserDescriptor {
        username: field("username").unwrap_or_else(|| fallback.to_string()),
        id: field("id"),
        role: field("role"),
        email: field("email"),
    }
}

pub(crate) fn error_message(value: &Value) -> Option<String> {
    ["detail", "message", "error"].iter().find_map(|key| match value.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other @ (Value::Array(_) | Value::Object(_))) => Some(other.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_user_fills_from_submitted_name() {
        let user = parse_user(Some(&json!({"id": 7, "role": "analyst"})), "alice");
        assert_eq!(user.username, "alice");
        assert_eq!(user.id.as_deref(), Some("7"));
        assert_eq!(user.role.as_deref(), Some("analyst"));
        assert!(user.email.is_none());

        let user = parse_user(None, "bob");
        assert_eq!(user.username, "bob");
    }

    #[test]
    fn test_error_message_keys() {
        assert_eq!(
            error_message(&json!({"detail": "Incorrect username or password"})).as_deref(),
            Some("Incorrect username or password")
        );
        assert_eq!(error_message(&json!({"message": "nope"})).as_deref(), Some("nope"));
        assert!(error_message(&json!({"ok": false})).is_none());
    }
}

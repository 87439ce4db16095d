// Message protocol between popup, background and content scripts
// Every message is a JSON object tagged by `type`

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, GuardResult};
use crate::settings::SettingsPatch;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    #[serde(rename = "TOGGLE_KEY_BLOCKER")]
    Toggle { enabled: bool },
    GetStatus,
    UpdateSettings { settings: SettingsPatch },
    /// Readiness probe sent by the popup while the service worker wakes up
    Ping,
}

impl Message {
    pub const KINDS: [&'static str; 4] = ["TOGGLE_KEY_BLOCKER", "GET_STATUS", "UPDATE_SETTINGS", "PING"];

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Toggle { .. } => "TOGGLE_KEY_BLOCKER",
            Message::GetStatus => "GET_STATUS",
            Message::UpdateSettings { .. } => "UPDATE_SETTINGS",
            Message::Ping => "PING",
        }
    }

    /// Decode a raw payload, telling unknown kinds apart from broken ones
    pub fn from_json(raw: &str) -> GuardResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> GuardResult<Self> {
        let kind = match value.get("type") {
            Some(serde_json::Value::String(kind)) => kind.clone(),
            Some(other) => return Err(GuardError::UnknownMessageKind(other.to_string())),
            None => return Err(GuardError::UnknownMessageKind("<missing>".to_string())),
        };
        if !Self::KINDS.contains(&kind.as_str()) {
            return Err(GuardError::UnknownMessageKind(kind));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> GuardResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `{enabled, version?}`, derived on demand and never stored
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// Variant order matters for decoding: serde tries them top to bottom
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Response {
    Error { error: String },
    Toggled { success: bool, enabled: bool },
    Status(StatusSnapshot),
    Ack { success: bool },
}

impl Response {
    pub fn error(err: &GuardError) -> Self {
        let error = match err {
            GuardError::UnknownMessageKind(kind) => format!("Unknown message type: {}", kind),
            other => other.to_string(),
        };
        Response::Error { error }
    }

    pub fn to_json(&self) -> GuardResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> GuardResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Response::Toggled { success: true, .. } | Response::Ack { success: true }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_matches_host_scripts() {
        let toggle = Message::Toggle { enabled: false };
        assert_eq!(
            serde_json::to_value(&toggle).unwrap(),
            json!({"type": "TOGGLE_KEY_BLOCKER", "enabled": false})
        );
        assert_eq!(
            serde_json::to_value(Message::GetStatus).unwrap(),
            json!({"type": "GET_STATUS"})
        );

        let update = Message::from_value(json!({
            "type": "UPDATE_SETTINGS",
            "settings": {"keyBlockerEnabled": true}
        }))
        .unwrap();
        match update {
            Message::UpdateSettings { settings } => assert_eq!(settings.enabled, Some(true)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_reported_by_name() {
        let err = Message::from_json(r#"{"type":"RESET_EVERYTHING"}"#).unwrap_err();
        assert_eq!(err, GuardError::UnknownMessageKind("RESET_EVERYTHING".into()));
        assert_eq!(
            Response::error(&err),
            Response::Error {
                error: "Unknown message type: RESET_EVERYTHING".into()
            }
        );
    }

    #[test]
    fn test_missing_type_is_unknown() {
        let err = Message::from_json(r#"{"enabled":true}"#).unwrap_err();
        assert!(matches!(err, GuardError::UnknownMessageKind(_)));
    }

    #[test]
    fn test_known_kind_with_bad_payload_is_malformed() {
        let err = Message::from_json(r#"{"type":"TOGGLE_KEY_BLOCKER","enabled":"yes"}"#).unwrap_err();
        assert!(matches!(err, GuardError::Malformed(_)));
    }

    #[test]
    fn test_kind_list_covers_every_variant() {
        let all = [
            Message::Toggle { enabled: true },
            Message::GetStatus,
            Message::UpdateSettings {
                settings: SettingsPatch::default(),
            },
            Message::Ping,
        ];
        for message in all {
            assert!(Message::KINDS.contains(&message.kind()));
            let decoded = Message::from_json(&message.to_json().unwrap()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_response_decoding_picks_the_right_shape() {
        assert_eq!(
            Response::from_json(r#"{"success":true,"enabled":false}"#).unwrap(),
            Response::Toggled {
                success: true,
                enabled: false
            }
        );
        assert_eq!(
            Response::from_json(r#"{"enabled":true,"version":"2.1.0"}"#).unwrap(),
            Response::Status(StatusSnapshot {
                enabled: true,
                version: Some("2.1.0".into())
            })
        );
        assert_eq!(
            Response::from_json(r#"{"enabled":false}"#).unwrap(),
            Response::Status(StatusSnapshot {
                enabled: false,
                version: None
            })
        );
        assert_eq!(
            Response::from_json(r#"{"success":false}"#).unwrap(),
            Response::Ack { success: false }
        );
        assert!(!Response::Ack { success: false }.is_success());
    }
}

//! JSON control requests.

use serde::Serialize;
use serde_json::Value;

/// Body of `POST {base}/control`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlRequest {
    pub zone_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl ControlRequest {
    pub fn new(zone_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            action: action.into(),
            value: None,
            params: None,
        }
    }

    /// Absolute volume, the JSON twin of the fast-path volume command.
    pub fn volume_absolute(zone_id: impl Into<String>, value: f32) -> Self {
        Self {
            value: Some(value),
            ..Self::new(zone_id, "vol_abs")
        }
    }

    pub fn with_params(mut self, params: Option<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Outcome reported in a control response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    Accepted,
    /// The body carried an `"error"` key; the message is its string value.
    Rejected(String),
}

/// Inspects a control response body.
///
/// Only a JSON object with an `"error"` key is a rejection, regardless of
/// HTTP status. Empty, plain-text and other non-object bodies are accepted.
pub fn check_control_response(body: &[u8]) -> ControlReply {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return ControlReply::Accepted;
    };
    match value.get("error") {
        Some(Value::String(msg)) => ControlReply::Rejected(msg.clone()),
        Some(other) => ControlReply::Rejected(other.to_string()),
        None => ControlReply::Accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn volume_request_shape() {
        let body = serde_json::to_value(ControlRequest::volume_absolute("z1", -12.5)).unwrap();
        assert_eq!(
            body,
            json!({"zone_id": "z1", "action": "vol_abs", "value": -12.5})
        );
    }

    #[test]
    fn params_are_forwarded() {
        let request = ControlRequest::new("z1", "shuffle").with_params(Some(json!({"on": true})));
        let body = serde_json::to_value(request).unwrap();
        assert_eq!(
            body,
            json!({"zone_id": "z1", "action": "shuffle", "params": {"on": true}})
        );
    }

    #[test]
    fn error_key_means_rejected() {
        assert_eq!(
            check_control_response(br#"{"error":"zone offline"}"#),
            ControlReply::Rejected("zone offline".into())
        );
        assert_eq!(
            check_control_response(br#"{"error":{"code":7}}"#),
            ControlReply::Rejected(r#"{"code":7}"#.into())
        );
        assert_eq!(
            check_control_response(br#"{"ok":true}"#),
            ControlReply::Accepted
        );
        assert_eq!(check_control_response(b"  "), ControlReply::Accepted);
    }

    #[test]
    fn plain_text_body_is_accepted() {
        assert_eq!(check_control_response(b"OK"), ControlReply::Accepted);
        assert_eq!(
            check_control_response(b"<html>done</html>"),
            ControlReply::Accepted
        );
        assert_eq!(check_control_response(b"[1, 2]"), ControlReply::Accepted);
    }
}

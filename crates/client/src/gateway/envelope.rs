//! The uniform `{ success | status, message, ... }` response wrapper.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Backend error texts meaning the request was already applied.
const ALREADY_PROCESSED_MARKERS: &[&str] = &[
    "already processed",
    "already used",
    "already verified",
    "already abandoned",
    "已處理",
    "已核銷",
    "已使用",
    "已放棄",
];

/// Why an envelope was produced without a usable backend reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The request never completed (DNS, connect, TLS, reset, ...).
    Transport,
    /// The backend answered with a status outside 200-299.
    Status(u16),
    /// The reply body was not a JSON object.
    Malformed,
}

/// A parsed backend reply, or a stand-in for one that could not be obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    success: bool,
    message: Option<String>,
    body: Map<String, Value>,
    failure: Option<Failure>,
}

impl Envelope {
    /// Interpret a JSON reply body.
    ///
    /// `success: true` and `status: "success"` are both accepted as the
    /// success signal. The failure message is read from `message`, falling
    /// back to `error`.
    ///
    /// Returns `None` when the body is not a JSON object.
    #[must_use]
    pub fn from_body(body: Value) -> Option<Self> {
        let Value::Object(body) = body else {
            return None;
        };

        let success = body.get("success").and_then(Value::as_bool) == Some(true)
            || body
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|status| status.trim().eq_ignore_ascii_case("success"));

        let message = ["message", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::to_string);

        Some(Self {
            success,
            message,
            body,
            failure: None,
        })
    }

    /// An envelope standing in for a reply that could not be obtained.
    #[must_use]
    pub fn failed(failure: Failure, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            body: Map::new(),
            failure: Some(failure),
        }
    }

    /// Whether the backend reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Whether a well-formed reply came back from the backend, successful or not.
    #[must_use]
    pub const fn reached_backend(&self) -> bool {
        self.failure.is_none()
    }

    /// Why no backend reply is available, if that is the case.
    #[must_use]
    pub const fn failure(&self) -> Option<Failure> {
        self.failure
    }

    /// The failure message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Raw access to a body field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Deserialize a body field, `None` if absent, null, or of the wrong shape.
    #[must_use]
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.body.get(key)? {
            Value::Null => None,
            value => match serde_json::from_value(value.clone()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!(field = key, error = %e, "Unexpected envelope field shape");
                    None
                }
            },
        }
    }

    /// The first of `keys` that deserializes.
    #[must_use]
    pub fn first_field<T: DeserializeOwned>(&self, keys: &[&str]) -> Option<T> {
        keys.iter().find_map(|key| self.field(key))
    }

    /// Whether a failed reply says the request had already been applied.
    #[must_use]
    pub fn is_already_processed(&self) -> bool {
        if self.success || !self.reached_backend() {
            return false;
        }
        self.message.as_deref().is_some_and(|message| {
            let lower = message.to_lowercase();
            ALREADY_PROCESSED_MARKERS
                .iter()
                .any(|marker| lower.contains(marker))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_success_flag_conventions_are_synonyms() {
        assert!(Envelope::from_body(json!({"success": true})).unwrap().is_success());
        assert!(Envelope::from_body(json!({"status": "success"})).unwrap().is_success());
        assert!(!Envelope::from_body(json!({"success": false})).unwrap().is_success());
        assert!(!Envelope::from_body(json!({"status": "error"})).unwrap().is_success());
        assert!(!Envelope::from_body(json!({"success": "true"})).unwrap().is_success());
        assert!(!Envelope::from_body(json!({})).unwrap().is_success());
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        assert!(Envelope::from_body(json!([1, 2])).is_none());
        assert!(Envelope::from_body(json!("ok")).is_none());
    }

    #[test]
    fn test_message_falls_back_to_error() {
        let envelope = Envelope::from_body(json!({"success": false, "error": "boom"})).unwrap();
        assert_eq!(envelope.message(), Some("boom"));
    }

    #[test]
    fn test_field_shape_mismatch_is_none() {
        let envelope = Envelope::from_body(json!({"data": "nope", "count": 3})).unwrap();
        assert_eq!(envelope.field::<Vec<String>>("data"), None);
        assert_eq!(envelope.field::<u32>("count"), Some(3));
        assert_eq!(
            envelope.first_field::<u32>(&["missing", "count"]),
            Some(3)
        );
    }

    #[test]
    fn test_already_processed_detection() {
        let envelope = Envelope::from_body(
            json!({"success": false, "message": "Coupon Already Processed"}),
        )
        .unwrap();
        assert!(envelope.is_already_processed());

        let envelope =
            Envelope::from_body(json!({"success": false, "message": "此優惠券已核銷"})).unwrap();
        assert!(envelope.is_already_processed());

        let envelope =
            Envelope::from_body(json!({"success": false, "message": "not found"})).unwrap();
        assert!(!envelope.is_already_processed());
    }

    #[test]
    fn test_transport_failure_is_never_already_processed() {
        let envelope = Envelope::failed(Failure::Transport, "already processed");
        assert!(!envelope.reached_backend());
        assert!(!envelope.is_already_processed());
    }
}

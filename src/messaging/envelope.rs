//! # Call Envelope
//!
//! The serializable unit of work: one deferred function call.
//!
//! On the wire an envelope is a JSON array
//! `[function_id, args, kwargs, deferral_seconds]`. Control Messages share the
//! same shape and are distinguished only by the reserved
//! [`CONTROL_LOG_SENTINEL`] function identifier.

use serde_json::{Map, Value};

use crate::constants::CONTROL_LOG_SENTINEL;
use crate::error::EnvelopeError;

/// Positional arguments of a call
pub type Args = Vec<Value>;

/// Named arguments of a call
pub type Kwargs = Map<String, Value>;

type WireTuple = (String, Args, Kwargs, f64);

/// Immutable description of one function call
#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    function_id: String,
    args: Args,
    kwargs: Kwargs,
    deferral_seconds: f64,
}

impl CallEnvelope {
    /// Create an envelope, validating the deferral hint
    pub fn new(
        function_id: impl Into<String>,
        args: Args,
        kwargs: Kwargs,
        deferral_seconds: f64,
    ) -> Result<Self, EnvelopeError> {
        let function_id = function_id.into();
        if function_id.is_empty() {
            return Err(EnvelopeError::EmptyFunctionId);
        }
        if !deferral_seconds.is_finite() || deferral_seconds < 0.0 {
            return Err(EnvelopeError::InvalidDeferral {
                value: deferral_seconds,
            });
        }

        Ok(Self {
            function_id,
            args,
            kwargs,
            deferral_seconds,
        })
    }

    /// Build the Control Message reporting a suppressed call
    pub fn control_log(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            function_id: CONTROL_LOG_SENTINEL.to_string(),
            args: vec![Value::String(message.into()), Value::String(context.into())],
            kwargs: Kwargs::new(),
            deferral_seconds: 0.0,
        }
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    pub fn deferral_seconds(&self) -> f64 {
        self.deferral_seconds
    }

    pub fn is_control(&self) -> bool {
        self.function_id == CONTROL_LOG_SENTINEL
    }

    /// `(message, context)` of a Control Message; `None` for regular calls
    pub fn control_notice(&self) -> Option<(String, String)> {
        if !self.is_control() {
            return None;
        }

        let render = |value: Option<&Value>| match value {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };

        Some((render(self.args.first()), render(self.args.get(1))))
    }

    pub fn into_parts(self) -> (String, Args, Kwargs, f64) {
        (self.function_id, self.args, self.kwargs, self.deferral_seconds)
    }

    /// Encode as the wire 4-tuple
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let wire = (
            &self.function_id,
            &self.args,
            &self.kwargs,
            self.deferral_seconds,
        );
        serde_json::to_vec(&wire).map_err(|e| EnvelopeError::serialization(e.to_string()))
    }

    /// Decode and validate a wire payload
    pub fn from_bytes(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let (function_id, args, kwargs, deferral_seconds): WireTuple =
            serde_json::from_slice(payload).map_err(|e| EnvelopeError::malformed(e.to_string()))?;

        Self::new(function_id, args, kwargs, deferral_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn kwargs(value: Value) -> Kwargs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_wire_shape_is_a_four_element_array() {
        let envelope = CallEnvelope::new(
            "app.mail.send_email",
            vec![json!(1)],
            kwargs(json!({"to": "a@b.com"})),
            0.0,
        )
        .unwrap();

        let wire: Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wire,
            json!(["app.mail.send_email", [1], {"to": "a@b.com"}, 0.0])
        );
    }

    #[test]
    fn test_decodes_integer_deferral() {
        let envelope =
            CallEnvelope::from_bytes(br#"["app.jobs.recalc", [], {"id": 7}, 30]"#).unwrap();
        assert_eq!(envelope.function_id(), "app.jobs.recalc");
        assert_eq!(envelope.kwargs().get("id"), Some(&json!(7)));
        assert_eq!(envelope.deferral_seconds(), 30.0);
        assert!(!envelope.is_control());
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        let cases: &[&[u8]] = &[
            b"not json at all",
            br#"{"function_id": "a.b"}"#,
            br#"["a.b", [], {}]"#,
            br#"["a.b", [], {}, 0, "extra"]"#,
            br#"["a.b", {}, {}, 0]"#,
            br#"[7, [], {}, 0]"#,
            b"\xff\xfe",
        ];
        for payload in cases {
            assert!(
                matches!(
                    CallEnvelope::from_bytes(payload),
                    Err(EnvelopeError::Malformed { .. })
                ),
                "payload {:?} should be malformed",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_rejects_invalid_deferral_and_empty_id() {
        assert!(matches!(
            CallEnvelope::from_bytes(br#"["a.b", [], {}, -1]"#),
            Err(EnvelopeError::InvalidDeferral { .. })
        ));
        assert!(matches!(
            CallEnvelope::new("a.b", vec![], Kwargs::new(), f64::NAN),
            Err(EnvelopeError::InvalidDeferral { .. })
        ));
        assert!(matches!(
            CallEnvelope::from_bytes(br#"["", [], {}, 0]"#),
            Err(EnvelopeError::EmptyFunctionId)
        ));
    }

    #[test]
    fn test_control_message_round_trip() {
        let control = CallEnvelope::control_log("Would have called", "app.mail.send_email");
        assert!(control.is_control());

        let decoded = CallEnvelope::from_bytes(&control.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_control());
        assert_eq!(
            decoded.control_notice(),
            Some((
                "Would have called".to_string(),
                "app.mail.send_email".to_string()
            ))
        );
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = CallEnvelope::from_bytes(&payload);
        }
    }
}

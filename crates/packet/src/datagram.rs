//! The datagram envelope and its JSON codec.

use crate::error::{Error, Result};
use crate::{DatagramType, ErrorCondition, Function};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One protocol message.
///
/// `arguments` is positional: order is part of the meaning and is never
/// changed by the codec.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Datagram {
    /// Correlation id. Replies reuse the id of the request they answer.
    #[serde(default)]
    pub id: String,

    /// Request, result, error, or something this side does not understand.
    #[serde(default, rename = "type")]
    pub kind: DatagramType,

    /// RPC function name. Empty on most replies.
    #[serde(default)]
    pub function: String,

    /// Positional arguments.
    #[serde(default, deserialize_with = "nullable_arguments")]
    pub arguments: Vec<Value>,
}

// Peers built on nil-able slices send `"arguments": null` for an empty list.
fn nullable_arguments<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<Value>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Datagram {
    /// Generates a fresh, collision-resistant datagram id (UUIDv4).
    #[must_use]
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Creates a request for `function` with a fresh id and no arguments.
    #[must_use]
    pub fn request(function: &Function) -> Self {
        Self {
            id: Self::new_id(),
            kind: DatagramType::Request,
            function: function.as_str().to_string(),
            arguments: Vec::new(),
        }
    }

    /// Creates the keepalive probe: an `F_PING` request with a fresh id.
    #[must_use]
    pub fn ping() -> Self {
        Self::request(&Function::Ping)
    }

    /// Creates a successful reply to request `id`.
    #[must_use]
    pub fn result(id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DatagramType::Result,
            function: function.into(),
            arguments: Vec::new(),
        }
    }

    /// Creates an error reply to request `id`.
    #[must_use]
    pub fn error(
        id: impl Into<String>,
        function: impl Into<String>,
        condition: ErrorCondition,
        message: impl Into<String>,
    ) -> Self {
        let mut datagram = Self {
            id: id.into(),
            kind: DatagramType::Error,
            function: function.into(),
            arguments: Vec::with_capacity(2),
        };
        datagram.push(condition);
        datagram.push(message.into());
        datagram
    }

    /// Decodes a datagram from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the text is not JSON or a field has the
    /// wrong JSON type.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::Decode)
    }

    /// Encodes the datagram to its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Encode)
    }

    /// Appends an argument after the existing ones.
    pub fn push(&mut self, argument: impl Into<Value>) {
        self.arguments.push(argument.into());
    }

    /// Builder form of [`Datagram::push`].
    #[must_use]
    pub fn with_argument(mut self, argument: impl Into<Value>) -> Self {
        self.push(argument);
        self
    }

    /// Parsed form of the `function` field.
    #[must_use]
    pub fn function(&self) -> Function {
        Function::parse(&self.function)
    }

    /// Argument at `idx`, if present.
    #[must_use]
    pub fn argument(&self, idx: usize) -> Option<&Value> {
        self.arguments.get(idx)
    }

    /// Argument at `idx` if it is present and a string.
    #[must_use]
    pub fn argument_str(&self, idx: usize) -> Option<&str> {
        self.argument(idx).and_then(Value::as_str)
    }

    /// Argument at `idx` as a string, or `default` when absent or not a string.
    #[must_use]
    pub fn string_argument_or<'a>(&'a self, idx: usize, default: &'a str) -> &'a str {
        self.argument_str(idx).unwrap_or(default)
    }

    /// Reads the fixed `[condition, message]` layout of an error datagram.
    ///
    /// Missing or mistyped fields degrade to [`ErrorCondition::Invalid`] and an
    /// empty message.
    #[must_use]
    pub fn error_parts(&self) -> (ErrorCondition, String) {
        let condition = self
            .argument_str(0)
            .map_or(ErrorCondition::Invalid, ErrorCondition::parse);
        let message = self.string_argument_or(1, "").to_string();
        (condition, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_field_layout() {
        let datagram = Datagram {
            id: "abc".to_string(),
            kind: DatagramType::Request,
            function: "F_PING".to_string(),
            arguments: vec![],
        };

        assert_eq!(
            datagram.encode().unwrap(),
            r#"{"id":"abc","type":"T_REQUEST","function":"F_PING","arguments":[]}"#
        );
    }

    #[test]
    fn test_decode_reply_without_function() {
        let datagram = Datagram::decode(r#"{"id":"abc","type":"T_RESULT","arguments":[]}"#).unwrap();

        assert_eq!(datagram.id, "abc");
        assert_eq!(datagram.kind, DatagramType::Result);
        assert_eq!(datagram.function(), Function::None);
        assert!(datagram.arguments.is_empty());
    }

    #[test]
    fn test_decode_null_arguments() {
        let datagram =
            Datagram::decode(r#"{"id":"x","type":"T_REQUEST","function":"F_PING","arguments":null}"#)
                .unwrap();
        assert!(datagram.arguments.is_empty());
    }

    #[test]
    fn test_decode_unknown_type_is_not_an_error() {
        let datagram = Datagram::decode(r#"{"id":"x","type":"T_BOGUS"}"#).unwrap();
        assert_eq!(datagram.kind, DatagramType::Unknown("T_BOGUS".to_string()));
    }

    #[test]
    fn test_decode_failures() {
        assert!(Datagram::decode("not json").is_err());
        assert!(Datagram::decode(r#"{"id":42}"#).is_err());
        assert!(Datagram::decode(r#"{"id":"x","arguments":"nope"}"#).is_err());
        assert!(Datagram::decode(r#"{"id":"x","type":7}"#).is_err());
    }

    #[test]
    fn test_push_preserves_order() {
        let datagram = Datagram::request(&Function::Identify)
            .with_argument("serial")
            .with_argument("mac")
            .with_argument(3)
            .with_argument(json!({"k": "v"}));

        assert_eq!(
            datagram.arguments,
            vec![json!("serial"), json!("mac"), json!(3), json!({"k": "v"})]
        );
    }

    #[test]
    fn test_error_parts() {
        let datagram = Datagram::error("id", "F_UBUS", ErrorCondition::NotAllowed, "nope");
        assert_eq!(
            datagram.error_parts(),
            (ErrorCondition::NotAllowed, "nope".to_string())
        );

        let truncated = Datagram::decode(r#"{"id":"x","type":"T_ERROR","arguments":[5]}"#).unwrap();
        assert_eq!(
            truncated.error_parts(),
            (ErrorCondition::Invalid, String::new())
        );
    }

    #[test]
    fn test_argument_accessors_fall_back() {
        let datagram = Datagram::request(&Function::BusCall).with_argument("Get");

        assert_eq!(datagram.argument_str(0), Some("Get"));
        assert_eq!(datagram.argument_str(1), None);
        assert_eq!(datagram.string_argument_or(2, "fallback"), "fallback");
    }

    #[test]
    fn test_fresh_ids_differ() {
        assert_ne!(Datagram::ping().id, Datagram::ping().id);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            ".*".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    fn arb_kind() -> impl Strategy<Value = DatagramType> {
        prop_oneof![
            Just(DatagramType::Request),
            Just(DatagramType::Result),
            Just(DatagramType::Error),
            "[A-Z_]{0,10}".prop_map(|raw| DatagramType::parse(&raw)),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            id in ".*",
            kind in arb_kind(),
            function in ".*",
            arguments in prop::collection::vec(arb_value(), 0..6),
        ) {
            let datagram = Datagram { id, kind, function, arguments };
            let decoded = Datagram::decode(&datagram.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, datagram);
        }
    }
}

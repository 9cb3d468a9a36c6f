use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Typed envelope carried in a notification payload.
///
/// The wire format is a JSON object:
///
/// ```json
/// {"type": "order.created", "id": "o-1", "data": {"amount": 42}}
/// ```
///
/// - `type`: discriminates the event category. Required, non-empty.
/// - `id`: used by handlers for correlation and idempotency. Required, non-empty.
/// - `data`: arbitrary nested JSON. Optional; `null` and absent are the same.
///
/// Unknown fields are ignored so that producers can extend the payload
/// without breaking older listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Event {
    pub fn new<K, I>(kind: K, id: I) -> Self
    where
        K: Into<String>,
        I: Into<String>,
    {
        Self {
            kind: kind.into(),
            id: id.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Decode a raw notification payload.
    ///
    /// Fails closed: a payload that isn't a JSON object with string `type`
    /// and `id` fields, or where either of them is empty, yields an error
    /// and never a partially populated event.
    pub fn decode(payload: &str) -> Result<Event> {
        // Going through a map first rejects JSON arrays, which serde would
        // otherwise accept as a positional encoding of the struct.
        let object: Map<String, Value> = serde_json::from_str(payload)?;
        let event: Event = serde_json::from_value(Value::Object(object))?;
        if event.kind.is_empty() {
            return Err(Error::EmptyField("type"));
        }
        if event.id.is_empty() {
            return Err(Error::EmptyField("id"));
        }
        Ok(event)
    }
}

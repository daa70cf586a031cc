//! Tagged objects
//!
//! Every value crossing the engine boundary is a JSON object whose `@type`
//! key names its variant. `TaggedObject` keeps the discriminator apart from
//! the named fields so the rest of the runtime never has to special-case it.

use crate::errors::{CoreError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Key carrying the discriminator on the wire
pub const TYPE_KEY: &str = "@type";

/// Named field map of a tagged object
pub type Fields = Map<String, Value>;

/// A discriminated protocol object
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedObject {
    tag: String,
    fields: Fields,
}

impl TaggedObject {
    /// Create an object with no fields
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Fields::new(),
        }
    }

    /// Create an object from an existing field map.
    ///
    /// A stray `@type` entry in `fields` is dropped; the explicit tag wins.
    pub fn with_fields(tag: impl Into<String>, mut fields: Fields) -> Self {
        fields.remove(TYPE_KEY);
        Self {
            tag: tag.into(),
            fields,
        }
    }

    /// Builder-style field insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Discriminator of this object
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Named fields, without the discriminator
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Mutable access to the named fields
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    /// Consume into the named fields
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Raw field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Boolean field
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Integer field; 64-bit values travel as decimal strings, so both
    /// encodings are accepted.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(value_as_i64)
    }

    /// Nested tagged object field
    pub fn get_object(&self, key: &str) -> Option<TaggedObject> {
        self.get(key)
            .and_then(|value| TaggedObject::from_value(value.clone()).ok())
    }

    /// Follow a dotted path (`message.chat_id`) through nested objects
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Parse a JSON value carrying an `@type` discriminator
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut map) => match map.remove(TYPE_KEY) {
                Some(Value::String(tag)) => Ok(Self { tag, fields: map }),
                Some(_) => Err(CoreError::codec("`@type` must be a string")),
                None => Err(CoreError::codec("object has no `@type`")),
            },
            other => Err(CoreError::codec(format!(
                "expected a tagged object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Flatten back into the wire representation
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(TYPE_KEY.to_string(), Value::String(self.tag.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Consume into the wire representation
    pub fn into_value(self) -> Value {
        let mut map = self.fields;
        map.insert(TYPE_KEY.to_string(), Value::String(self.tag));
        Value::Object(map)
    }
}

impl From<TaggedObject> for Value {
    fn from(object: TaggedObject) -> Self {
        object.into_value()
    }
}

impl Serialize for TaggedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TaggedObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        TaggedObject::from_value(value).map_err(de::Error::custom)
    }
}

/// Read an integer that may be encoded as a JSON number or a decimal string
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

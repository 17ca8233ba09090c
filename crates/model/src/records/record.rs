use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single source document.
///
/// The engine never looks inside a record; only the serializer does.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Record(fields)
    }

    /// Builds a record from any JSON value. Non-object values are wrapped
    /// under a single `value` field.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Record(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Record(map)
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

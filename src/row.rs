//! Open-schema rows as served by the wordsearch service.
//!
//! A row has no fixed columns. The UI only relies on a handful of
//! conventional fields (`id`, `Lemma`, `Summary`, `explain`, `defination`
//! and `meet`), everything else is displayed as-is.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

pub const ID_FIELD: &str = "id";
pub const LEMMA_FIELD: &str = "Lemma";
pub const MEET_FIELD: &str = "meet";
pub const SUMMARY_FIELDS: [&str; 3] = ["Summary", "explain", "defination"];
pub const DEFINITION_FIELDS: [&str; 2] = ["defination", "explain"];

/// Value of a single column.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldValue {
    #[default]
    Absent,
    Text(String),
    Number(Number),
}

impl FieldValue {
    /// String shown to the user. Absent values render empty.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Absent => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Absent,
            Value::String(s) => FieldValue::Text(s),
            Value::Number(n) => FieldValue::Number(n),
            // Anything outside the closed variant is kept as its JSON text
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(Number::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(Number::from(value))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Absent => serializer.serialize_none(),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Number(n) => n.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Value::deserialize(deserializer)?.into())
    }
}

/// Identity of a row, used as list key and as update target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Number(Number),
    Text(String),
}

impl RowId {
    /// Percent-encoded form for use in `rows/{id}`.
    pub fn path_segment(&self) -> String {
        urlencoding::encode(&self.to_string()).into_owned()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Number(n) => write!(f, "{n}"),
            RowId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId::Number(Number::from(value))
    }
}

impl From<i32> for RowId {
    fn from(value: i32) -> Self {
        RowId::Number(Number::from(value))
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId::Text(value.to_string())
    }
}

static ABSENT: FieldValue = FieldValue::Absent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, FieldValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> &FieldValue {
        self.0.get(key).unwrap_or(&ABSENT)
    }

    /// All fields, sorted by key.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn id(&self) -> Option<RowId> {
        match self.get(ID_FIELD) {
            FieldValue::Number(n) => Some(RowId::Number(n.clone())),
            FieldValue::Text(s) if !s.is_empty() => Some(RowId::Text(s.clone())),
            _ => None,
        }
    }

    pub fn lemma(&self) -> String {
        self.get(LEMMA_FIELD).display()
    }

    pub fn summary(&self) -> String {
        self.first_non_empty(&SUMMARY_FIELDS)
    }

    pub fn definition(&self) -> String {
        self.first_non_empty(&DEFINITION_FIELDS)
    }

    pub fn meet(&self) -> String {
        self.get(MEET_FIELD).display()
    }

    pub fn is_favorite(&self) -> bool {
        is_favorite_value(&self.meet())
    }

    /// Key used to keep list state stable across refetches: the id, else the position.
    /// The id, or `#<index>` for rows without one so the two never collide.
    pub fn list_key(&self, index: usize) -> String {
        match self.id() {
            Some(id) => id.to_string(),
            None => format!("#{index}"),
        }
    }

    fn first_non_empty(&self, keys: &[&str]) -> String {
        keys.iter()
            .map(|key| self.get(key).display())
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }
}

pub fn is_favorite_value(meet: &str) -> bool {
    !meet.trim().is_empty()
}

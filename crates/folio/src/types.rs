use crate::dotpath::DotPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Front-matter key/value map of one entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(flatten)]
    pub raw: BTreeMap<String, Value>,
}

impl Meta {
    pub fn new(raw: BTreeMap<String, Value>) -> Self {
        Self { raw }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.raw.contains_key(key)
    }

    /// Looks up a key, descending into nested maps for dotted names
    /// (`author.name`). A literal key containing dots wins over descent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.raw.get(key) {
            return Some(value);
        }

        let path = DotPath::parse(key);
        let mut current = self.raw.get(path.head())?;
        let mut next = path.descend();
        while let Some(segment) = next {
            current = current.as_object()?.get(segment.head())?;
            next = segment.descend();
        }
        Some(current)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_string)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Every scalar under `key`: a single value yields one item, a list
    /// yields its scalar members.
    pub fn values(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
            Some(value) => scalar_string(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.raw.remove(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.raw.insert(key.into(), value);
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.raw.clone().into_iter().collect())
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                raw: map.into_iter().collect(),
            },
            _ => Self::default(),
        }
    }
}

/// Renders a scalar front-matter value as text; maps and lists have none.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Three-way comparison of raw front-matter values. Numbers compare
/// numerically, strings lexically; mixed kinds fall back to their textual
/// form so ordering stays total.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Hidden,
}

impl Visibility {
    /// An explicit `visibility` key wins; otherwise a leading `_` in the
    /// filename hides the entry.
    pub fn resolve(meta: &Meta, filename: &str) -> Self {
        match meta.get_string("visibility").as_deref() {
            Some("hidden") => Visibility::Hidden,
            Some("public") => Visibility::Public,
            _ if filename.starts_with('_') => Visibility::Hidden,
            _ => Visibility::Public,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Hidden => "hidden",
        }
    }
}

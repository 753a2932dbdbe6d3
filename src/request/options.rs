//! Request options.
//!
//! Options arrive as a loosely typed map (from code, the CLI, or a JSON
//! document) and are passed to termini verbatim, except for the handful the
//! request promotes to first-class accessors.

use std::collections::BTreeMap;

use serde_json::Value;
use url::form_urlencoded;

use crate::error::{IndirectorError, Result};

/// One option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<OptionValue>),
    Map(BTreeMap<String, OptionValue>),
}

impl OptionValue {
    /// Everything except null and `false` counts as set.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, OptionValue::Null | OptionValue::Bool(false))
    }

    /// Scalar values rendered as text; `None` for null, lists and maps.
    pub fn as_text(&self) -> Option<String> {
        match self {
            OptionValue::Bool(b) => Some(b.to_string()),
            OptionValue::Int(i) => Some(i.to_string()),
            OptionValue::Float(f) => Some(f.to_string()),
            OptionValue::Str(s) => Some(s.clone()),
            OptionValue::Null | OptionValue::List(_) | OptionValue::Map(_) => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v.into())
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

impl<T: Into<OptionValue>> From<Vec<T>> for OptionValue {
    fn from(v: Vec<T>) -> Self {
        OptionValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(OptionValue::Null)
    }
}

impl From<Value> for OptionValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => OptionValue::Null,
            Value::Bool(b) => OptionValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => OptionValue::Int(i),
                None => OptionValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => OptionValue::Str(s),
            Value::Array(items) => OptionValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                OptionValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// String-keyed request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options(BTreeMap<String, OptionValue>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// Options from a JSON value: `null` is empty, an object is a map, anything else is rejected.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self(map.into_iter().map(|(k, v)| (k, v.into())).collect())),
            other => Err(IndirectorError::Argument(format!(
                "Request options must be a hash, not {}",
                json_kind(&other)
            ))),
        }
    }

    /// Form-encode the options as a query string (no leading `?`).
    ///
    /// Null values are skipped, lists expand to repeated keys, and nested
    /// lists or maps are rejected.
    pub fn query_string(&self) -> Result<String> {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.0 {
            match value {
                OptionValue::Null => {}
                OptionValue::List(items) => {
                    for item in items {
                        match item {
                            OptionValue::Null => {}
                            OptionValue::List(_) | OptionValue::Map(_) => {
                                return Err(IndirectorError::Argument(format!(
                                    "Option {} contains a value that cannot be put in a query string",
                                    key
                                )));
                            }
                            scalar => {
                                if let Some(text) = scalar.as_text() {
                                    serializer.append_pair(key, &text);
                                }
                            }
                        }
                    }
                }
                OptionValue::Map(_) => {
                    return Err(IndirectorError::Argument(format!(
                        "Option {} is a hash and cannot be put in a query string",
                        key
                    )));
                }
                scalar => {
                    if let Some(text) = scalar.as_text() {
                        serializer.append_pair(key, &text);
                    }
                }
            }
        }
        Ok(serializer.finish())
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a hash",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(query: &str) -> Vec<(String, String)> {
        form_urlencoded::parse(query.as_bytes()).into_owned().collect()
    }

    #[test]
    fn test_empty_query_string() {
        assert_eq!(Options::new().query_string().unwrap(), "");
    }

    #[test]
    fn test_scalars_are_stringified() {
        let options = Options::new()
            .with("one", "one two")
            .with("flag", true)
            .with("off", false)
            .with("count", 50)
            .with("ratio", 1.2)
            .with("skipped", OptionValue::Null);

        assert_eq!(
            parsed(&options.query_string().unwrap()),
            vec![
                ("count".to_string(), "50".to_string()),
                ("flag".to_string(), "true".to_string()),
                ("off".to_string(), "false".to_string()),
                ("one".to_string(), "one two".to_string()),
                ("ratio".to_string(), "1.2".to_string()),
            ]
        );
    }

    #[test]
    fn test_lists_repeat_keys() {
        let options = Options::new().with(
            "one",
            OptionValue::List(vec!["one".into(), "two".into(), OptionValue::Null]),
        );
        assert_eq!(options.query_string().unwrap(), "one=one&one=two");
    }

    #[test]
    fn test_nested_values_are_rejected() {
        let nested = Options::new().with(
            "one",
            OptionValue::List(vec!["one".into(), OptionValue::List(vec!["no".into()])]),
        );
        assert!(nested.query_string().unwrap_err().is_argument());

        let map = Options::from_json(json!({"one": {"not": "allowed"}})).unwrap();
        assert!(map.query_string().unwrap_err().is_argument());
    }

    #[test]
    fn test_from_json() {
        assert!(Options::from_json(Value::Null).unwrap().is_empty());
        let options = Options::from_json(json!({"node": "foo.com", "n": 3})).unwrap();
        assert_eq!(options.get("n"), Some(&OptionValue::Int(3)));

        let err = Options::from_json(json!(["not", "a", "map"])).unwrap_err();
        assert!(err.is_argument());
        assert!(err.to_string().contains("an array"));
    }
}

//! A generic JSON document model.
//!
//! Served by the `indirector` binary and used by the CLI; any structured
//! value can be stored under a name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::error::{IndirectorError, Result};
use crate::model::{Format, Model};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
            expiration: None,
        }
    }
}

// Expiration is envelope state, not content.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data == other.data
    }
}

impl Envelope for Document {
    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    fn set_expiration(&mut self, expiration: Option<DateTime<Utc>>) {
        self.expiration = expiration;
    }
}

fn check_format(mime: &str) -> Result<()> {
    match Format::by_mime(mime) {
        Some(Format::JSON) | Some(Format::PSON) => Ok(()),
        _ => Err(IndirectorError::Deserialization(format!(
            "Document cannot be converted from '{}'",
            mime
        ))),
    }
}

impl Model for Document {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn supported_formats() -> Vec<Format> {
        vec![Format::JSON, Format::PSON]
    }

    fn render(&self, format: Format) -> Result<Vec<u8>> {
        match format {
            Format::JSON | Format::PSON => Ok(serde_json::to_vec(self)?),
            other => Err(IndirectorError::Argument(format!(
                "Document cannot be rendered as {}",
                other.name
            ))),
        }
    }

    fn convert_from(mime: &str, body: &[u8]) -> Result<Self> {
        check_format(mime)?;
        serde_json::from_slice(body)
            .map_err(|e| IndirectorError::Deserialization(format!("Invalid document: {}", e)))
    }

    fn convert_from_multiple(mime: &str, body: &[u8]) -> Result<Vec<Self>> {
        check_format(mime)?;
        serde_json::from_slice(body)
            .map_err(|e| IndirectorError::Deserialization(format!("Invalid document list: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_and_convert() {
        let doc = Document::new("web01", json!({"role": "web"}));
        let body = doc.render(Format::PSON).unwrap();
        let back = Document::convert_from("text/pson", &body).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_equality_ignores_expiration() {
        let mut a = Document::new("a", json!(1));
        let b = Document::new("a", json!(1));
        a.set_expiration(Some(Utc::now()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsupported_mime() {
        let err = Document::convert_from("text/yaml", b"--- {}").unwrap_err();
        assert!(matches!(err, IndirectorError::Deserialization(_)));
    }

    #[test]
    fn test_multiple() {
        let docs = Document::convert_from_multiple(
            "application/json; charset=utf-8",
            br#"[{"name":"a"},{"name":"b","data":[1]}]"#,
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].data, json!([1]));
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    List,
    Map,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Map => value.is_object(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "bool",
            FieldKind::List => "list",
            FieldKind::Map => "map",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

impl SchemaField {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("driver config is not valid json: {0}")]
    Malformed(String),
    #[error("driver config must be a map")]
    NotAMap,
    #[error("missing required field {0:?}")]
    Missing(String),
    #[error("field {field:?} must be a {expected}")]
    WrongKind { field: String, expected: FieldKind },
    #[error("unknown field {0:?}")]
    Unknown(String),
}

/// Shape of the opaque driver config map.
///
/// The orchestrator validates job input against it before the config reaches
/// `StartTask`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSchema {
    pub fields: Vec<SchemaField>,
}

impl ConfigSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        let map = value.as_object().ok_or(SchemaError::NotAMap)?;

        for key in map.keys() {
            if self.field(key).is_none() {
                return Err(SchemaError::Unknown(key.clone()));
            }
        }
        for field in &self.fields {
            match map.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaError::Missing(field.name.clone()));
                }
                None | Some(Value::Null) => {}
                Some(v) if !field.kind.matches(v) => {
                    return Err(SchemaError::WrongKind {
                        field: field.name.clone(),
                        expected: field.kind,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validate a raw driver config blob; an absent blob is treated as `{}`.
    pub fn validate_bytes(&self, raw: Option<&[u8]>) -> Result<(), SchemaError> {
        let value: Value = match raw {
            None => Value::Object(Default::default()),
            Some(raw) => {
                serde_json::from_slice(raw).map_err(|e| SchemaError::Malformed(e.to_string()))?
            }
        };
        self.validate(&value)
    }
}

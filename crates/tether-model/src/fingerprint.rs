use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// Typed attribute reported by fingerprints and device groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub value: AttributeValue,
    pub unit: Option<String>,
}

impl Attribute {
    pub fn string(v: impl Into<String>) -> Self {
        Self {
            value: AttributeValue::String(v.into()),
            unit: None,
        }
    }

    pub fn int(v: i64) -> Self {
        Self {
            value: AttributeValue::Int(v),
            unit: None,
        }
    }

    pub fn float(v: f64) -> Self {
        Self {
            value: AttributeValue::Float(v),
            unit: None,
        }
    }

    pub fn bool(v: bool) -> Self {
        Self {
            value: AttributeValue::Bool(v),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            AttributeValue::String(v) => write!(f, "{v}")?,
            AttributeValue::Int(v) => write!(f, "{v}")?,
            AttributeValue::Float(v) => write!(f, "{v}")?,
            AttributeValue::Bool(v) => write!(f, "{v}")?,
        }
        if let Some(unit) = &self.unit {
            write!(f, " {unit}")?;
        }
        Ok(())
    }
}

/// Driver health as seen by its own fingerprinting loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthState {
    #[default]
    Undetected,
    Unhealthy,
    Healthy,
}

/// One sample of the driver fingerprint stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub attributes: BTreeMap<String, Attribute>,
    pub health: HealthState,
    pub health_description: Option<String>,
}

impl Fingerprint {
    pub fn healthy(description: impl Into<String>) -> Self {
        Self {
            health: HealthState::Healthy,
            health_description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(key.into(), attr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_display_includes_unit() {
        assert_eq!(Attribute::int(512).with_unit("MiB").to_string(), "512 MiB");
        assert_eq!(Attribute::bool(true).to_string(), "true");
        assert_eq!(Attribute::string("x86_64").as_str(), Some("x86_64"));
        assert_eq!(Attribute::float(1.5).as_str(), None);
    }

    #[test]
    fn fingerprint_builder() {
        let fp = Fingerprint::healthy("ready").with_attribute("driver.mock", Attribute::bool(true));
        assert_eq!(fp.health, HealthState::Healthy);
        assert_eq!(fp.health_description.as_deref(), Some("ready"));
        assert_eq!(fp.attributes.len(), 1);
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginType {
    Driver,
    Device,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Driver => "driver",
            PluginType::Device => "device",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver" => Ok(PluginType::Driver),
            "device" => Ok(PluginType::Device),
            _ => Err(ModelError::UnknownPluginType(s.to_string())),
        }
    }
}

/// Identity reported by the base plugin surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub plugin_type: PluginType,
    pub plugin_version: String,
    pub api_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plugin_type() {
        assert_eq!("driver".parse::<PluginType>().unwrap(), PluginType::Driver);
        assert_eq!(" Device ".parse::<PluginType>().unwrap(), PluginType::Device);
        assert!("csi".parse::<PluginType>().is_err());
        assert_eq!(PluginType::Device.to_string(), "device");
    }
}

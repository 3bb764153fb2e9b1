use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute bundle a workspace is provisioned with, cheapest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BundleType {
    #[serde(rename = "VALUE")]
    Value,
    #[serde(rename = "STANDARD")]
    Standard,
    #[serde(rename = "PERFORMANCE")]
    Performance,
    #[serde(rename = "POWER")]
    Power,
    #[serde(rename = "POWERPRO")]
    PowerPro,
    #[serde(rename = "GRAPHICS")]
    Graphics,
    #[serde(rename = "GRAPHICSPRO")]
    GraphicsPro,
}

impl BundleType {
    pub const ALL: [BundleType; 7] = [
        BundleType::Value,
        BundleType::Standard,
        BundleType::Performance,
        BundleType::Power,
        BundleType::PowerPro,
        BundleType::Graphics,
        BundleType::GraphicsPro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "VALUE",
            Self::Standard => "STANDARD",
            Self::Performance => "PERFORMANCE",
            Self::Power => "POWER",
            Self::PowerPro => "POWERPRO",
            Self::Graphics => "GRAPHICS",
            Self::GraphicsPro => "GRAPHICSPRO",
        }
    }

    pub fn has_gpu(&self) -> bool {
        matches!(self, Self::Graphics | Self::GraphicsPro)
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid bundle type `{0}` (expected one of VALUE|STANDARD|PERFORMANCE|POWER|POWERPRO|GRAPHICS|GRAPHICSPRO)")]
pub struct InvalidBundleType(pub String);

impl FromStr for BundleType {
    type Err = InvalidBundleType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace(['_', ' ', '-'], "");
        Self::ALL
            .into_iter()
            .find(|bundle| bundle.as_str() == normalized)
            .ok_or_else(|| InvalidBundleType(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::BundleType;

    #[test]
    fn parses_bundle_names_loosely() {
        assert_eq!("power".parse::<BundleType>(), Ok(BundleType::Power));
        assert_eq!("Graphics Pro".parse::<BundleType>(), Ok(BundleType::GraphicsPro));
        assert_eq!("power_pro".parse::<BundleType>(), Ok(BundleType::PowerPro));
        assert!("quantum".parse::<BundleType>().is_err());
    }

    #[test]
    fn serializes_as_upper_case_name() {
        let encoded = serde_json::to_string(&BundleType::PowerPro).expect("serialize");
        assert_eq!(encoded, "\"POWERPRO\"");
    }
}

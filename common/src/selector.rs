use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a video source: a capture device index or a file path.
///
/// Parsed from the same string form the configuration endpoint accepts:
/// all-digit strings are device indices, anything else is a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceSelector {
    Device(u32),
    Path(String),
}

impl FromStr for SourceSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse::<u32>()
                .map(SourceSelector::Device)
                .map_err(|_| SelectorError::DeviceIndex(trimmed.to_string()));
        }
        if trimmed.contains('\0') {
            return Err(SelectorError::InvalidPath(trimmed.to_string()));
        }
        Ok(SourceSelector::Path(trimmed.to_string()))
    }
}

impl TryFrom<String> for SourceSelector {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceSelector> for String {
    fn from(value: SourceSelector) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSelector::Device(index) => write!(f, "{index}"),
            SourceSelector::Path(path) => f.write_str(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("source selector must not be empty")]
    Empty,
    #[error("device index {0:?} is out of range")]
    DeviceIndex(String),
    #[error("invalid source path {0:?}")]
    InvalidPath(String),
}

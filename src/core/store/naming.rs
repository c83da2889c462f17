//! Sample file naming: `<base-capture-id>.<grid-index>.<label-bit>.<format>`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// File format written for new samples
pub const SAMPLE_FORMAT: &str = "png";

/// Training label of a grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    fn bit(self) -> u8 {
        match self {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }

    fn from_bit(bit: &str) -> Option<Self> {
        match bit {
            "0" => Some(Label::Negative),
            "1" => Some(Label::Positive),
            _ => None,
        }
    }
}

impl From<bool> for Label {
    fn from(selected: bool) -> Self {
        if selected {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

/// Parsed sample file name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleName {
    /// Identifier of the capture the cell was cut from
    pub base: String,
    /// Index of the cell within the capture grid
    pub grid_index: u32,
    pub label: Label,
    /// File extension
    pub format: String,
}

impl SampleName {
    /// Name for a PNG sample
    pub fn new(base: impl Into<String>, grid_index: u32, label: Label) -> Self {
        Self {
            base: base.into(),
            grid_index,
            label,
            format: SAMPLE_FORMAT.to_string(),
        }
    }

    /// Parse a file name (not a path). Returns `None` when the name does not
    /// follow the convention.
    pub fn parse(file_name: &str) -> Option<Self> {
        let mut parts = file_name.rsplitn(4, '.');
        let format = parts.next()?;
        let label = Label::from_bit(parts.next()?)?;
        let grid_index = parts.next()?.parse().ok()?;
        let base = parts.next()?;

        if base.is_empty() || format.is_empty() {
            return None;
        }

        Some(Self {
            base: base.to_string(),
            grid_index,
            label,
            format: format.to_string(),
        })
    }

    /// Capture identifier for "now": UTC timestamp with nanoseconds,
    /// e.g. `20240131235959123456789`
    pub fn new_capture_base() -> String {
        Utc::now().format("%Y%m%d%H%M%S%9f").to_string()
    }
}

impl std::fmt::Display for SampleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.base,
            self.grid_index,
            self.label.bit(),
            self.format
        )
    }
}

//! Printer generations and machine-type detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Printer/firmware family; decides which classifier and interception rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrinterProfile {
    /// MK3-class board (Gen2). The only legacy profile.
    #[default]
    #[serde(rename = "MK3")]
    Mk3,
    #[serde(rename = "MK3_5")]
    Mk35,
    #[serde(rename = "MK3_9")]
    Mk39,
    #[serde(rename = "MK4")]
    Mk4,
    #[serde(rename = "COREONE")]
    CoreOne,
}

// Checked in order; first containment wins.
const MACHINE_TYPES: &[(&str, PrinterProfile)] = &[
    ("MK3.5", PrinterProfile::Mk35),
    ("MK3.9", PrinterProfile::Mk39),
    ("MK4", PrinterProfile::Mk4),
    ("COREONE", PrinterProfile::CoreOne),
];

impl PrinterProfile {
    /// Maps a machine-type or firmware identification string to a profile.
    /// Unknown input falls back to [`PrinterProfile::Mk3`].
    pub fn detect(machine_type: &str) -> PrinterProfile {
        MACHINE_TYPES
            .iter()
            .find(|(marker, _)| machine_type.contains(marker))
            .map(|(_, profile)| *profile)
            .unwrap_or_default()
    }

    pub fn is_legacy(self) -> bool {
        self == PrinterProfile::Mk3
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrinterProfile::Mk3 => "MK3",
            PrinterProfile::Mk35 => "MK3_5",
            PrinterProfile::Mk39 => "MK3_9",
            PrinterProfile::Mk4 => "MK4",
            PrinterProfile::CoreOne => "COREONE",
        }
    }
}

impl fmt::Display for PrinterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrinterProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MK3" | "MK3S" => Ok(PrinterProfile::Mk3),
            "MK3_5" | "MK3.5" => Ok(PrinterProfile::Mk35),
            "MK3_9" | "MK3.9" => Ok(PrinterProfile::Mk39),
            "MK4" => Ok(PrinterProfile::Mk4),
            "COREONE" => Ok(PrinterProfile::CoreOne),
            other => Err(format!("unknown printer profile '{}'", other)),
        }
    }
}

/// Extracts the value of `MACHINE_TYPE:` from an M115 capability report.
pub fn machine_type_of(line: &str) -> Option<&str> {
    const KEY: &str = "MACHINE_TYPE:";
    let start = line.find(KEY)? + KEY.len();
    let value = line[start..].split_whitespace().next()?;
    Some(value)
}

//! MMU state record and the sparse patches classifiers produce against it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::profile::PrinterProfile;

/// Number of filament channels on the unit.
pub const SLOT_COUNT: u8 = 5;

/// Normalized operating state of the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MmuStatus {
    #[default]
    NotFound,
    Starting,
    Ok,
    Loaded,
    Loading,
    /// Preloading filament into the unit, not the nozzle.
    #[serde(rename = "LOADING_MMU")]
    LoadingToUnit,
    Unloading,
    UnloadingFinal,
    Cutting,
    Ejecting,
    PausedUser,
    Attention,
}

impl fmt::Display for MmuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MmuStatus::NotFound => "NOT_FOUND",
            MmuStatus::Starting => "STARTING",
            MmuStatus::Ok => "OK",
            MmuStatus::Loaded => "LOADED",
            MmuStatus::Loading => "LOADING",
            MmuStatus::LoadingToUnit => "LOADING_MMU",
            MmuStatus::Unloading => "UNLOADING",
            MmuStatus::UnloadingFinal => "UNLOADING_FINAL",
            MmuStatus::Cutting => "CUTTING",
            MmuStatus::Ejecting => "EJECTING",
            MmuStatus::PausedUser => "PAUSED_USER",
            MmuStatus::Attention => "ATTENTION",
        };
        f.write_str(name)
    }
}

/// A filament channel index, always in `0..SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Slot(u8);

impl Slot {
    pub fn new(index: u8) -> Option<Self> {
        (index < SLOT_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// The `T<n>` command selecting this slot.
    pub fn tool_command(self) -> String {
        format!("T{}", self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Slot::new(value).ok_or_else(|| format!("slot {} out of range 0-{}", value, SLOT_COUNT - 1))
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.0
    }
}

/// Response letter of the MMU request/response protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseCode {
    #[serde(rename = "P")]
    Processing,
    #[serde(rename = "E")]
    Error,
    #[serde(rename = "F")]
    Finished,
    #[serde(rename = "A")]
    Accepted,
    #[serde(rename = "R")]
    Rejected,
    #[serde(rename = "B")]
    Button,
}

impl ResponseCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'P' => Some(Self::Processing),
            'E' => Some(Self::Error),
            'F' => Some(Self::Finished),
            'A' => Some(Self::Accepted),
            'R' => Some(Self::Rejected),
            'B' => Some(Self::Button),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Processing => 'P',
            Self::Error => 'E',
            Self::Finished => 'F',
            Self::Accepted => 'A',
            Self::Rejected => 'R',
            Self::Button => 'B',
        }
    }
}

/// Request letter of the MMU request/response protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestCode {
    /// Load to nozzle.
    Tool,
    /// Preload to the unit.
    Load,
    Unload,
    Reset,
    Cut,
    Eject,
}

impl RequestCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'T' => Some(Self::Tool),
            'L' => Some(Self::Load),
            'U' => Some(Self::Unload),
            'X' => Some(Self::Reset),
            'K' => Some(Self::Cut),
            'E' => Some(Self::Eject),
            _ => None,
        }
    }

    /// Whether the request data names a filament slot.
    pub fn carries_slot(self) -> bool {
        matches!(self, Self::Tool | Self::Load | Self::Cut | Self::Eject)
    }
}

/// The authoritative MMU state record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MmuState {
    pub state: MmuStatus,
    pub tool: Option<Slot>,
    pub previous_tool: Option<Slot>,
    pub response: Option<ResponseCode>,
    pub response_data: Option<String>,
    pub printer_profile: Option<PrinterProfile>,
    /// Last raw firmware line, kept for duplicate suppression only.
    #[serde(skip)]
    pub last_line: Option<String>,
    /// Action a terse "done" marker completes.
    #[serde(skip)]
    pub last_action: Option<MmuStatus>,
}

impl MmuState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of `self` with `delta` merged over it.
    pub fn merged(&self, delta: &MmuDelta) -> MmuState {
        let mut next = self.clone();
        if let Some(state) = delta.state {
            next.state = state;
        }
        if let Some(tool) = delta.tool {
            next.tool = tool;
        }
        if let Some(previous_tool) = delta.previous_tool {
            next.previous_tool = previous_tool;
        }
        if let Some(response) = delta.response {
            next.response = response;
        }
        if let Some(response_data) = &delta.response_data {
            next.response_data = response_data.clone();
        }
        if let Some(profile) = delta.printer_profile {
            next.printer_profile = profile;
        }
        if let Some(last_line) = &delta.last_line {
            next.last_line = last_line.clone();
        }
        if let Some(last_action) = delta.last_action {
            next.last_action = last_action;
        }
        next
    }

    /// Compares only the fields a subscriber can see.
    pub fn same_visible(&self, other: &MmuState) -> bool {
        self.state == other.state
            && self.tool == other.tool
            && self.previous_tool == other.previous_tool
            && self.response == other.response
            && self.response_data == other.response_data
            && self.printer_profile == other.printer_profile
    }
}

/// Sparse patch over [`MmuState`].
///
/// The outer `Option` says whether a field is present; an inner `None`
/// clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MmuDelta {
    pub state: Option<MmuStatus>,
    pub tool: Option<Option<Slot>>,
    pub previous_tool: Option<Option<Slot>>,
    pub response: Option<Option<ResponseCode>>,
    pub response_data: Option<Option<String>>,
    pub printer_profile: Option<Option<PrinterProfile>>,
    pub last_line: Option<Option<String>>,
    pub last_action: Option<Option<MmuStatus>>,
}

impl MmuDelta {
    /// A state transition with no protocol payload; clears any stale response.
    pub fn status(state: MmuStatus) -> Self {
        Self {
            state: Some(state),
            response: Some(None),
            response_data: Some(None),
            ..Default::default()
        }
    }

    /// A delta that touches only the tool.
    pub fn tool(tool: Slot) -> Self {
        Self {
            tool: Some(Some(tool)),
            ..Default::default()
        }
    }

    pub fn with_response(mut self, code: ResponseCode, data: impl Into<String>) -> Self {
        self.response = Some(Some(code));
        self.response_data = Some(Some(data.into()));
        self
    }

    pub fn with_tool(mut self, tool: Option<Slot>) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_previous_tool(mut self, previous_tool: Option<Slot>) -> Self {
        self.previous_tool = Some(previous_tool);
        self
    }

    pub fn with_last_line(mut self, line: Option<String>) -> Self {
        self.last_line = Some(line);
        self
    }

    pub fn with_last_action(mut self, action: Option<MmuStatus>) -> Self {
        self.last_action = Some(action);
        self
    }

    pub fn with_profile(mut self, profile: Option<PrinterProfile>) -> Self {
        self.printer_profile = Some(profile);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == MmuDelta::default()
    }
}

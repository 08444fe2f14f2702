//! Firmware log markers and command constants.

/// Tag every MMU log line from newer firmware carries.
pub const PROTOCOL_TAG: &str = "MMU2:";

/// Placeholder command slicers emit for "ask the operator which filament".
pub const TOOL_CHANGE_PLACEHOLDER: &str = "Tx";
/// Default temperature-wait command the pending selection is appended to.
pub const DEFAULT_TEMPERATURE_WAIT: &str = "M109";
/// Tag on commands issued by a timed-out prompt so they are not re-prompted.
pub const TIMEOUT_TAG: &str = "prusaMMUPlugin:timeout";

/// Plain-text messages of older MK3 firmware.
pub mod legacy {
    pub const PAUSED_FOR_USER: &str = "paused for user";
    pub const START: &str = "MMU => 'start'";
    pub const NOT_RESPONDING: &str = "MMU not responding";
    pub const ENABLED: &str = "MMU - ENABLED";
    pub const STARTS_RESPONDING: &str = "MMU starts responding";
    pub const CAN_LOAD: &str = "MMU can_load";
    pub const UNLOADING_FINISHED: &str = "Unloading finished";
    pub const LOAD_SUCCEEDED: &str = "OO succeeded";
}

/// MMU3 request/response logging on MK3 firmware.
pub mod structured {
    /// Prefix of a response line, e.g. `MMU2:<T2 P5*3c.`
    pub const RESPONSE_PREFIX: &str = "MMU2:<";
    pub const SAVING_PARKING: &str = "MMU2:Saving and parking";
    pub const COOLDOWN_PENDING: &str = "MMU2:Heater cooldown pending";
    pub const LCD_CHANGED: &str = "LCD status changed";
}

/// Terse MK3.5/MK3.9/MK4/Core One firmware messages.
pub mod terse {
    pub const PAUSED_USER: &str = "ERR Wait for User";
    pub const ERROR: &str = "Command Error";
    pub const ERROR_FILAMENT: &str = "ERR Help filament";
    pub const ERROR_INTERNAL: &str = "ERR Internal";
    pub const ERROR_TMC: &str = "ERR TMC failed";
    pub const LOADING_FINDA: &str = "Feeding to FINDA";
    pub const LOADING_EXTRUDER: &str = "Feeding to extruder";
    pub const LOADING_FSENSOR: &str = "Feeding to FSensor";
    pub const ACTION_DONE: &str = "MMU2:OK";
    pub const UNLOADING: &str = "Unloading to FINDA";
    pub const UNLOADING_FINAL: &str = "Unloading filament";
    /// Follows [`super::PROTOCOL_TAG`] (after optional spaces) on a start line.
    pub const START: &str = "Start";
}

/// Synthetic progress/error payloads for firmware that no longer reports them.
pub mod payload {
    pub const OK: &str = "0";
    pub const DISENGAGING_IDLER: &str = "2";
    pub const UNLOADING_TO_FINDA: &str = "3";
    pub const FEEDING_TO_FINDA: &str = "5";
    pub const FEEDING_TO_EXTRUDER: &str = "6";
    pub const FEEDING_TO_NOZZLE: &str = "7";
    pub const WAIT_FOR_USER: &str = "c";
    pub const INTERNAL: &str = "d";
    pub const HELP_FILAMENT: &str = "e";
    pub const TMC_FAILED: &str = "f";
}

//! Decides what happens to commands on their way to the printer.

use std::collections::HashSet;

use mmu_shared::codes::TIMEOUT_TAG;
use mmu_shared::config::Config;
use mmu_shared::{MmuDelta, MmuState, MmuStatus, PrinterProfile, Slot};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemapError {
    #[error("filament map has no entry for tool {0}")]
    MissingEntry(u8),
    #[error("filament map sends tool {tool} to slot {target}, which does not exist")]
    InvalidSlot { tool: u8, target: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDecision {
    PassThrough,
    Suppress,
    Rewrite(Vec<String>),
}

/// Decision plus the side effects the caller must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interception {
    pub decision: CommandDecision,
    /// Ask the prompt session to show the chooser.
    pub prompt_requested: bool,
    /// The pending operator selection has been consumed.
    pub selection_consumed: bool,
    pub delta: Option<MmuDelta>,
}

impl Interception {
    fn pass() -> Self {
        Self::with(CommandDecision::PassThrough)
    }

    fn with(decision: CommandDecision) -> Self {
        Self {
            decision,
            prompt_requested: false,
            selection_consumed: false,
            delta: None,
        }
    }
}

/// Everything the interceptor reads besides the command itself.
#[derive(Debug, Clone, Copy)]
pub struct InterceptContext<'a> {
    pub config: &'a Config,
    pub profile: PrinterProfile,
    /// Slot the operator chose to override the firmware's tool selection.
    pub remap_override: Option<Slot>,
    /// Slot picked in a prompt, waiting for the next temperature wait.
    pub pending_selection: Option<Slot>,
}

/// A `T<n>` command: the tool number and whatever follows it.
pub fn parse_tool_command(command: &str) -> Option<(u8, &str)> {
    let rest = command.strip_prefix('T')?;
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let (number, suffix) = rest.split_at(digits);
    if !(suffix.is_empty() || suffix.starts_with(char::is_whitespace) || suffix.starts_with(';')) {
        return None;
    }
    number.parse().ok().map(|tool| (tool, suffix))
}

/// Physical slot for `tool` under the configured filament map.
pub fn map_tool(config: &Config, tool: u8) -> Result<Slot, RemapError> {
    let entry = config
        .filament
        .filament_map
        .get(tool as usize)
        .ok_or(RemapError::MissingEntry(tool))?;
    u8::try_from(entry.id)
        .ok()
        .and_then(Slot::new)
        .ok_or(RemapError::InvalidSlot { tool, target: entry.id })
}

fn rewrite_tool(slot: Slot, suffix: &str) -> Interception {
    Interception::with(CommandDecision::Rewrite(vec![format!("{}{}", slot.tool_command(), suffix)]))
}

/// Applies the interception rules in priority order.
///
/// `hold` asks the host to put the job on hold and reports whether it did;
/// it is only called when a prompt is about to be requested.
pub fn intercept(
    ctx: &InterceptContext<'_>,
    command: &str,
    tags: &HashSet<String>,
    hold: impl FnOnce() -> bool,
) -> Interception {
    if tags.contains(TIMEOUT_TAG) {
        return Interception::pass();
    }

    if let Some((tool, suffix)) = parse_tool_command(command) {
        if let Some(slot) = ctx.remap_override {
            tracing::debug!("Overriding {} with operator choice T{}", command, slot);
            return rewrite_tool(slot, suffix);
        }
        if ctx.config.filament.use_filament_map {
            return match map_tool(ctx.config, tool) {
                Ok(slot) => {
                    tracing::debug!("Filament map sends {} to T{}", command, slot);
                    rewrite_tool(slot, suffix)
                }
                Err(e) => {
                    tracing::warn!("Not remapping '{}': {}", command, e);
                    Interception::pass()
                }
            };
        }
    }

    // Newer firmware picks tools on its own
    if !ctx.profile.is_legacy() {
        return Interception::pass();
    }

    let commands = &ctx.config.commands;
    if command.starts_with(commands.tool_change.as_str()) {
        if !ctx.config.prompt.enabled {
            return Interception::pass();
        }
        if hold() {
            tracing::info!("Holding job for filament choice on '{}'", command);
            return Interception {
                prompt_requested: true,
                ..Interception::with(CommandDecision::Suppress)
            };
        }
        tracing::warn!("Could not hold the job, passing '{}' through", command);
        return Interception::pass();
    }

    if command.starts_with(commands.temperature_wait.as_str()) {
        if let Some(slot) = ctx.pending_selection {
            tracing::debug!("Appending T{} to '{}'", slot, command);
            return Interception {
                selection_consumed: true,
                delta: Some(MmuDelta::tool(slot)),
                ..Interception::with(CommandDecision::Rewrite(vec![command.to_string(), slot.tool_command()]))
            };
        }
    }

    Interception::pass()
}

/// Tracks tool changes from `T0`-`T4` commands actually sent to the printer.
pub fn track_sent_tool(mmu: &MmuState, command: &str) -> Option<MmuDelta> {
    let (tool, _) = parse_tool_command(command)?;
    let slot = Slot::new(tool)?;
    if mmu.state == MmuStatus::Loaded {
        // Re-selecting the loaded tool is a no-op for the firmware too
        if mmu.tool == Some(slot) {
            return None;
        }
        return Some(
            MmuDelta::status(MmuStatus::Unloading)
                .with_tool(Some(slot))
                .with_previous_tool(mmu.tool),
        );
    }
    Some(MmuDelta::tool(slot))
}

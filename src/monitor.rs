//! The single owner of MMU state, prompt, and configuration.
//!
//! Every input (firmware line, outgoing command, lifecycle signal, operator
//! choice, prompt expiry) is a method call on [`MmuMonitor`]; the host must
//! serialize those calls, which [`crate::service::MonitorService`] does.

use std::collections::HashSet;

use mmu_shared::codes::TIMEOUT_TAG;
use mmu_shared::profile::machine_type_of;
use mmu_shared::{Config, MmuDelta, MmuState, MmuStatus, PrinterControl, PrinterProfile, Slot};
use thiserror::Error;
use uuid::Uuid;

use crate::classifier::classify_line;
use crate::dispatch::{EventDispatcher, MmuEvent};
use crate::interceptor::{CommandDecision, InterceptContext, intercept, track_sent_tool};
use crate::prompt::{PromptChoice, PromptError, PromptSession, PromptTimer};
use crate::store::MmuStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("{0} is not a valid value for filament choice")]
    InvalidChoice(String),
    #[error("No active prompt")]
    NoActivePrompt,
    #[error("A prompt is already active")]
    PromptAlreadyActive,
    #[error("Monitor is no longer running")]
    ChannelClosed,
}

impl MonitorError {
    /// HTTP-style status for API rejections.
    pub fn status_code(&self) -> u16 {
        match self {
            MonitorError::InvalidChoice(_) => 400,
            MonitorError::NoActivePrompt | MonitorError::PromptAlreadyActive => 409,
            MonitorError::ChannelClosed => 503,
        }
    }
}

impl From<PromptError> for MonitorError {
    fn from(e: PromptError) -> Self {
        match e {
            PromptError::AlreadyActive => MonitorError::PromptAlreadyActive,
            PromptError::NotActive => MonitorError::NoActivePrompt,
        }
    }
}

/// Host lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Disconnected,
    PrintStarted,
    PrintDone,
    PrintCancelled,
    PrintFailed,
}

pub struct MmuMonitor<P: PrinterControl, T: PromptTimer> {
    config: Config,
    store: MmuStore,
    prompt: PromptSession,
    /// Profile reported by the firmware, before any configured override.
    detected_profile: Option<PrinterProfile>,
    /// Operator choice that replaces every tool selection on newer profiles.
    remap_override: Option<Slot>,
    dispatcher: EventDispatcher,
    printer: P,
    timer: T,
}

impl<P: PrinterControl, T: PromptTimer> MmuMonitor<P, T> {
    pub fn new(mut config: Config, printer: P, timer: T, dispatcher: EventDispatcher) -> Self {
        config.normalize();
        let mut monitor = Self {
            config,
            store: MmuStore::new(),
            prompt: PromptSession::new(),
            detected_profile: None,
            remap_override: None,
            dispatcher,
            printer,
            timer,
        };
        monitor.resolve_profile();
        monitor
    }

    pub fn state(&self) -> &MmuState {
        self.store.state()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Profile in effect; MK3 until the firmware says otherwise.
    pub fn profile(&self) -> PrinterProfile {
        self.store.state().printer_profile.unwrap_or_default()
    }

    pub fn prompt_active(&self) -> bool {
        self.prompt.is_active()
    }

    pub fn selected_filament(&self) -> Option<Slot> {
        self.prompt.selected_filament()
    }

    pub fn remap_override(&self) -> Option<Slot> {
        self.remap_override
    }

    pub fn printer(&self) -> &P {
        &self.printer
    }

    pub fn printer_mut(&mut self) -> &mut P {
        &mut self.printer
    }

    fn apply(&mut self, delta: &MmuDelta) -> bool {
        let (state, changed) = self.store.apply(delta);
        if changed {
            self.dispatcher.publish(MmuEvent::MmuChanged(state));
        }
        changed
    }

    /// Re-publishes the current snapshot regardless of dedup.
    pub fn refresh(&self) {
        self.dispatcher.publish(MmuEvent::MmuChanged(self.store.state().clone()));
    }

    fn resolve_profile(&mut self) {
        let profile = self.config.printer_profile.or(self.detected_profile);
        if profile != self.store.state().printer_profile {
            tracing::info!("Printer profile is now {:?}", profile);
            self.apply(&MmuDelta::default().with_profile(profile));
        }
    }

    /// Firmware identification, possibly repeated.
    pub fn handle_firmware_info(&mut self, machine_type: &str) {
        let detected = PrinterProfile::detect(machine_type);
        tracing::debug!("Machine type '{}' detected as {}", machine_type, detected);
        self.detected_profile = Some(detected);
        self.resolve_profile();
    }

    /// A line received from the printer.
    pub fn handle_line(&mut self, line: &str) {
        if let Some(machine_type) = machine_type_of(line) {
            self.handle_firmware_info(machine_type);
            return;
        }
        let deltas = classify_line(self.profile(), self.store.state(), line);
        for delta in &deltas {
            self.apply(delta);
        }
    }

    /// A command queued for the printer, before it is sent.
    pub fn handle_command(&mut self, command: &str, tags: &HashSet<String>) -> CommandDecision {
        let ctx = InterceptContext {
            config: &self.config,
            profile: self.profile(),
            remap_override: self.remap_override,
            pending_selection: self.prompt.selected_filament(),
        };
        let printer = &mut self.printer;
        let interception = intercept(&ctx, command, tags, || printer.set_job_on_hold(true));
        tracing::debug!("Command '{}' -> {:?}", command, interception.decision);

        if interception.selection_consumed {
            self.prompt.take_selected_filament();
        }
        if let Some(delta) = &interception.delta {
            self.apply(delta);
        }
        if interception.prompt_requested {
            if let Err(e) = self.start_prompt() {
                tracing::warn!("Prompt requested for '{}' but not started: {}", command, e);
            }
        }
        interception.decision
    }

    /// A command the host actually sent to the printer.
    pub fn handle_sent(&mut self, command: &str) {
        if let Some(delta) = track_sent_tool(self.store.state(), command) {
            self.apply(&delta);
        }
    }

    /// Shows the filament chooser and arms its deadline.
    pub fn start_prompt(&mut self) -> Result<Uuid, MonitorError> {
        let timeout = self.config.prompt.timeout_duration();
        let session = self.prompt.start(&mut self.timer, timeout)?;
        self.dispatcher.publish(MmuEvent::ShowPrompt {
            session,
            timeout_secs: timeout.as_secs(),
        });
        Ok(session)
    }

    /// Operator answer from the API, validated here.
    pub fn select(&mut self, choice: i64) -> Result<(), MonitorError> {
        if !self.prompt.is_active() {
            return Err(MonitorError::NoActivePrompt);
        }
        let choice = PromptChoice::from_request(choice)
            .ok_or_else(|| MonitorError::InvalidChoice(choice.to_string()))?;
        self.resolve_prompt(choice)
    }

    pub fn resolve_prompt(&mut self, choice: PromptChoice) -> Result<(), MonitorError> {
        self.prompt.resolve(choice)?;
        if !self.profile().is_legacy() {
            self.remap_override = match choice {
                PromptChoice::Slot(slot) => Some(slot),
                PromptChoice::Skip => None,
            };
        }
        if let PromptChoice::Slot(slot) = choice {
            self.apply(&MmuDelta::tool(slot));
        }
        self.finish_prompt();
        Ok(())
    }

    /// Expiry notice from the timer. Stale notices are ignored.
    pub fn prompt_expired(&mut self, session: Uuid) {
        if !self.prompt.is_current(session) {
            tracing::debug!("Ignoring expiry of finished prompt {}", session);
            return;
        }
        tracing::info!("Prompt {} timed out", session);
        if self.profile().is_legacy() {
            match self.config.prompt.fallback_filament() {
                Some(slot) => self.prompt.set_selected_filament(Some(slot)),
                None => {
                    let command = self.config.commands.tool_change.clone();
                    self.printer.send_commands(&[command], &[TIMEOUT_TAG]);
                }
            }
        }
        self.finish_prompt();
    }

    fn finish_prompt(&mut self) {
        let session = self.prompt.session_id();
        if self.prompt.finish(&mut self.timer) {
            if let Some(session) = session {
                self.dispatcher.publish(MmuEvent::ClosePrompt { session });
            }
            self.printer.set_job_on_hold(false);
        }
    }

    pub fn handle_lifecycle(&mut self, event: Lifecycle) {
        tracing::info!("Lifecycle event {:?}", event);
        match event {
            Lifecycle::Disconnected => {
                self.finish_prompt();
                self.prompt.set_selected_filament(None);
                self.remap_override = None;
                self.detected_profile = None;
                self.apply(
                    &MmuDelta::status(MmuStatus::NotFound)
                        .with_tool(None)
                        .with_previous_tool(None)
                        .with_last_line(None)
                        .with_last_action(None),
                );
                self.resolve_profile();
            }
            Lifecycle::PrintStarted => {
                self.prompt.set_selected_filament(None);
                self.remap_override = None;
            }
            Lifecycle::PrintFailed if self.store.state().state == MmuStatus::Attention => {}
            Lifecycle::PrintDone | Lifecycle::PrintCancelled | Lifecycle::PrintFailed => {
                self.apply(
                    &MmuDelta::status(MmuStatus::Ok)
                        .with_tool(None)
                        .with_previous_tool(None)
                        .with_last_line(None)
                        .with_last_action(None),
                );
            }
        }
    }

    /// New settings. The profile is re-resolved against the override.
    pub fn update_config(&mut self, mut config: Config) {
        config.normalize();
        self.config = config;
        self.resolve_profile();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::NoTimer;
    use mmu_shared::DetachedPrinter;

    fn monitor() -> (MmuMonitor<DetachedPrinter, NoTimer>, tokio::sync::mpsc::UnboundedReceiver<MmuEvent>) {
        let (dispatcher, events) = EventDispatcher::new();
        (MmuMonitor::new(Config::default(), DetachedPrinter, NoTimer, dispatcher), events)
    }

    #[test]
    fn test_starts_not_found_without_profile() {
        let (monitor, _events) = monitor();
        assert_eq!(monitor.state().state, MmuStatus::NotFound);
        assert_eq!(monitor.state().printer_profile, None);
        assert_eq!(monitor.profile(), PrinterProfile::Mk3);
    }

    #[test]
    fn test_config_override_sets_profile() {
        let (dispatcher, _events) = EventDispatcher::new();
        let config = Config {
            printer_profile: Some(PrinterProfile::Mk4),
            ..Default::default()
        };
        let mut monitor = MmuMonitor::new(config, DetachedPrinter, NoTimer, dispatcher);
        assert_eq!(monitor.profile(), PrinterProfile::Mk4);
        monitor.handle_firmware_info("MK3S");
        assert_eq!(monitor.profile(), PrinterProfile::Mk4);
        monitor.update_config(Config::default());
        assert_eq!(monitor.profile(), PrinterProfile::Mk3);
        assert_eq!(monitor.state().printer_profile, Some(PrinterProfile::Mk3));
    }

    #[test]
    fn test_m115_line_detects_profile() {
        let (mut monitor, _events) = monitor();
        monitor.handle_line("FIRMWARE_NAME:Prusa-Firmware-Buddy 6.0.0 MACHINE_TYPE:MK4 EXTRUDER_COUNT:1");
        assert_eq!(monitor.profile(), PrinterProfile::Mk4);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(MonitorError::InvalidChoice("7".to_string()).status_code(), 400);
        assert_eq!(MonitorError::NoActivePrompt.status_code(), 409);
        assert_eq!(MonitorError::PromptAlreadyActive.status_code(), 409);
    }

    #[test]
    fn test_select_without_prompt_is_conflict() {
        let (mut monitor, _events) = monitor();
        assert_eq!(monitor.select(2), Err(MonitorError::NoActivePrompt));
    }
}

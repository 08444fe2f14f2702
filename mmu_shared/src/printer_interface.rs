//! What the monitor needs from the printer host it is embedded in.

/// Host-side printer control.
///
/// Calls arrive on the monitor's single consumer, so implementations only
/// need to be `Send`.
pub trait PrinterControl: Send {
    /// Places the running job on hold (`true`) or releases it. Returns
    /// whether the host honored the request.
    fn set_job_on_hold(&mut self, hold: bool) -> bool;

    /// Queues commands to the printer, carrying `tags` through the host's
    /// own command hooks.
    fn send_commands(&mut self, commands: &[String], tags: &[&str]);
}

/// A host with no printer attached. Holds always fail and commands are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedPrinter;

impl PrinterControl for DetachedPrinter {
    fn set_job_on_hold(&mut self, hold: bool) -> bool {
        tracing::debug!("No printer attached, ignoring hold={}", hold);
        false
    }

    fn send_commands(&mut self, commands: &[String], tags: &[&str]) {
        tracing::debug!("No printer attached, dropping {:?} (tags {:?})", commands, tags);
    }
}

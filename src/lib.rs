// mmu-monitor: tracks a Prusa MMU from the printer's serial traffic

pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod interceptor;
pub mod monitor;
pub mod prompt;
pub mod replay;
pub mod service;
pub mod store;

pub use dispatch::{EventDispatcher, MmuEvent};
pub use interceptor::CommandDecision;
pub use monitor::{Lifecycle, MmuMonitor, MonitorError};
pub use prompt::{PromptChoice, PromptTimer};
pub use service::{MonitorHandle, MonitorService, MonitorSnapshot};

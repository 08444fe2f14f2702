// mmu_shared: MMU state model, protocol constants, and configuration shared by hosts

pub mod codes;
pub mod config;
pub mod printer_interface;
pub mod profile;
pub mod state;

pub use config::{Config, ConfigError};
pub use printer_interface::{DetachedPrinter, PrinterControl};
pub use profile::PrinterProfile;
pub use state::{MmuDelta, MmuState, MmuStatus, RequestCode, ResponseCode, Slot, SLOT_COUNT};

pub use mmu_shared::config::*;

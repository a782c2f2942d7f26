pub mod child;
pub mod orchestrator;
pub mod restore;

pub use orchestrator::PtyOrchestrator;
pub use restore::{RawModeGuard, enable_raw_mode, install_panic_restore_hook, restore_terminal};

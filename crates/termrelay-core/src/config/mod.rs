//! Configuration loading and merging.
//!
//! Configuration is assembled in the following order (later sources override
//! earlier ones):
//! 1. **Environment variables** — `TERMRELAY_TELEGRAM_TOKEN`, `TERMRELAY_CHAT_ID`
//! 2. **Dotenv file** — an owner-only `.env` in the working directory or `$HOME`
//! 3. **CLI flags** — highest priority

pub mod loading;
pub mod types;

pub use loading::{CliOverrides, load_bridge_config};
pub use types::BridgeConfig;

/// Fully resolved configuration for a bridge run.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Telegram bot token (from `TERMRELAY_TELEGRAM_TOKEN` or `--token`).
    pub telegram_token: String,
    /// The single chat id authorized to drive the bridge.
    pub chat_id: i64,
    /// Optional path to mirror chunked, ANSI-safe output to on disk.
    pub output_stream: Option<std::path::PathBuf>,
    /// Whether raw PTY output is also mirrored to the local terminal.
    pub mirror_enabled: bool,
    /// Whether a trailing carriage return is injected after translated input.
    pub enter_enabled: bool,
    /// Whether debug-level logging is enabled.
    pub verbose: bool,
    /// Whether the process should just print its own chat id and exit.
    pub register: bool,
    /// The target program and its arguments.
    pub program: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_cloneable_and_debuggable() {
        let config = BridgeConfig {
            telegram_token: "t".to_string(),
            chat_id: 1,
            output_stream: None,
            mirror_enabled: true,
            enter_enabled: true,
            verbose: false,
            register: false,
            program: vec!["sh".to_string()],
        };
        let cloned = config.clone();
        assert_eq!(format!("{cloned:?}").contains("sh"), true);
    }
}

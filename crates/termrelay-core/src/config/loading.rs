use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

use super::types::BridgeConfig;

const ENV_TOKEN: &str = "TERMRELAY_TELEGRAM_TOKEN";
const ENV_CHAT_ID: &str = "TERMRELAY_CHAT_ID";

/// Values supplied on the command line. `None` means "not passed"; CLI flags
/// always win over environment/dotenv values when present.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub token: Option<String>,
    pub chat_id: Option<i64>,
    pub output_stream: Option<PathBuf>,
    pub no_mirror: bool,
    pub enter: Option<bool>,
    pub verbose: bool,
    pub register: bool,
    pub program: Vec<String>,
}

/// Load the dotenv file at `path` if it exists and is owner-only, then apply
/// its values into the process environment via `dotenvy`.
///
/// A world- or group-readable `.env` holding a bot token is a credential leak
/// waiting to happen, so an insecure file is rejected rather than silently
/// loaded.
fn load_dotenv_if_present(path: &Path) -> Result<(), ConfigError> {
    if !path.is_file() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)?;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(ConfigError::InsecurePermissions {
                path: path.display().to_string(),
                mode: mode & 0o777,
            });
        }
    }

    dotenvy::from_path(path).map_err(|e| ConfigError::Invalid {
        field: "dotenv",
        message: e.to_string(),
    })?;

    Ok(())
}

/// Merge env vars, an optional owner-only `.env`, and CLI overrides into a
/// `BridgeConfig`. CLI flags win over everything else.
pub fn load_bridge_config(cli: CliOverrides) -> Result<BridgeConfig, ConfigError> {
    if let Ok(cwd) = std::env::current_dir() {
        load_dotenv_if_present(&cwd.join(".env"))?;
    }
    if let Some(home) = dirs::home_dir() {
        load_dotenv_if_present(&home.join(".env"))?;
    }

    let telegram_token = cli
        .token
        .or_else(|| std::env::var(ENV_TOKEN).ok())
        .ok_or(ConfigError::Missing {
            field: "telegram_token",
            env_var: ENV_TOKEN,
            flag: "--token",
        })?;

    let chat_id = match cli.chat_id {
        Some(id) => id,
        None => {
            if cli.register {
                0
            } else {
                let raw = std::env::var(ENV_CHAT_ID).map_err(|_| ConfigError::Missing {
                    field: "chat_id",
                    env_var: ENV_CHAT_ID,
                    flag: "--chat-id",
                })?;
                raw.parse::<i64>().map_err(|_| ConfigError::Invalid {
                    field: "chat_id",
                    message: format!("'{raw}' is not an integer chat id"),
                })?
            }
        }
    };

    if !cli.register && cli.program.is_empty() {
        return Err(ConfigError::Missing {
            field: "program",
            env_var: "",
            flag: "<program>...",
        });
    }

    Ok(BridgeConfig {
        telegram_token,
        chat_id,
        output_stream: cli.output_stream,
        mirror_enabled: !cli.no_mirror,
        enter_enabled: cli.enter.unwrap_or(true),
        verbose: cli.verbose,
        register: cli.register,
        program: cli.program,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // std::env mutation is process-global; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn cli_token_wins_over_missing_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var(ENV_TOKEN);
        }
        let cli = CliOverrides {
            token: Some("cli-token".to_string()),
            chat_id: Some(7),
            program: vec!["true".to_string()],
            ..Default::default()
        };
        let config = load_bridge_config(cli).unwrap();
        assert_eq!(config.telegram_token, "cli-token");
        assert_eq!(config.chat_id, 7);
    }

    #[test]
    fn missing_token_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var(ENV_TOKEN);
        }
        let cli = CliOverrides {
            chat_id: Some(1),
            program: vec!["true".to_string()],
            ..Default::default()
        };
        let err = load_bridge_config(cli).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { field: "telegram_token", .. }));
    }

    #[test]
    fn register_mode_does_not_require_chat_id_or_program() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var(ENV_CHAT_ID);
        }
        let cli = CliOverrides {
            token: Some("t".to_string()),
            register: true,
            ..Default::default()
        };
        let config = load_bridge_config(cli).unwrap();
        assert!(config.register);
        assert_eq!(config.chat_id, 0);
    }

    #[test]
    fn no_mirror_flips_mirror_enabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        let cli = CliOverrides {
            token: Some("t".to_string()),
            chat_id: Some(1),
            program: vec!["true".to_string()],
            no_mirror: true,
            ..Default::default()
        };
        let config = load_bridge_config(cli).unwrap();
        assert!(!config.mirror_enabled);
    }

    #[test]
    fn insecure_dotenv_permissions_are_rejected() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "TERMRELAY_TELEGRAM_TOKEN=leaked").unwrap();
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = load_dotenv_if_present(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InsecurePermissions { .. }));
    }

    #[test]
    fn owner_only_dotenv_loads_cleanly() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "SOME_OTHER_VAR=value").unwrap();
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        assert!(load_dotenv_if_present(&path).is_ok());
    }
}

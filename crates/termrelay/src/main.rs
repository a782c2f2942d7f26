use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use termrelay_core::chat::{ChatTransport, TelegramTransport, discover_chat_id};
use termrelay_core::config::{CliOverrides, load_bridge_config};
use termrelay_core::logging::init_logging;
use termrelay_core::{BridgeErrorCode, Session, SessionOutcome};
use tracing::error;

/// Drive a local command-line program over chat through a PTY bridge.
#[derive(Parser, Debug)]
#[command(name = "termrelay", version, about)]
struct Cli {
    /// Authorized peer's chat id.
    #[arg(long)]
    chat_id: Option<i64>,

    /// Discover a chat id: reply to the first inbound message and exit.
    #[arg(long)]
    register: bool,

    /// Tail this file for outbound content instead of the PTY's stdout.
    #[arg(short = 'o', long = "output-stream")]
    output_stream: Option<PathBuf>,

    /// Suppress local terminal mirroring of the child's output.
    #[arg(long)]
    no_mirror: bool,

    /// Force the trailing carriage-return injection on.
    #[arg(short = 'e', long, conflicts_with = "no_enter")]
    enter: bool,

    /// Disable the trailing carriage-return injection.
    #[arg(long)]
    no_enter: bool,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Telegram bot token. Prefer TERMRELAY_TELEGRAM_TOKEN or a `.env` file.
    #[arg(long)]
    token: Option<String>,

    /// The target program and its arguments.
    #[arg(trailing_var_arg = true)]
    program: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let enter_override = if cli.enter {
        Some(true)
    } else if cli.no_enter {
        Some(false)
    } else {
        None
    };

    let overrides = CliOverrides {
        token: cli.token,
        chat_id: cli.chat_id,
        output_stream: cli.output_stream,
        no_mirror: cli.no_mirror,
        enter: enter_override,
        verbose: cli.verbose,
        register: cli.register,
        program: cli.program,
    };

    let config = match load_bridge_config(overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("termrelay: {e} ({})", e.error_code());
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.verbose);

    if config.register {
        return match discover_chat_id(&config.telegram_token).await {
            Ok(chat_id) => {
                println!("Your chat id is {chat_id}.");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(event = "main.register_failed", error = %e);
                eprintln!("termrelay: could not discover chat id: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let transport: Arc<dyn ChatTransport> =
        Arc::new(TelegramTransport::spawn(config.telegram_token, config.chat_id));

    let session = match Session::new(
        &config.program,
        config.output_stream,
        config.mirror_enabled,
        config.enter_enabled,
        config.chat_id,
        transport,
    ) {
        Ok(session) => session,
        Err(e) => {
            error!(event = "main.session_start_failed", error = %e, code = e.error_code());
            eprintln!("termrelay: {e}");
            return ExitCode::FAILURE;
        }
    };

    match session.run().await {
        Ok(SessionOutcome::ChildExited(code)) if code == 0 => ExitCode::SUCCESS,
        Ok(SessionOutcome::ChildExited(code)) => {
            error!(event = "main.child_nonzero_exit", code);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
        Ok(SessionOutcome::Quit) => ExitCode::SUCCESS,
        Err(e) => {
            error!(event = "main.session_failed", error = %e, code = e.error_code());
            eprintln!("termrelay: {e}");
            ExitCode::FAILURE
        }
    }
}

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize JSON-to-stderr logging.
///
/// `verbose` toggles the default directive between `info` and `debug`;
/// `RUST_LOG` still overrides it when set.
pub fn init_logging(verbose: bool) {
    let directive = if verbose {
        "termrelay=debug"
    } else {
        "termrelay=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .with(
            EnvFilter::from_default_env()
                .add_directive(directive.parse().expect("invalid log directive")),
        )
        .init();
}

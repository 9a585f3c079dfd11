use super::commands::Cli;
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, EnvFilter};

pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "info,pulse_daemon=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = fmt::layer().with_target(cli.verbose >= 2);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

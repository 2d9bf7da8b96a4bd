//! Console logging setup (§10.1), adapted from the grounding repository's
//! `logging::init_logging`. There is no project-directory concept in this
//! service, so only the console layer is carried over; the rolling
//! file-appender half of the original is dropped (noted in DESIGN.md).

use std::io::{self, IsTerminal};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::ColorChoice;

pub fn init_logging(verbosity: u8, color: ColorChoice) {
    tracing_log::LogTracer::init().expect("failed to install log tracer");

    let console_filter = match verbosity {
        0 => "info",
        1 => "info,scriptserve=debug",
        2 => "info,scriptserve=trace",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_filter));

    let use_ansi = match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal(),
    };

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(use_ansi)
        .without_time()
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(env_filter)
        .init();
}

/// Installs a panic hook that logs through the subscriber installed by
/// `init_logging` before the process exits, rather than letting the panic
/// message go straight to an unstructured stderr write.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let message = match panic_info.payload().downcast_ref::<&str>() {
            Some(&message) => message.to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(message) => message.clone(),
                None => "<no message>".to_string(),
            },
        };

        log::error!("scriptserve crashed: {message}");
        if let Some(location) = panic_info.location() {
            log::error!("in file {} on line {}", location.file(), location.line());
        }

        if std::env::var("RUST_BACKTRACE").map(|v| v == "1").unwrap_or(false) {
            eprintln!("{:?}", backtrace::Backtrace::new());
        } else {
            eprintln!("note: run with `RUST_BACKTRACE=1` to display a backtrace.");
        }
    }));
}

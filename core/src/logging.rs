use std::{io::IsTerminal, sync::OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INIT_GUARD: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    INIT_GUARD.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr);

        if let Err(err) = Registry::default().with(filter).with(fmt_layer).try_init() {
            eprintln!("failed to initialise tracing subscriber: {err}");
        }
    });
}

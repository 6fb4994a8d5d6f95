use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter};

/// Installs the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing<W>(writer: W, ansi: bool)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init();
}

pub fn init_stdout_tracing() {
    init_tracing(std::io::stdout, std::io::stdout().is_terminal());
}

pub fn init_stderr_tracing() {
    init_tracing(std::io::stderr, std::io::stderr().is_terminal());
}

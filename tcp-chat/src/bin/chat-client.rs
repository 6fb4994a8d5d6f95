use anyhow::{Context, Result};

use tcp_chat::{cli::{ClientArgs, parse_or_exit}, client, logging};

fn main() -> Result<()> {
    let args: ClientArgs = parse_or_exit();
    logging::init_stderr_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(client::run(args.config()));

    // A pending stdin read lives on the blocking pool and cannot be cancelled;
    // waiting for it would keep the process alive until the operator hits Enter.
    runtime.shutdown_background();
    result
}

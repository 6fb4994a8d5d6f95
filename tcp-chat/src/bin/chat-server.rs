use anyhow::Result;
use tracing::{info, warn};

use tcp_chat::{cli::{ServerArgs, parse_or_exit}, logging, server::Server};

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerArgs = parse_or_exit();
    logging::init_stdout_tracing();

    let server = Server::bind(args.port, args.config()).await?;
    let addr = server.local_addr()?;
    info!("listening on {}", addr);
    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:#}");
        return Err(err);
    }

    Ok(())
}

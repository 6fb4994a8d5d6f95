use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
};
use tracing::{error, info, warn};

use crate::{
    error::{ConnectionFailure, ErrorPolicy},
    frame::Framing,
    registry::ConnectionRegistry,
    session,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerConfig {
    pub framing: Framing,
    pub error_policy: ErrorPolicy,
}

pub struct Server {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    config: ServerConfig,
}

impl Server {
    /// Listens on `port` on every interface. Port `0` picks an ephemeral port.
    pub async fn bind(port: u16, config: ServerConfig) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to listen on port {port}"))?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            registry: Arc::new(ConnectionRegistry::new()),
            config,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Under [`ErrorPolicy::Fatal`] the first connection failure ends the
    /// loop with that error.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            registry,
            config,
        } = self;
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                failure = failures_rx.recv() => {
                    // The loop holds a sender, so the channel never closes here.
                    if let Some(failure) = failure {
                        handle_failure(failure, config.error_policy)?;
                    }
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &registry, config, &failures_tx);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    registry: &Arc<ConnectionRegistry>,
    config: ServerConfig,
    failures: &session::FailureSink,
) {
    match result {
        Ok((stream, peer)) => {
            info!("new connection from {peer}");
            session::spawn(
                stream,
                peer,
                Arc::clone(registry),
                config.framing,
                failures.clone(),
            );
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn handle_failure(failure: ConnectionFailure, policy: ErrorPolicy) -> Result<()> {
    match policy {
        ErrorPolicy::Fatal => {
            error!(peer = %failure.peer, error = %failure.source, "connection failed");
            Err(failure.into())
        }
        ErrorPolicy::Isolate => {
            warn!(peer = %failure.peer, error = %failure.source, "dropping failed connection");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    fn failure() -> ConnectionFailure {
        let peer = "127.0.0.1:8000".parse().expect("valid addr");
        ConnectionFailure::new(peer, io::Error::from(io::ErrorKind::BrokenPipe))
    }

    #[test]
    fn fatal_policy_surfaces_the_failure() {
        let err = handle_failure(failure(), ErrorPolicy::Fatal).expect_err("fatal");
        let failure = err
            .downcast_ref::<ConnectionFailure>()
            .expect("original failure kept");
        assert_eq!(failure.source.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn isolate_policy_keeps_serving() {
        assert!(handle_failure(failure(), ErrorPolicy::Isolate).is_ok());
    }

    #[tokio::test]
    async fn bind_reports_ports_in_use() {
        let taken = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .expect("bind ephemeral");
        let port = taken.local_addr().expect("addr").port();

        let err = Server::bind(port, ServerConfig::default())
            .await
            .err()
            .expect("second bind must fail");
        assert!(err.to_string().contains(&port.to_string()));
    }
}

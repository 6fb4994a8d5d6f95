use clap::{Args, Parser};

use crate::{
    client::ClientConfig,
    error::ErrorPolicy,
    frame::Framing,
    server::ServerConfig,
};

/// Relay chat lines between every connected client.
#[derive(Parser, Debug)]
#[command(name = "chat-server", author, version)]
pub struct ServerArgs {
    /// TCP port to listen on, on all interfaces. Use 0 for an ephemeral port.
    pub port: u16,

    #[command(flatten)]
    pub wire: WireArgs,

    /// Drop a connection that hits a transport error instead of stopping the server.
    #[arg(long)]
    pub isolate_errors: bool,
}

impl ServerArgs {
    pub fn config(&self) -> ServerConfig {
        ServerConfig {
            framing: self.wire.framing,
            error_policy: if self.isolate_errors {
                ErrorPolicy::Isolate
            } else {
                ErrorPolicy::Fatal
            },
        }
    }
}

/// Join a chat server from the terminal.
#[derive(Parser, Debug)]
#[command(name = "chat-client", author, version)]
pub struct ClientArgs {
    /// Host name or address of the chat server.
    pub host: String,

    /// TCP port of the chat server.
    pub port: u16,

    #[command(flatten)]
    pub wire: WireArgs,
}

impl ClientArgs {
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            framing: self.wire.framing,
            ..ClientConfig::new(self.host.clone(), self.port)
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct WireArgs {
    /// How messages are delimited on the wire. `chunk` is what existing clients speak.
    #[arg(long, value_enum, default_value_t = Framing::Chunk)]
    pub framing: Framing,
}

/// Parses the process arguments, exiting with status 1 on any usage error.
pub fn parse_or_exit<P: Parser>() -> P {
    match P::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines},
    net::{TcpStream, tcp::OwnedWriteHalf},
    select,
};
use tracing::{debug, info};

use crate::{
    frame::{FrameReader, Framing, write_frame},
    session::END_SENTINEL,
};

const CONNECTING_BANNER: &str = "Connecting to server...";
const CONNECTED_BANNER: &str = "Successful connection to server";
const USERNAME_PROMPT: &str = "Write your username: ";
const DISCONNECTED_BANNER: &str = "Disconnected from the server...";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub framing: Framing,
}

impl ClientConfig {
    /// Targets `host:port` with the default framing.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            framing: Framing::default(),
        }
    }
}

/// Connects to the configured server and chats over stdin/stdout until the
/// server closes the connection.
pub async fn run(config: ClientConfig) -> Result<()> {
    let stream = connect(&config).await?;
    let input = BufReader::new(tokio::io::stdin());
    ClientSession::new(input, tokio::io::stdout(), config.framing)
        .run(stream)
        .await?;
    Ok(())
}

async fn connect(config: &ClientConfig) -> Result<TcpStream> {
    let stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
    info!("connected to {}:{}", config.host, config.port);
    Ok(stream)
}

/// One client conversation: operator input on one side, the server on the
/// other.
pub struct ClientSession<I, O> {
    input: Lines<I>,
    output: O,
    framing: Framing,
    username: Option<String>,
    input_open: bool,
}

impl<I, O> ClientSession<I, O>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    pub fn new(input: I, output: O, framing: Framing) -> Self {
        Self {
            input: input.lines(),
            output,
            framing,
            username: None,
            input_open: true,
        }
    }

    /// Drives the conversation until the server closes its side, returning
    /// the output sink. Any transport error ends the session with an error.
    pub async fn run(mut self, stream: TcpStream) -> Result<O> {
        let (reader, mut writer) = stream.into_split();
        let mut inbound = FrameReader::new(reader, self.framing);

        // The blank line after the first banner matches what existing clients print.
        self.print_line(CONNECTING_BANNER).await?;
        self.print_line("").await?;
        self.print_line(CONNECTED_BANNER).await?;
        self.print(USERNAME_PROMPT).await?;

        loop {
            select! {
                frame = inbound.next_frame() => {
                    match frame.context("lost connection to server")? {
                        Some(text) => self.print_line(text.trim_end_matches(['\r', '\n'])).await?,
                        None => {
                            self.print_line(DISCONNECTED_BANNER).await?;
                            return Ok(self.output);
                        }
                    }
                }
                line = self.input.next_line(), if self.input_open => {
                    match line? {
                        Some(line) => self.handle_input(line, &mut writer).await?,
                        None => {
                            debug!("input closed, half-closing connection");
                            self.finish_input(&mut writer).await?;
                        }
                    }
                }
            }
        }
    }

    async fn handle_input(&mut self, line: String, writer: &mut OwnedWriteHalf) -> Result<()> {
        write_frame(writer, &line, self.framing)
            .await
            .context("failed to send to server")?;

        let Some(username) = &self.username else {
            self.username = Some(line);
            return Ok(());
        };

        let echo = format!("[{username}]: {line}");
        self.print_line(&echo).await?;

        if line == END_SENTINEL {
            self.finish_input(writer).await?;
        }
        Ok(())
    }

    async fn finish_input(&mut self, writer: &mut OwnedWriteHalf) -> Result<()> {
        self.input_open = false;
        writer
            .shutdown()
            .await
            .context("failed to half-close connection")
    }

    async fn print_line(&mut self, line: &str) -> io::Result<()> {
        self.output.write_all(line.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await
    }

    async fn print(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }
}

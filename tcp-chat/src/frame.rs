use std::io;

use clap::ValueEnum;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};

const LINE_ENDINGS: &[char] = &['\n', '\r'];
const READ_CHUNK_SIZE: usize = 4096;

/// How a byte stream is cut into protocol messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// Every transport read is one message and outbound text carries no delimiter.
    ///
    /// This is what existing clients speak. Messages that coalesce in a single
    /// TCP segment are seen as one message.
    #[default]
    Chunk,
    /// Newline-delimited messages in both directions.
    Lines,
}

/// Reads successive frames from one side of a connection.
///
/// `next_frame` is cancellation safe in both modes, so it can sit in a
/// `select!` next to other inputs.
pub enum FrameReader<R> {
    Chunks { reader: R, buf: Box<[u8]> },
    Lines(Lines<BufReader<R>>),
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, framing: Framing) -> Self {
        match framing {
            Framing::Chunk => FrameReader::Chunks {
                reader,
                buf: vec![0; READ_CHUNK_SIZE].into_boxed_slice(),
            },
            Framing::Lines => FrameReader::Lines(BufReader::new(reader).lines()),
        }
    }

    /// Returns `Ok(None)` once the peer has closed its write side.
    pub async fn next_frame(&mut self) -> io::Result<Option<String>> {
        match self {
            FrameReader::Chunks { reader, buf } => {
                let read = reader.read(buf).await?;
                if read == 0 {
                    return Ok(None);
                }
                Ok(Some(String::from_utf8_lossy(&buf[..read]).into_owned()))
            }
            FrameReader::Lines(lines) => loop {
                let Some(line) = lines.next_line().await? else {
                    return Ok(None);
                };
                let trimmed = line.trim_end_matches(LINE_ENDINGS);
                if trimmed.is_empty() {
                    continue;
                }
                return Ok(Some(trimmed.to_string()));
            },
        }
    }
}

/// Writes one frame and flushes so the peer sees it promptly.
pub async fn write_frame<W>(writer: &mut W, text: &str, framing: Framing) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::Chunk => writer.write_all(text.as_bytes()).await?,
        Framing::Lines => {
            let mut encoded = Vec::with_capacity(text.len() + 1);
            encoded.extend_from_slice(text.as_bytes());
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
        }
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunk_framing_yields_each_write_until_eof() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut frames = FrameReader::new(reader, Framing::Chunk);

        write_frame(&mut writer, "alice", Framing::Chunk)
            .await
            .expect("write username");
        let first = frames.next_frame().await.expect("read frame");
        assert_eq!(first.as_deref(), Some("alice"));

        drop(writer);
        assert_eq!(frames.next_frame().await.expect("read eof"), None);
    }

    #[tokio::test]
    async fn line_framing_splits_coalesced_writes() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut frames = FrameReader::new(reader, Framing::Lines);

        writer
            .write_all(b"alice\r\n\nhello there\nEND\n")
            .await
            .expect("write batch");
        drop(writer);

        let mut seen = Vec::new();
        while let Some(frame) = frames.next_frame().await.expect("read frame") {
            seen.push(frame);
        }
        assert_eq!(seen, vec!["alice", "hello there", "END"]);
    }

    #[tokio::test]
    async fn line_framing_terminates_outbound_frames() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, "[bob]: hi", Framing::Lines)
            .await
            .expect("write frame");
        assert_eq!(buffer, b"[bob]: hi\n");
    }
}

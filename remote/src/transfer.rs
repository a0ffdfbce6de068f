//! Generic chunked file streaming.
//!
//! [`write_to_stream`] turns a local file into a sequence of data chunks and
//! [`read_from_stream`] turns a sequence of chunks back into a local file. Both
//! are agnostic of the transport: they only see the [`ChunkSink`] and
//! [`ChunkSource`] capabilities, which the RPC layer (or a test) provides.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::protocol::{BLOCK_SIZE, Chunk};

/// Permission bits for files created by a transfer.
pub const FILE_MODE: u32 = 0o700;

/// Failure of a single transfer. Every variant aborts the transfer in progress.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local open/read/write failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// Send/receive failure or a channel torn down by the peer
    #[error("transport failure: {0:#}")]
    Transport(#[source] anyhow::Error),
    /// Peer sent a message that is not valid at this point of the stream
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes: u64,
    pub chunks: u64,
}

impl Summary {
    pub fn record(&mut self, len: usize) {
        self.bytes += len as u64;
        self.chunks += 1;
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes transferred: {}\n\
            data chunks: {}",
            bytesize::ByteSize(self.bytes),
            self.chunks,
        )
    }
}

/// Outbound half of a chunk stream.
pub trait ChunkSink {
    fn send(&mut self, chunk: Chunk) -> impl Future<Output = Result<()>> + Send;
}

/// What the inbound half of a chunk stream produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Chunk(Chunk),
    /// The peer finished sending; distinct from a failure
    EndOfStream,
}

/// Inbound half of a chunk stream.
pub trait ChunkSource {
    fn recv(&mut self) -> impl Future<Output = Result<Inbound>> + Send;
}

/// Creates or truncates `path` for writing.
pub async fn open_for_write(path: &std::path::Path) -> Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .await
        .map_err(|err| Error::io(format!("failed to open {path:?} for writing"), err))
}

/// Appends one data chunk to `file`.
pub async fn write_block(
    file: &mut tokio::fs::File,
    path: &std::path::Path,
    bytes: &[u8],
) -> Result<()> {
    file.write_all(bytes)
        .await
        .map_err(|err| Error::io(format!("failed writing to {path:?}"), err))
}

/// Flushes pending writes so the file is complete once the handle is dropped.
pub async fn finish_file(file: &mut tokio::fs::File, path: &std::path::Path) -> Result<()> {
    file.flush()
        .await
        .map_err(|err| Error::io(format!("failed flushing {path:?}"), err))
}

// Reads until `buf` is full or EOF; returns the number of bytes read.
async fn read_block(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Streams the file at `path` to `sink` as [`BLOCK_SIZE`] data chunks.
///
/// The last chunk may be shorter and an empty file produces no chunks at all.
/// No terminator is sent: signalling the end of the stream is up to the caller.
#[instrument(skip(sink))]
pub async fn write_to_stream<S: ChunkSink>(
    path: &std::path::Path,
    sink: &mut S,
) -> Result<Summary> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|err| Error::io(format!("failed to open {path:?} for reading"), err))?;
    let mut buf = [0u8; BLOCK_SIZE];
    let mut summary = Summary::default();
    loop {
        let count = read_block(&mut file, &mut buf)
            .await
            .map_err(|err| Error::io(format!("failed reading from {path:?}"), err))?;
        if count == 0 {
            break;
        }
        sink.send(Chunk::data(&buf[..count])).await?;
        summary.record(count);
        tracing::trace!("sent chunk {} ({count} bytes)", summary.chunks);
    }
    tracing::debug!("{path:?} exhausted after {} chunks", summary.chunks);
    Ok(summary)
}

/// Writes every data chunk received from `source` to `path` until end of stream.
///
/// The file is created (or truncated) before the first receive, so an empty
/// stream still leaves an empty file behind. Path chunks are ignored.
#[instrument(skip(source))]
pub async fn read_from_stream<S: ChunkSource>(
    path: &std::path::Path,
    source: &mut S,
) -> Result<Summary> {
    let mut file = open_for_write(path).await?;
    let mut summary = Summary::default();
    loop {
        match source.recv().await? {
            Inbound::EndOfStream => break,
            Inbound::Chunk(Chunk::Data(bytes)) => {
                write_block(&mut file, path, &bytes).await?;
                summary.record(bytes.len());
            }
            Inbound::Chunk(Chunk::Path(other)) => {
                tracing::debug!("ignoring path chunk {other:?}");
            }
        }
    }
    finish_file(&mut file, path).await?;
    tracing::debug!("wrote {} bytes to {path:?}", summary.bytes);
    Ok(summary)
}

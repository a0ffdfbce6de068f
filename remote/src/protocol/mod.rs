use serde::{Deserialize, Serialize};

/// Largest number of file bytes carried by a single [`Chunk::Data`].
pub const BLOCK_SIZE: usize = 1024;

/// One framed message of a file transfer stream.
///
/// Within one stream direction at most one `Path` is sent and only as the first
/// message; everything after it is `Data`, in file order, until the stream ends.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Chunk {
    /// Declares the destination (push) path of the transfer
    Path(std::path::PathBuf),
    /// Up to [`BLOCK_SIZE`] bytes of raw file content
    Data(Vec<u8>),
}

impl Chunk {
    pub fn path(path: impl Into<std::path::PathBuf>) -> Self {
        Chunk::Path(path.into())
    }

    /// Wraps one block of file bytes. The block must not exceed [`BLOCK_SIZE`].
    pub fn data(block: &[u8]) -> Self {
        debug_assert!(
            block.len() <= BLOCK_SIZE,
            "data chunk of {} bytes exceeds block size",
            block.len()
        );
        Chunk::Data(block.to_vec())
    }

    /// Payload of a data chunk, `None` for a path chunk.
    #[must_use]
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Chunk::Data(bytes) => Some(bytes),
            Chunk::Path(_) => None,
        }
    }
}

/// Terminal value of a push, naming the path the server wrote.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransferAck {
    pub path: std::path::PathBuf,
}

/// Names the server-side file a pull should read.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TransferRequest {
    pub path: std::path::PathBuf,
}

/// First message on every connection, selects the call.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Request {
    /// Client streams chunks to the server and waits for a [`TransferAck`]
    CopyTo,
    /// Server streams the requested file's chunks back to the client
    CopyFrom(TransferRequest),
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ClientMessage {
    Chunk(Chunk),
    // half-close: no more chunks will follow
    CloseSend,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum ServerMessage {
    Chunk(Chunk),
    Ack(TransferAck),
    // must be the last message of a successful CopyFrom
    Close,
    Failure { error: String },
}

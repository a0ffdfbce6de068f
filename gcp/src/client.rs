use remote::protocol::{Chunk, TransferAck, TransferRequest};
use remote::rpc::{Channel, CopyToStream};
use remote::transfer::{ChunkSink, ChunkSource, Result, Summary};
use tracing::instrument;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushResult {
    pub ack: TransferAck,
    pub summary: Summary,
}

/// Sends the path chunk followed by the contents of `local_path`, then waits for the ack.
///
/// On any failure the stream is dropped without being closed, which the server
/// sees as a torn down call: it never acknowledges a partial push.
#[instrument(skip(stream))]
pub async fn push_file<S: CopyToStream>(
    mut stream: S,
    remote_path: &std::path::Path,
    local_path: &std::path::Path,
) -> Result<PushResult> {
    stream.send(Chunk::path(remote_path)).await?;
    let summary = remote::transfer::write_to_stream(local_path, &mut stream).await?;
    tracing::debug!("sent {} chunks, closing stream", summary.chunks);
    let ack = stream.close_and_recv().await?;
    tracing::info!("server acknowledged {:?}", ack.path);
    Ok(PushResult { ack, summary })
}

/// Materializes the chunks of a pull into `local_path`.
#[instrument(skip(stream))]
pub async fn pull_file<S: ChunkSource>(
    mut stream: S,
    local_path: &std::path::Path,
) -> Result<Summary> {
    let summary = remote::transfer::read_from_stream(local_path, &mut stream).await?;
    tracing::info!("received {} chunks into {local_path:?}", summary.chunks);
    Ok(summary)
}

/// Copies `local_path` to `remote_path` on the server behind `channel`.
pub async fn copy_to_server(
    channel: &Channel,
    remote_path: &std::path::Path,
    local_path: &std::path::Path,
) -> Result<PushResult> {
    let stream = channel.copy_to().await?;
    push_file(stream, remote_path, local_path).await
}

/// Copies `remote_path` on the server behind `channel` to `local_path`.
pub async fn copy_from_server(
    channel: &Channel,
    remote_path: &std::path::Path,
    local_path: &std::path::Path,
) -> Result<Summary> {
    let request = TransferRequest {
        path: remote_path.to_path_buf(),
    };
    let stream = channel.copy_from(request).await?;
    pull_file(stream, local_path).await
}

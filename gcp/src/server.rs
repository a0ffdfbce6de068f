use remote::protocol::{Chunk, TransferAck, TransferRequest};
use remote::rpc::{CopyService, ServerCopyFrom, ServerCopyTo};
use remote::transfer::{ChunkSink, ChunkSource, Error, Inbound, Result, Summary};
use tracing::instrument;

/// Writes a pushed file to the path named by its path chunk.
///
/// The destination is opened on the first data chunk, so a push that carries
/// a path but no data is acknowledged without creating any file. A later path
/// chunk replaces the path that is acknowledged; data keeps going to the file
/// that is already open.
#[instrument(skip(stream))]
pub async fn receive_file<S: ChunkSource>(stream: &mut S) -> Result<TransferAck> {
    let mut path: Option<std::path::PathBuf> = None;
    let mut file: Option<(std::path::PathBuf, tokio::fs::File)> = None;
    let mut summary = Summary::default();
    loop {
        match stream.recv().await? {
            Inbound::EndOfStream => break,
            Inbound::Chunk(Chunk::Path(new_path)) => {
                if let Some(previous) = &path {
                    tracing::warn!("path chunk {new_path:?} replaces {previous:?}");
                }
                tracing::debug!("destination: {new_path:?}");
                path = Some(new_path);
            }
            Inbound::Chunk(Chunk::Data(bytes)) => {
                let Some(dst) = path.as_deref() else {
                    return Err(Error::protocol("data chunk received before path chunk"));
                };
                if file.is_none() {
                    tracing::debug!("opening {dst:?} on first data chunk");
                    let handle = remote::transfer::open_for_write(dst).await?;
                    file = Some((dst.to_path_buf(), handle));
                }
                if let Some((opened, handle)) = file.as_mut() {
                    remote::transfer::write_block(handle, opened, &bytes).await?;
                }
                summary.record(bytes.len());
            }
        }
    }
    match file.as_mut() {
        Some((opened, handle)) => {
            remote::transfer::finish_file(handle, opened).await?;
            tracing::info!("received {} bytes into {opened:?}", summary.bytes);
        }
        None => tracing::info!("no data received, nothing was created"),
    }
    // an empty path when the client never named one
    let path = path.unwrap_or_default();
    Ok(TransferAck { path })
}

/// Streams the requested server-side file back to the client.
#[instrument(skip(stream))]
pub async fn send_file<S: ChunkSink>(request: &TransferRequest, stream: &mut S) -> Result<Summary> {
    let summary = remote::transfer::write_to_stream(&request.path, stream).await?;
    tracing::info!("sent {} bytes from {:?}", summary.bytes, request.path);
    Ok(summary)
}

/// The `gcpd` service: every call is an independent transfer.
#[derive(Clone, Copy, Debug, Default)]
pub struct GcpService;

impl CopyService for GcpService {
    async fn copy_to(&self, stream: &mut ServerCopyTo) -> Result<TransferAck> {
        receive_file(stream).await
    }

    async fn copy_from(
        &self,
        request: TransferRequest,
        stream: &mut ServerCopyFrom,
    ) -> Result<Summary> {
        send_file(&request, stream).await
    }
}

/// Serves CopyTo / CopyFrom calls on `listener` until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    remote::rpc::serve(listener, std::sync::Arc::new(GcpService)).await
}

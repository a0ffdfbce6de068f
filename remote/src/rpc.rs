//! CopyTo / CopyFrom calls over TCP.
//!
//! Every call uses its own connection. The client opens it with a
//! [`Request`] frame; the rest of the exchange depends on the call:
//!
//! ```text
//! CopyTo:   client -> Chunk* CloseSend      server -> Ack | Failure
//! CopyFrom: client -> (nothing)             server -> Chunk* (Close | Failure)
//! ```
//!
//! A connection that ends without the closing frame was torn down and is
//! reported as a transport error rather than as end of stream.

use anyhow::{Context, anyhow};
use tracing::instrument;

use crate::protocol::{ClientMessage, Request, ServerMessage, TransferAck, TransferRequest};
use crate::streams::{Connection, RecvStream, SendStream};
use crate::transfer::{ChunkSink, ChunkSource, Error, Inbound, Result, Summary};

pub const DEFAULT_PORT: u16 = 10001;

/// How long the server keeps reading a failed push before closing the connection.
pub const DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Client side of the connection to one server.
#[derive(Clone, Debug)]
pub struct Channel {
    addr: String,
    conn_timeout: std::time::Duration,
}

impl Channel {
    /// `host` may be a name, an IPv4 address or a bracketed IPv6 literal.
    pub fn new(host: &str, port: u16, conn_timeout: std::time::Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            conn_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn open(&self, request: &Request) -> anyhow::Result<Connection> {
        let stream = tokio::time::timeout(
            self.conn_timeout,
            tokio::net::TcpStream::connect(&self.addr),
        )
        .await
        .with_context(|| format!("timed out connecting to {}", self.addr))?
        .with_context(|| format!("failed to connect to {}", self.addr))?;
        stream.set_nodelay(true)?;
        tracing::debug!("connected to {}", self.addr);
        let mut connection = Connection::new(stream);
        connection
            .send_mut()
            .send_control_message(request)
            .await
            .context("failed to send request")?;
        Ok(connection)
    }

    /// Starts a push; chunks sent on the returned call land on the server.
    #[instrument]
    pub async fn copy_to(&self) -> Result<CopyToCall> {
        let (send, recv) = self
            .open(&Request::CopyTo)
            .await
            .map_err(Error::Transport)?
            .into_split();
        Ok(CopyToCall { send, recv })
    }

    /// Starts a pull of the server-side file named by `request`.
    #[instrument]
    pub async fn copy_from(&self, request: TransferRequest) -> Result<CopyFromCall> {
        let (send, recv) = self
            .open(&Request::CopyFrom(request))
            .await
            .map_err(Error::Transport)?
            .into_split();
        Ok(CopyFromCall { _send: send, recv })
    }
}

/// Outbound chunk stream of a push, completed by the server's acknowledgement.
pub trait CopyToStream: ChunkSink {
    /// Signals that no more chunks follow and waits for the acknowledgement.
    fn close_and_recv(self) -> impl Future<Output = Result<TransferAck>> + Send;
}

#[derive(Debug)]
pub struct CopyToCall {
    send: SendStream,
    recv: RecvStream,
}

impl ChunkSink for CopyToCall {
    async fn send(&mut self, chunk: crate::protocol::Chunk) -> Result<()> {
        self.send
            .send_batch_message(&ClientMessage::Chunk(chunk))
            .await
            .map_err(Error::Transport)
    }
}

impl CopyToStream for CopyToCall {
    async fn close_and_recv(mut self) -> Result<TransferAck> {
        self.send
            .send_control_message(&ClientMessage::CloseSend)
            .await
            .map_err(Error::Transport)?;
        self.send.close().await.map_err(Error::Transport)?;
        match self
            .recv
            .recv_object::<ServerMessage>()
            .await
            .map_err(Error::Transport)?
        {
            Some(ServerMessage::Ack(ack)) => Ok(ack),
            Some(ServerMessage::Failure { error }) => {
                Err(Error::Transport(anyhow!("server failed: {error}")))
            }
            Some(other) => Err(Error::protocol(format!(
                "expected acknowledgement, got {other:?}"
            ))),
            None => Err(Error::Transport(anyhow!(
                "server closed the stream without an acknowledgement"
            ))),
        }
    }
}

/// Inbound chunk stream of a pull.
#[derive(Debug)]
pub struct CopyFromCall {
    // kept open for the lifetime of the call
    _send: SendStream,
    recv: RecvStream,
}

impl ChunkSource for CopyFromCall {
    async fn recv(&mut self) -> Result<Inbound> {
        match self
            .recv
            .recv_object::<ServerMessage>()
            .await
            .map_err(Error::Transport)?
        {
            Some(ServerMessage::Chunk(chunk)) => Ok(Inbound::Chunk(chunk)),
            Some(ServerMessage::Close) => Ok(Inbound::EndOfStream),
            Some(ServerMessage::Failure { error }) => {
                Err(Error::Transport(anyhow!("server failed: {error}")))
            }
            Some(ServerMessage::Ack(ack)) => Err(Error::protocol(format!(
                "unexpected acknowledgement for {:?} on a CopyFrom stream",
                ack.path
            ))),
            None => Err(Error::Transport(anyhow!(
                "server closed the stream before it was complete"
            ))),
        }
    }
}

/// Server-side handlers of the two calls.
///
/// A handler error is sent back to the client as the call's failure.
pub trait CopyService: Send + Sync + 'static {
    fn copy_to(
        &self,
        stream: &mut ServerCopyTo,
    ) -> impl Future<Output = Result<TransferAck>> + Send;

    fn copy_from(
        &self,
        request: TransferRequest,
        stream: &mut ServerCopyFrom,
    ) -> impl Future<Output = Result<Summary>> + Send;
}

/// Inbound chunk stream of a push, as seen by the server.
#[derive(Debug)]
pub struct ServerCopyTo {
    recv: RecvStream,
}

impl ChunkSource for ServerCopyTo {
    async fn recv(&mut self) -> Result<Inbound> {
        match self
            .recv
            .recv_object::<ClientMessage>()
            .await
            .map_err(Error::Transport)?
        {
            Some(ClientMessage::Chunk(chunk)) => Ok(Inbound::Chunk(chunk)),
            Some(ClientMessage::CloseSend) => Ok(Inbound::EndOfStream),
            None => Err(Error::Transport(anyhow!(
                "client disconnected before closing the stream"
            ))),
        }
    }
}

impl ServerCopyTo {
    // Consumes whatever the client still sends so closing the socket does not
    // reset the connection before the reply is read. Gives up after DRAIN_TIMEOUT.
    async fn drain(&mut self) {
        let mut discarded = 0usize;
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Ok(Some(ClientMessage::Chunk(_))) =
                self.recv.recv_object::<ClientMessage>().await
            {
                discarded += 1;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!("client still sending after {DRAIN_TIMEOUT:?}, dropping connection");
        }
        tracing::debug!("discarded {discarded} chunks after a failed CopyTo");
    }
}

/// Outbound chunk stream of a pull, as seen by the server.
#[derive(Debug)]
pub struct ServerCopyFrom {
    send: SendStream,
}

impl ChunkSink for ServerCopyFrom {
    async fn send(&mut self, chunk: crate::protocol::Chunk) -> Result<()> {
        self.send
            .send_batch_message(&ServerMessage::Chunk(chunk))
            .await
            .map_err(Error::Transport)
    }
}

fn failure(call: &str, error: &Error) -> ServerMessage {
    tracing::error!("{call} failed: {error}");
    ServerMessage::Failure {
        error: error.to_string(),
    }
}

/// Serves a single connection: reads the request and runs the matching handler.
#[instrument(skip(service, stream))]
pub async fn handle_connection<S: CopyService>(
    service: &S,
    stream: tokio::net::TcpStream,
    peer: std::net::SocketAddr,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (mut send, mut recv) = Connection::new(stream).into_split();
    let request = recv
        .recv_object::<Request>()
        .await
        .context("failed to receive request")?
        .context("connection closed before a request was received")?;
    tracing::info!("received request: {request:?}");
    match request {
        Request::CopyTo => {
            let mut call = ServerCopyTo { recv };
            let (reply, failed) = match service.copy_to(&mut call).await {
                Ok(ack) => (ServerMessage::Ack(ack), false),
                Err(error) => (failure("CopyTo", &error), true),
            };
            send.send_control_message(&reply).await?;
            send.close().await?;
            if failed {
                call.drain().await;
            }
        }
        Request::CopyFrom(request) => {
            let mut call = ServerCopyFrom { send };
            let reply = match service.copy_from(request, &mut call).await {
                Ok(summary) => {
                    tracing::info!("CopyFrom done, {} chunks sent", summary.chunks);
                    ServerMessage::Close
                }
                Err(error) => failure("CopyFrom", &error),
            };
            call.send.send_control_message(&reply).await?;
            call.send.close().await?;
        }
    }
    Ok(())
}

pub async fn bind(ip: std::net::IpAddr, port: u16) -> anyhow::Result<tokio::net::TcpListener> {
    let addr = std::net::SocketAddr::new(ip, port);
    tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("unable to serve on {addr}"))
}

/// Accepts connections forever, handling each one on its own task.
pub async fn serve<S: CopyService>(
    listener: tokio::net::TcpListener,
    service: std::sync::Arc<S>,
) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::warn!("failed to accept connection: {error}");
                continue;
            }
        };
        tracing::debug!("accepted connection from {peer}");
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_connection(service.as_ref(), stream, peer).await {
                tracing::error!("connection from {peer} failed: {error:#}");
            }
        });
    }
}

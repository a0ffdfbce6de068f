use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Framed send stream for length-delimited bincode messages.
///
/// Generic over the underlying writer type - works with TCP or any AsyncWrite.
#[derive(Debug)]
pub struct SendStream<W = OwnedWriteHalf> {
    framed: tokio_util::codec::FramedWrite<W, tokio_util::codec::LengthDelimitedCodec>,
}

impl<W: AsyncWrite + Unpin> SendStream<W> {
    pub fn new(stream: W) -> Self {
        let framed = tokio_util::codec::FramedWrite::new(
            stream,
            tokio_util::codec::LengthDelimitedCodec::new(),
        );
        Self { framed }
    }

    /// Queues one message; it reaches the peer at the latest on the next flush.
    pub async fn send_batch_message<T: serde::Serialize>(&mut self, obj: &T) -> anyhow::Result<()> {
        let bytes = bincode::serialize(obj)?;
        self.framed.feed(bytes::Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Sends one message and flushes it to the peer.
    pub async fn send_control_message<T: serde::Serialize>(
        &mut self,
        obj: &T,
    ) -> anyhow::Result<()> {
        self.send_batch_message(obj).await?;
        SinkExt::<bytes::Bytes>::flush(&mut self.framed).await?;
        Ok(())
    }

    /// Flushes pending frames and shuts down the write side.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        SinkExt::<bytes::Bytes>::close(&mut self.framed).await?;
        Ok(())
    }
}

/// Framed receive stream for length-delimited bincode messages.
///
/// Generic over the underlying reader type - works with TCP or any AsyncRead.
#[derive(Debug)]
pub struct RecvStream<R = OwnedReadHalf> {
    framed: tokio_util::codec::FramedRead<R, tokio_util::codec::LengthDelimitedCodec>,
}

impl<R: AsyncRead + Unpin> RecvStream<R> {
    pub fn new(stream: R) -> Self {
        let framed = tokio_util::codec::FramedRead::new(
            stream,
            tokio_util::codec::LengthDelimitedCodec::new(),
        );
        Self { framed }
    }

    /// Returns `None` once the peer closed its write side.
    pub async fn recv_object<T: serde::de::DeserializeOwned>(
        &mut self,
    ) -> anyhow::Result<Option<T>> {
        if let Some(frame) = futures::StreamExt::next(&mut self.framed).await {
            let bytes = frame?;
            let obj = bincode::deserialize(&bytes)?;
            Ok(Some(obj))
        } else {
            Ok(None)
        }
    }
}

/// Bidirectional framed connection over a single TCP stream
#[derive(Debug)]
pub struct Connection {
    send: SendStream,
    recv: RecvStream,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            send: SendStream::new(write_half),
            recv: RecvStream::new(read_half),
        }
    }

    /// Split into send and recv halves for independent use
    pub fn into_split(self) -> (SendStream, RecvStream) {
        (self.send, self.recv)
    }

    pub fn send_mut(&mut self) -> &mut SendStream {
        &mut self.send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_arrive_in_order_then_end() -> anyhow::Result<()> {
        let (client, server) = tokio::io::duplex(64);
        let mut send = SendStream::new(client);
        let mut recv = RecvStream::new(server);
        let writer = tokio::spawn(async move {
            for i in 0..10u32 {
                send.send_batch_message(&i).await?;
            }
            send.close().await
        });
        let mut received = Vec::new();
        while let Some(value) = recv.recv_object::<u32>().await? {
            received.push(value);
        }
        writer.await??;
        assert_eq!(received, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn garbage_frame_is_an_error() -> anyhow::Result<()> {
        let (client, server) = tokio::io::duplex(64);
        let mut send = SendStream::new(client);
        let mut recv = RecvStream::new(server);
        // a single byte cannot decode as a u64
        send.send_control_message(&1u8).await?;
        assert!(recv.recv_object::<u64>().await.is_err());
        Ok(())
    }
}

//! CopyTo / CopyFrom framing over a real TCP connection.

use remote::protocol::{Chunk, TransferAck, TransferRequest};
use remote::rpc::{Channel, CopyService, CopyToStream, ServerCopyFrom, ServerCopyTo};
use remote::transfer::{ChunkSink, ChunkSource, Error, Inbound, Result, Summary};

/// Test service: records what a push delivered and answers pulls with a fixed script.
struct Recorder {
    outcomes: tokio::sync::mpsc::UnboundedSender<std::result::Result<Vec<Chunk>, String>>,
    pull_chunks: usize,
    fail_pull_after: Option<usize>,
}

impl CopyService for Recorder {
    async fn copy_to(&self, stream: &mut ServerCopyTo) -> Result<TransferAck> {
        let mut received = Vec::new();
        let outcome = loop {
            match stream.recv().await {
                Ok(Inbound::Chunk(chunk)) => received.push(chunk),
                Ok(Inbound::EndOfStream) => break Ok(()),
                Err(error) => break Err(error),
            }
        };
        match outcome {
            Ok(()) => {
                let path = match received.first() {
                    Some(Chunk::Path(path)) => path.clone(),
                    _ => return Err(Error::protocol("no path chunk")),
                };
                let _ = self.outcomes.send(Ok(received));
                Ok(TransferAck { path })
            }
            Err(error) => {
                let _ = self.outcomes.send(Err(error.to_string()));
                Err(error)
            }
        }
    }

    async fn copy_from(
        &self,
        request: TransferRequest,
        stream: &mut ServerCopyFrom,
    ) -> Result<Summary> {
        let mut summary = Summary::default();
        for i in 0..self.pull_chunks {
            if self.fail_pull_after == Some(i) {
                return Err(Error::io(
                    format!("failed reading from {:?}", request.path),
                    std::io::Error::other("disk went away"),
                ));
            }
            let block = vec![i as u8; 16];
            stream.send(Chunk::data(&block)).await?;
            summary.record(block.len());
        }
        Ok(summary)
    }
}

type Outcomes = tokio::sync::mpsc::UnboundedReceiver<std::result::Result<Vec<Chunk>, String>>;

async fn start(pull_chunks: usize, fail_pull_after: Option<usize>) -> anyhow::Result<(Channel, Outcomes)> {
    let listener = remote::rpc::bind(std::net::Ipv4Addr::LOCALHOST.into(), 0).await?;
    let port = listener.local_addr()?.port();
    let (outcomes, receiver) = tokio::sync::mpsc::unbounded_channel();
    let service = std::sync::Arc::new(Recorder {
        outcomes,
        pull_chunks,
        fail_pull_after,
    });
    tokio::spawn(remote::rpc::serve(listener, service));
    let channel = Channel::new("127.0.0.1", port, std::time::Duration::from_secs(5));
    Ok((channel, receiver))
}

#[tokio::test]
async fn push_delivers_chunks_in_order_and_returns_ack() -> anyhow::Result<()> {
    let (channel, mut outcomes) = start(0, None).await?;
    let mut call = channel.copy_to().await?;
    let sent = vec![
        Chunk::path("/tmp/x"),
        Chunk::data(b"first"),
        Chunk::data(b"second"),
        Chunk::data(b"third"),
    ];
    for chunk in &sent {
        call.send(chunk.clone()).await?;
    }
    let ack = call.close_and_recv().await?;
    assert_eq!(ack.path, std::path::PathBuf::from("/tmp/x"));
    let received = outcomes.recv().await.unwrap().unwrap();
    assert_eq!(received, sent);
    Ok(())
}

#[tokio::test]
async fn handler_error_reaches_push_client() -> anyhow::Result<()> {
    let (channel, _outcomes) = start(0, None).await?;
    let mut call = channel.copy_to().await?;
    call.send(Chunk::data(b"no path")).await?;
    let err = call.close_and_recv().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err}");
    assert!(err.to_string().contains("no path chunk"), "{err}");
    Ok(())
}

#[tokio::test]
async fn dropped_push_is_seen_as_transport_failure() -> anyhow::Result<()> {
    let (channel, mut outcomes) = start(0, None).await?;
    let mut call = channel.copy_to().await?;
    call.send(Chunk::path("/tmp/x")).await?;
    call.send(Chunk::data(b"partial")).await?;
    drop(call);
    let outcome = outcomes.recv().await.unwrap();
    let error = outcome.unwrap_err();
    assert!(error.contains("transport failure"), "{error}");
    Ok(())
}

#[tokio::test]
async fn pull_yields_chunks_then_end_of_stream() -> anyhow::Result<()> {
    let (channel, _outcomes) = start(3, None).await?;
    let mut call = channel
        .copy_from(TransferRequest {
            path: "/tmp/y".into(),
        })
        .await?;
    for i in 0..3u8 {
        match call.recv().await? {
            Inbound::Chunk(chunk) => assert_eq!(chunk.as_data(), Some(&[i; 16][..])),
            other => panic!("expected chunk {i}, got {other:?}"),
        }
    }
    assert_eq!(call.recv().await?, Inbound::EndOfStream);
    Ok(())
}

#[tokio::test]
async fn pull_failure_is_not_end_of_stream() -> anyhow::Result<()> {
    let (channel, _outcomes) = start(5, Some(2)).await?;
    let mut call = channel
        .copy_from(TransferRequest {
            path: "/tmp/y".into(),
        })
        .await?;
    assert!(matches!(call.recv().await?, Inbound::Chunk(_)));
    assert!(matches!(call.recv().await?, Inbound::Chunk(_)));
    let err = call.recv().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err}");
    assert!(err.to_string().contains("disk went away"), "{err}");
    Ok(())
}

#[tokio::test]
async fn connect_to_closed_port_fails() -> anyhow::Result<()> {
    // bind and drop to find a port nobody listens on
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };
    let channel = Channel::new("127.0.0.1", port, std::time::Duration::from_secs(5));
    let err = channel.copy_to().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{err}");
    Ok(())
}

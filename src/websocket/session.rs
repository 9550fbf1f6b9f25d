//! Reader and writer loops of one connected session.
//!
//! Both loops are generic over the transport halves so they can run on an
//! axum WebSocket or on in-memory channels.

use std::fmt::Display;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::hub::{Frame, Hub, HubError, SessionId, SessionRegistration};
use crate::metrics::SessionMetrics;

use super::keepalive::KeepaliveConfig;
use super::message::ControlFrame;

/// Upper bound on frames coalesced into a single flush
const MAX_BATCH_FRAMES: usize = 64;

/// Why the reader loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    ClientClosed,
    StreamEnded,
    ReadError,
    LivenessTimeout,
}

/// Why the writer loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    QueueClosed,
    WriteFailed,
    PingFailed,
}

/// Which loop ended the session first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Reader(ReaderExit),
    Writer(WriterExit),
}

impl ReaderExit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::StreamEnded => "stream_ended",
            Self::ReadError => "read_error",
            Self::LivenessTimeout => "liveness_timeout",
        }
    }
}

impl WriterExit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueueClosed => "queue_closed",
            Self::WriteFailed => "write_failed",
            Self::PingFailed => "ping_failed",
        }
    }
}

impl SessionExit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader(exit) => exit.as_str(),
            Self::Writer(exit) => exit.as_str(),
        }
    }
}

/// A registered session waiting for its transport
pub struct Session {
    id: SessionId,
    receiver: mpsc::Receiver<Frame>,
    hub: Hub,
    keepalive: KeepaliveConfig,
}

impl Session {
    /// Register with the hub. The session receives every event published
    /// after this returns, buffered until [`Session::run`] starts writing.
    pub async fn open(hub: &Hub, keepalive: KeepaliveConfig) -> Result<Self, HubError> {
        let SessionRegistration { id, receiver } = hub.register().await?;
        Ok(Self {
            id,
            receiver,
            hub: hub.clone(),
            keepalive,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Drive the session until either side fails or closes, then deregister.
    pub async fn run<W, R, E>(self, sink: W, stream: R) -> SessionExit
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let Self {
            id,
            receiver,
            hub,
            keepalive,
        } = self;
        let started = Instant::now();
        SessionMetrics::record_opened();

        let mut writer = tokio::spawn(write_loop(sink, receiver, id.clone(), keepalive));
        let mut reader = tokio::spawn(read_loop(
            stream,
            hub.clone(),
            id.clone(),
            keepalive.pong_timeout,
        ));

        let exit = tokio::select! {
            biased;

            result = &mut reader => {
                let exit = result.unwrap_or_else(|e| {
                    tracing::error!(session_id = %id, error = %e, "Reader task failed");
                    ReaderExit::ReadError
                });
                // Deregistration closes the queue; give the writer a chance
                // to flush what is left and send its close frame.
                hub.deregister(&id);
                if timeout(keepalive.write_timeout, &mut writer).await.is_err() {
                    writer.abort();
                }
                SessionExit::Reader(exit)
            }
            result = &mut writer => {
                reader.abort();
                let exit = result.unwrap_or_else(|e| {
                    tracing::error!(session_id = %id, error = %e, "Writer task failed");
                    WriterExit::WriteFailed
                });
                SessionExit::Writer(exit)
            }
        };

        hub.deregister(&id);

        let duration = started.elapsed().as_secs_f64();
        SessionMetrics::record_closed(exit.as_str(), duration);
        tracing::info!(
            session_id = %id,
            reason = exit.as_str(),
            duration_secs = duration,
            "Session closed"
        );

        exit
    }
}

/// Consume inbound frames until the client goes away.
///
/// Every read is bounded by the liveness deadline; any frame, pongs included,
/// restarts it. On exit the session always asks the hub to deregister it.
pub async fn read_loop<R, E>(
    mut stream: R,
    hub: Hub,
    id: SessionId,
    pong_timeout: std::time::Duration,
) -> ReaderExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = loop {
        let next = match timeout(pong_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::warn!(
                    session_id = %id,
                    timeout_secs = pong_timeout.as_secs_f64(),
                    "No traffic within liveness deadline"
                );
                break ReaderExit::LivenessTimeout;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                apply_control(&hub, &id, ControlFrame::parse(text.as_str()));
            }
            Some(Ok(Message::Close(_))) => {
                tracing::debug!(session_id = %id, "Received close frame");
                break ReaderExit::ClientClosed;
            }
            // Pings are answered by the transport; pongs and binary frames
            // only count as liveness.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(session_id = %id, error = %e, "WebSocket receive error");
                break ReaderExit::ReadError;
            }
            None => break ReaderExit::StreamEnded,
        }
    };

    hub.deregister(&id);
    exit
}

fn apply_control(hub: &Hub, id: &SessionId, frame: ControlFrame) {
    match frame {
        ControlFrame::Subscribe(topic) => {
            SessionMetrics::record_control("subscribe");
            hub.subscribe(id, topic);
        }
        ControlFrame::Unsubscribe(topic) => {
            SessionMetrics::record_control("unsubscribe");
            hub.unsubscribe(id, topic);
        }
        ControlFrame::Unknown => {
            SessionMetrics::record_control("unknown");
            tracing::trace!(session_id = %id, "Ignoring unrecognized client frame");
        }
    }
}

/// Drain the outbound queue to the wire and send periodic pings.
///
/// Frames that piled up while a write was in flight are fed behind the
/// first one and flushed together, in queue order.
pub async fn write_loop<W>(
    mut sink: W,
    mut queue: mpsc::Receiver<Frame>,
    id: SessionId,
    keepalive: KeepaliveConfig,
) -> WriterExit
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping_timer = keepalive.ping_timer();

    loop {
        tokio::select! {
            frame = queue.recv() => match frame {
                Some(frame) => {
                    match timeout(keepalive.write_timeout, write_batch(&mut sink, &mut queue, frame)).await {
                        Ok(Ok(written)) => {
                            tracing::trace!(session_id = %id, frames = written, "Flushed frames");
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(session_id = %id, error = %e, "WebSocket write failed");
                            return WriterExit::WriteFailed;
                        }
                        Err(_) => {
                            tracing::warn!(session_id = %id, "WebSocket write timed out");
                            return WriterExit::WriteFailed;
                        }
                    }
                }
                None => {
                    let _ = timeout(keepalive.write_timeout, sink.send(Message::Close(None))).await;
                    return WriterExit::QueueClosed;
                }
            },
            _ = ping_timer.tick() => {
                match timeout(keepalive.write_timeout, sink.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => SessionMetrics::record_ping(),
                    Ok(Err(e)) => {
                        tracing::debug!(session_id = %id, error = %e, "Ping failed");
                        return WriterExit::PingFailed;
                    }
                    Err(_) => {
                        tracing::warn!(session_id = %id, "Ping timed out");
                        return WriterExit::PingFailed;
                    }
                }
            }
        }
    }
}

async fn write_batch<W>(
    sink: &mut W,
    queue: &mut mpsc::Receiver<Frame>,
    first: Frame,
) -> Result<usize, W::Error>
where
    W: Sink<Message> + Unpin,
{
    sink.feed(Message::Text(first)).await?;
    let mut written = 1;
    while written < MAX_BATCH_FRAMES {
        let Ok(frame) = queue.try_recv() else {
            break;
        };
        sink.feed(Message::Text(frame)).await?;
        written += 1;
    }
    sink.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use std::time::Duration;

    fn keepalive() -> KeepaliveConfig {
        KeepaliveConfig {
            ping_interval: Duration::from_millis(40),
            pong_timeout: Duration::from_millis(200),
            write_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_writer_preserves_order_and_closes() {
        let (tx, rx) = mpsc::channel::<Frame>(8);
        let (sink, mut wire) = fmpsc::unbounded::<Message>();

        for n in 0..5 {
            tx.send(Frame::from(format!("m{n}"))).await.unwrap();
        }
        drop(tx);

        let exit = write_loop(sink, rx, SessionId::from("s"), KeepaliveConfig::default()).await;
        assert_eq!(exit, WriterExit::QueueClosed);

        let mut texts = Vec::new();
        while let Some(msg) = wire.next().await {
            match msg {
                Message::Text(t) => texts.push(t.as_str().to_string()),
                Message::Close(_) => break,
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_writer_sends_pings() {
        let (_tx, rx) = mpsc::channel::<Frame>(8);
        let (sink, mut wire) = fmpsc::unbounded::<Message>();

        let task = tokio::spawn(write_loop(sink, rx, SessionId::from("s"), keepalive()));

        let msg = timeout(Duration::from_secs(1), wire.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(msg, Message::Ping(_)));
        task.abort();
    }

    #[tokio::test]
    async fn test_writer_stops_when_ping_fails() {
        let (_tx, rx) = mpsc::channel::<Frame>(8);
        let (sink, wire) = fmpsc::unbounded::<Message>();
        drop(wire);

        let exit = write_loop(sink, rx, SessionId::from("s"), keepalive()).await;
        assert_eq!(exit, WriterExit::PingFailed);
    }

    #[tokio::test]
    async fn test_reader_times_out_without_traffic() {
        let (hub, _router) = Hub::spawn(&Default::default());
        let (_client, stream) = fmpsc::unbounded::<Result<Message, String>>();

        let exit = read_loop(stream, hub, SessionId::from("s"), Duration::from_millis(50)).await;
        assert_eq!(exit, ReaderExit::LivenessTimeout);
    }

    #[tokio::test]
    async fn test_reader_exits_on_close_and_error() {
        let (hub, _router) = Hub::spawn(&Default::default());

        let (client, stream) = fmpsc::unbounded::<Result<Message, String>>();
        client
            .unbounded_send(Ok(Message::Text(r#"{"type":"subscribe","id":"a"}"#.into())))
            .unwrap();
        client.unbounded_send(Ok(Message::Close(None))).unwrap();
        let exit = read_loop(stream, hub.clone(), SessionId::from("s"), Duration::from_secs(1)).await;
        assert_eq!(exit, ReaderExit::ClientClosed);

        let (client, stream) = fmpsc::unbounded::<Result<Message, String>>();
        client.unbounded_send(Err("reset".to_string())).unwrap();
        let exit = read_loop(stream, hub.clone(), SessionId::from("s"), Duration::from_secs(1)).await;
        assert_eq!(exit, ReaderExit::ReadError);

        let (client, stream) = fmpsc::unbounded::<Result<Message, String>>();
        drop(client);
        let exit = read_loop(stream, hub, SessionId::from("s"), Duration::from_secs(1)).await;
        assert_eq!(exit, ReaderExit::StreamEnded);
    }
}

//! Transport-agnostic per-connection loop.
//!
//! Both the WebSocket and the line-delimited TCP transports adapt their
//! socket into a stream of [`Inbound`] items and a sink of [`Frame`]s and
//! hand them to [`serve_connection`]. The loop owns the connection's
//! registration in the live set and always removes it on exit.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::ConnectionId;
use super::messages::Frame;
use crate::app_state::AppState;
use crate::error::HubError;

/// Per-connection I/O bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Connection is dropped after this long without any inbound traffic.
    pub read_idle_timeout: Duration,
    /// Upper bound for queueing or writing one outbound frame.
    pub write_timeout: Duration,
    /// Largest accepted inbound frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            read_idle_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(5),
            max_frame_bytes: 64 * 1024,
        }
    }
}

/// One item read from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete text frame holding one message.
    Frame(String),
    /// A frame the transport could not turn into text.
    Malformed(String),
    /// Keepalive or empty frame.
    Idle,
    /// The peer closed the connection.
    Closed,
}

/// Runs one observer connection until the peer leaves, the transport
/// fails, the connection goes idle, or the hub shuts down.
pub async fn serve_connection<R, W>(state: AppState, peer: String, mut inbound: R, sink: W)
where
    R: Stream<Item = Result<Inbound, HubError>> + Unpin + Send,
    W: Sink<Frame, Error = HubError> + Unpin + Send + 'static,
{
    let limits = state.limits;
    let (handle, outbound_rx) = state.connections.open().await;
    let connection_id = handle.id();
    let session = state.shutdown.child_token();
    tracing::info!(%connection_id, %peer, "observer connected");

    let mut writer = tokio::spawn(write_loop(
        outbound_rx,
        sink,
        limits.write_timeout,
        session.clone(),
        connection_id,
    ));

    loop {
        let next = tokio::select! {
            () = session.cancelled() => break,
            next = tokio::time::timeout(limits.read_idle_timeout, inbound.next()) => next,
        };

        match next {
            Err(_) => {
                tracing::info!(%connection_id, "connection idle; closing");
                break;
            }
            Ok(None | Some(Ok(Inbound::Closed))) => break,
            Ok(Some(Err(err))) => {
                tracing::warn!(%connection_id, error = %err, "connection read failed");
                break;
            }
            Ok(Some(Ok(Inbound::Frame(text)))) => {
                state.router.handle_frame(&handle, &text).await;
            }
            Ok(Some(Ok(Inbound::Malformed(reason)))) => {
                tracing::warn!(%connection_id, %reason, "dropping undecodable frame");
            }
            Ok(Some(Ok(Inbound::Idle))) => {}
        }
    }

    state.connections.close(connection_id).await;
    session.cancel();
    if tokio::time::timeout(limits.write_timeout, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    handle.mark_closed();
    tracing::info!(%connection_id, %peer, "observer disconnected");
}

async fn write_loop<W>(
    mut outbound: mpsc::Receiver<Frame>,
    mut sink: W,
    write_timeout: Duration,
    session: CancellationToken,
    connection_id: ConnectionId,
) where
    W: Sink<Frame, Error = HubError> + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = session.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match tokio::time::timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(%connection_id, error = %err, "connection write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(%connection_id, "connection write timed out");
                break;
            }
        }
    }

    session.cancel();
    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::domain::SystemClock;
    use crate::service::LoggingTransport;
    use futures_util::stream;
    use std::pin::Pin;
    use std::sync::Arc;

    type BoxSink = Pin<Box<dyn Sink<Frame, Error = HubError> + Send>>;

    fn state() -> AppState {
        let config = HubConfig {
            write_timeout: Duration::from_millis(200),
            ..HubConfig::default()
        };
        AppState::new(&config, Arc::new(SystemClock), Arc::new(LoggingTransport))
    }

    /// Sink that forwards every written frame to a channel.
    fn capture_sink() -> (BoxSink, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = futures_util::sink::unfold(tx, |tx, frame: Frame| async move {
            tx.send(frame)
                .map_err(|e| HubError::Transport(e.to_string()))?;
            Ok::<_, HubError>(tx)
        });
        (Box::pin(sink), rx)
    }

    /// Sink whose every write fails.
    fn broken_sink() -> BoxSink {
        Box::pin(futures_util::sink::unfold((), |(), _frame: Frame| async move {
            Err::<(), HubError>(HubError::Transport("broken pipe".to_string()))
        }))
    }

    fn frame(text: &str) -> Result<Inbound, HubError> {
        Ok(Inbound::Frame(text.to_string()))
    }

    #[tokio::test]
    async fn malformed_frame_keeps_connection_open() {
        let state = state();
        let (sink, mut written) = capture_sink();
        let inbound = stream::iter(vec![
            frame("this is not json"),
            Ok(Inbound::Malformed("bad bytes".to_string())),
            frame(r#"{"message_type":"get_devices"}"#),
        ])
        .chain(stream::pending());

        let task = tokio::spawn(serve_connection(
            state.clone(),
            "test".to_string(),
            Box::pin(inbound),
            sink,
        ));

        let reply = tokio::time::timeout(Duration::from_secs(2), written.recv()).await;
        let Ok(Some(reply)) = reply else {
            panic!("expected a device list reply");
        };
        assert!(reply.contains("device_list"));
        assert_eq!(state.connections.len().await, 1);

        state.shutdown.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
        assert!(state.connections.is_empty().await);
    }

    #[tokio::test]
    async fn peer_close_removes_connection() {
        let state = state();
        let (sink, _written) = capture_sink();
        let inbound = stream::iter(vec![Ok(Inbound::Idle), Ok(Inbound::Closed)]);

        serve_connection(state.clone(), "test".to_string(), inbound, sink).await;
        assert!(state.connections.is_empty().await);
    }

    #[tokio::test]
    async fn read_error_tears_down_connection() {
        let state = state();
        let (sink, _written) = capture_sink();
        let inbound = stream::iter(vec![Err(HubError::Transport("reset".to_string()))])
            .chain(stream::pending());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            serve_connection(state.clone(), "test".to_string(), Box::pin(inbound), sink),
        )
        .await;
        assert!(result.is_ok());
        assert!(state.connections.is_empty().await);
    }

    #[tokio::test]
    async fn write_failure_tears_down_connection() {
        let state = state();
        let inbound = stream::iter(vec![frame(r#"{"message_type":"get_devices"}"#)])
            .chain(stream::pending());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            serve_connection(
                state.clone(),
                "test".to_string(),
                Box::pin(inbound),
                broken_sink(),
            ),
        )
        .await;
        assert!(result.is_ok());
        assert!(state.connections.is_empty().await);
    }

    #[tokio::test]
    async fn idle_connection_times_out() {
        let config = HubConfig {
            read_idle_timeout: Duration::from_millis(50),
            ..HubConfig::default()
        };
        let state = AppState::new(&config, Arc::new(SystemClock), Arc::new(LoggingTransport));
        let (sink, _written) = capture_sink();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            serve_connection(
                state.clone(),
                "test".to_string(),
                stream::pending::<Result<Inbound, HubError>>(),
                sink,
            ),
        )
        .await;
        assert!(result.is_ok());
        assert!(state.connections.is_empty().await);
    }
}

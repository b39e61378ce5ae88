//! Line-delimited JSON over plain TCP.
//!
//! Each message is one compact JSON document terminated by `\n`. Compact
//! JSON never contains a raw newline, so the delimiter is unambiguous for
//! arbitrarily nested payloads.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};

use super::messages::Frame;
use super::session::{Inbound, serve_connection};
use crate::app_state::AppState;
use crate::error::HubError;

/// Accepts TCP observers until shutdown, spawning one session each.
pub async fn accept_loop(listener: TcpListener, state: AppState) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "tcp listener accepting");
    }

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(run_tcp(stream, peer, state.clone()));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "tcp accept failed");
                }
            },
        }
    }

    tracing::info!("tcp listener stopped");
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Text(String),
    /// A line longer than the frame limit; its bytes were discarded.
    Oversized,
}

/// [`LinesCodec`] that yields [`Line::Oversized`] instead of failing.
///
/// `Framed` stops decoding buffered bytes after a decoder error, so an
/// oversized line must not surface as one.
#[derive(Debug)]
struct JsonLineCodec {
    inner: LinesCodec,
}

impl JsonLineCodec {
    fn new(max_frame_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_frame_bytes),
        }
    }
}

fn recover(
    decoded: Result<Option<String>, LinesCodecError>,
) -> Result<Option<Line>, LinesCodecError> {
    match decoded {
        Ok(line) => Ok(line.map(Line::Text)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Line::Oversized)),
        Err(err) => Err(err),
    }
}

impl Decoder for JsonLineCodec {
    type Item = Line;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, LinesCodecError> {
        recover(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, LinesCodecError> {
        recover(self.inner.decode_eof(buf))
    }
}

impl Encoder<Frame> for JsonLineCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.inner.encode(frame, dst)
    }
}

/// Adapts one TCP stream into the transport-agnostic session loop.
pub async fn run_tcp(stream: TcpStream, peer: SocketAddr, state: AppState) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %err, "could not disable nagle");
    }
    let codec = JsonLineCodec::new(state.limits.max_frame_bytes);
    let (sink, lines) = Framed::new(stream, codec).split::<Frame>();

    let inbound = lines.map(|line| match line {
        Ok(Line::Text(text)) if text.trim().is_empty() => Ok(Inbound::Idle),
        Ok(Line::Text(text)) => Ok(Inbound::Frame(text)),
        Ok(Line::Oversized) => Ok(Inbound::Malformed(
            "line exceeds maximum frame size".to_string(),
        )),
        Err(err) => Err(HubError::Transport(err.to_string())),
    });
    let outbound = sink.sink_map_err(|err| HubError::Transport(err.to_string()));

    serve_connection(state, peer.to_string(), inbound, outbound).await;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::domain::SystemClock;
    use crate::service::LoggingTransport;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn start(max_frame_bytes: usize) -> (AppState, SocketAddr) {
        let config = HubConfig {
            max_frame_bytes,
            ..HubConfig::default()
        };
        let state = AppState::new(&config, Arc::new(SystemClock), Arc::new(LoggingTransport));
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("listener has no address");
        };
        tokio::spawn(accept_loop(listener, state.clone()));
        (state, addr)
    }

    #[test]
    fn codec_skips_oversized_line_and_keeps_decoding() {
        let mut codec = JsonLineCodec::new(16);
        let mut buf = BytesMut::from(&b"0123456789abcdefghijklmnop\n{\"a\":1}\n"[..]);

        let Ok(first) = codec.decode(&mut buf) else {
            panic!("oversized line must not be an error");
        };
        assert_eq!(first, Some(Line::Oversized));
        let Ok(second) = codec.decode(&mut buf) else {
            panic!("following line should decode");
        };
        assert_eq!(second, Some(Line::Text(r#"{"a":1}"#.to_string())));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn oversized_line_is_dropped_and_connection_survives() {
        let (state, addr) = start(64).await;
        let Ok(stream) = TcpStream::connect(addr).await else {
            panic!("connect failed");
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut replies = BufReader::new(read_half).lines();

        let padding = "x".repeat(200);
        let oversized =
            format!("{{\"message_type\":\"get_devices\",\"pad\":\"{padding}\"}}\n");
        if write_half.write_all(oversized.as_bytes()).await.is_err() {
            panic!("write failed");
        }
        if write_half
            .write_all(b"{\"message_type\":\"get_devices\"}\n")
            .await
            .is_err()
        {
            panic!("write failed");
        }

        let reply = tokio::time::timeout(Duration::from_secs(2), replies.next_line()).await;
        let Ok(Ok(Some(line))) = reply else {
            panic!("expected a reply after the oversized line, got {reply:?}");
        };
        assert_eq!(line, r#"{"message_type":"device_list","devices":[]}"#);
        assert_eq!(state.connections.len().await, 1);

        state.shutdown.cancel();
    }

    #[tokio::test]
    async fn peer_eof_ends_session() {
        let (state, addr) = start(64).await;
        let Ok(mut stream) = TcpStream::connect(addr).await else {
            panic!("connect failed");
        };
        if stream.write_all(b"{\"message_type\":\"get_devices\"}\n").await.is_err() {
            panic!("write failed");
        }
        let mut reply = BufReader::new(&mut stream);
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(2), reply.read_line(&mut line)).await;
        assert!(matches!(read, Ok(Ok(n)) if n > 0));
        drop(reply);
        drop(stream);

        for _ in 0..100 {
            if state.connections.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.connections.is_empty().await);
        state.shutdown.cancel();
    }
}

//! Transport abstraction and the built-in TCP transport.
//!
//! A [`Transport`] moves opaque protocol payloads to and from the engine;
//! framing is the transport's business, encoding is the protocol's. The
//! driver talks to transports only through boxed trait objects produced
//! by a factory, so alternative links (TLS, in-process fakes) plug in
//! without touching the dispatch pipeline.

use futures::future::BoxFuture;

use crate::error::Error;

/// A bidirectional, connection-oriented link to one engine endpoint.
///
/// Implementations are driven by exactly one request cycle at a time;
/// they never see interleaved sends from concurrent callers.
pub trait Transport: Send + 'static {
    /// Dial the endpoint. Called once, before any other operation.
    fn connect<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, Result<(), Error>>;

    /// Write one protocol payload to the engine.
    fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), Error>>;

    /// Read the next protocol payload from the engine.
    fn recv(&mut self) -> BoxFuture<'_, Result<Vec<u8>, Error>>;

    /// Tear the link down.
    fn close(&mut self) -> BoxFuture<'_, Result<(), Error>>;
}

#[cfg(feature = "tcp")]
pub use self::tcp_impl::TcpTransport;

#[cfg(feature = "tcp")]
mod tcp_impl {
    use bytes::BytesMut;
    use futures::future::BoxFuture;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use grapnel_proto::framing;

    use super::Transport;
    use crate::error::Error;

    /// The built-in transport: TCP with length-prefix framing.
    pub struct TcpTransport {
        stream: Option<TcpStream>,
        buf: BytesMut,
    }

    impl TcpTransport {
        /// Create an undialed TCP transport.
        pub fn new() -> Self {
            TcpTransport {
                stream: None,
                buf: BytesMut::with_capacity(framing::LENGTH_PREFIX_SIZE + 8 * 1024),
            }
        }
    }

    impl Default for TcpTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Strip the `tcp://` scheme, leaving a dialable `host:port`.
    fn parse_url(url: &str) -> Result<&str, Error> {
        url.strip_prefix("tcp://")
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| Error::Transport(format!("unsupported endpoint url: {}", url)))
    }

    impl Transport for TcpTransport {
        fn connect<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, Result<(), Error>> {
            Box::pin(async move {
                let addr = parse_url(url)?;
                let stream = TcpStream::connect(addr).await.map_err(|e| {
                    Error::Transport(format!("failed to connect to {}: {}", addr, e))
                })?;

                // Request/response traffic is latency-bound
                stream
                    .set_nodelay(true)
                    .map_err(|e| Error::Transport(format!("failed to set nodelay: {}", e)))?;

                tracing::debug!(address = %addr, "transport connected");
                self.stream = Some(stream);
                self.buf.clear();
                Ok(())
            })
        }

        fn send<'a>(&'a mut self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
            Box::pin(async move {
                let frame = framing::encode_frame(payload)?;
                let stream = self
                    .stream
                    .as_mut()
                    .ok_or_else(|| Error::Transport("transport is not connected".to_string()))?;

                stream
                    .write_all(&frame)
                    .await
                    .map_err(|e| Error::Transport(format!("failed to send frame: {}", e)))?;
                Ok(())
            })
        }

        fn recv(&mut self) -> BoxFuture<'_, Result<Vec<u8>, Error>> {
            Box::pin(async move {
                loop {
                    if let Some(payload) = framing::split_frame(&mut self.buf)? {
                        return Ok(payload);
                    }

                    let stream = self.stream.as_mut().ok_or_else(|| {
                        Error::Transport("transport is not connected".to_string())
                    })?;

                    let read = stream
                        .read_buf(&mut self.buf)
                        .await
                        .map_err(|e| Error::Transport(format!("failed to read frame: {}", e)))?;
                    if read == 0 {
                        return Err(Error::Transport(
                            "connection closed by engine".to_string(),
                        ));
                    }
                }
            })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<(), Error>> {
            Box::pin(async move {
                if let Some(mut stream) = self.stream.take() {
                    stream
                        .shutdown()
                        .await
                        .map_err(|e| Error::Transport(format!("failed to close socket: {}", e)))?;
                }
                Ok(())
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        use super::*;

        #[test]
        fn test_parse_url() {
            assert_eq!(parse_url("tcp://127.0.0.1:8182").unwrap(), "127.0.0.1:8182");
            assert!(parse_url("ws://127.0.0.1:8182").is_err());
            assert!(parse_url("tcp://").is_err());
            assert!(parse_url("127.0.0.1:8182").is_err());
        }

        #[tokio::test]
        async fn test_send_before_connect() {
            let mut transport = TcpTransport::new();
            assert!(matches!(
                transport.send(b"payload").await,
                Err(Error::Transport(_))
            ));
        }

        #[tokio::test]
        async fn test_loopback_roundtrip() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            // One-shot echo peer speaking the same framing.
            let server = tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();

                let mut header = [0u8; framing::LENGTH_PREFIX_SIZE];
                socket.read_exact(&mut header).await.unwrap();
                let len = framing::decode_frame_length(&header).unwrap();
                let mut payload = vec![0u8; len];
                socket.read_exact(&mut payload).await.unwrap();

                let reply = framing::encode_frame(&payload).unwrap();
                socket.write_all(&reply).await.unwrap();
            });

            let mut transport = TcpTransport::new();
            transport
                .connect(&format!("tcp://{}", addr))
                .await
                .unwrap();
            transport.send(b"{\"op\":\"bytecode\"}").await.unwrap();
            let echoed = transport.recv().await.unwrap();
            assert_eq!(echoed, b"{\"op\":\"bytecode\"}");

            transport.close().await.unwrap();
            server.await.unwrap();
        }

        #[tokio::test]
        async fn test_recv_engine_hangup() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            let server = tokio::spawn(async move {
                let (socket, _) = listener.accept().await.unwrap();
                drop(socket);
            });

            let mut transport = TcpTransport::new();
            transport
                .connect(&format!("tcp://{}", addr))
                .await
                .unwrap();
            server.await.unwrap();

            assert!(matches!(transport.recv().await, Err(Error::Transport(_))));
        }
    }
}

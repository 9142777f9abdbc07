//! TCP and Unix socket transport
//!
//! Frames use the length-prefixed layout in [`crate::shared::framing`]. After
//! the socket connects the client sends a `hello` frame and expects a
//! `welcome` naming one of the offered protocols.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::transport::{Connection, Connector, Endpoint, Frame, FrameReader, FrameWriter, ProtocolOptions};
use crate::errors::{AppError, AppResult, ErrorContextExt};
use crate::shared::framing::{read_frame, write_frame, HandshakeMessage};

/// Production connector for `tcp://` and `unix://` endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamConnector;

impl StreamConnector {
    pub fn new() -> Self {
        Self
    }

    async fn establish<R, W>(
        mut reader: R,
        mut writer: W,
        endpoint: String,
        options: &ProtocolOptions,
    ) -> AppResult<Connection>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let protocol = tokio::time::timeout(
            options.handshake_timeout,
            handshake(&mut reader, &mut writer, &endpoint, options),
        )
        .await
        .map_err(|_| AppError::handshake(&endpoint, "timed out waiting for welcome"))??;

        debug!("Handshake with {} selected protocol {}", endpoint, protocol);

        Ok(Connection {
            reader: Box::new(StreamReader {
                inner: reader,
                endpoint: endpoint.clone(),
                max_frame_bytes: options.max_frame_bytes,
            }),
            writer: Box::new(StreamWriter { inner: writer, endpoint }),
            protocol: Some(protocol),
        })
    }
}

async fn handshake<R, W>(reader: &mut R, writer: &mut W, endpoint: &str, options: &ProtocolOptions) -> AppResult<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = HandshakeMessage::Hello {
        protocols: options.protocols.clone(),
        client: options.client_name.clone(),
    };
    let payload = serde_json::to_vec(&hello)?;
    write_frame(writer, &payload, endpoint).await?;

    let reply = read_frame(reader, options.max_frame_bytes, endpoint)
        .await?
        .ok_or_else(|| AppError::handshake(endpoint, "connection closed before welcome"))?;

    match serde_json::from_slice::<HandshakeMessage>(&reply) {
        Ok(HandshakeMessage::Welcome { protocol }) if options.accepts(&protocol) => Ok(protocol),
        Ok(HandshakeMessage::Welcome { protocol }) => Err(AppError::handshake(
            endpoint,
            format!("server selected unoffered protocol '{}'", protocol),
        )),
        Ok(HandshakeMessage::Hello { .. }) => Err(AppError::handshake(endpoint, "expected welcome, got hello")),
        Err(e) => Err(AppError::handshake(endpoint, format!("malformed welcome: {}", e))),
    }
}

#[async_trait]
impl Connector for StreamConnector {
    async fn connect(&self, endpoint: &Endpoint, options: &ProtocolOptions) -> AppResult<Connection> {
        let label = endpoint.to_string();
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .on_endpoint(&label, "connect")?;
                stream.set_nodelay(true).on_endpoint(&label, "set TCP_NODELAY")?;
                let (reader, writer) = stream.into_split();
                Self::establish(reader, writer, label, options).await
            }
            #[cfg(unix)]
            Endpoint::Unix { path } => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .on_endpoint(&label, "connect")?;
                let (reader, writer) = stream.into_split();
                Self::establish(reader, writer, label, options).await
            }
            #[cfg(not(unix))]
            Endpoint::Unix { .. } => Err(AppError::InvalidEndpoint {
                url: label,
                reason: "unix sockets are not supported on this platform".to_string(),
            }),
        }
    }
}

struct StreamReader<R> {
    inner: R,
    endpoint: String,
    max_frame_bytes: usize,
}

#[async_trait]
impl<R> FrameReader for StreamReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_frame(&mut self) -> AppResult<Option<Frame>> {
        let frame = read_frame(&mut self.inner, self.max_frame_bytes, &self.endpoint).await?;
        Ok(frame.map(Frame::from))
    }
}

struct StreamWriter<W> {
    inner: W,
    endpoint: String,
}

#[async_trait]
impl<W> FrameWriter for StreamWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: &Frame) -> AppResult<()> {
        write_frame(&mut self.inner, frame.as_bytes(), &self.endpoint).await
    }

    async fn close(&mut self) -> AppResult<()> {
        self.inner.shutdown().await.on_endpoint(&self.endpoint, "shutdown")
    }
}

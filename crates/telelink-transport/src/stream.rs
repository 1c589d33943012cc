use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Default number of bytes requested per stream read.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected device link.
///
/// Byte-stream links (TCP, Unix domain sockets) deliver arbitrary chunks.
/// WebSocket links deliver one chunk per binary message and send each frame
/// as one binary message. Either way the receiver sees raw bytes and finds
/// frames itself.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Ws(Box<WsStream>),
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

/// Read half of a split [`LinkStream`].
pub struct LinkReader {
    inner: ReaderInner,
    buf: BytesMut,
    chunk_size: usize,
}

enum ReaderInner {
    Ws(SplitStream<WsStream>),
    Tcp(tokio::net::tcp::OwnedReadHalf),
    #[cfg(unix)]
    Unix(tokio::net::unix::OwnedReadHalf),
}

/// Write half of a split [`LinkStream`].
pub enum LinkWriter {
    Ws(SplitSink<WsStream, Message>),
    Tcp(tokio::net::tcp::OwnedWriteHalf),
    #[cfg(unix)]
    Unix(tokio::net::unix::OwnedWriteHalf),
}

impl LinkStream {
    /// Open a connection to `endpoint`.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let connect_err = |source: std::io::Error| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        };

        let stream = match endpoint {
            Endpoint::Ws { .. } => {
                let url = endpoint.to_string();
                let (stream, response) = connect_async_with_config(url.as_str(), None, true)
                    .await
                    .map_err(|source| TransportError::Handshake {
                        endpoint: url.clone(),
                        source,
                    })?;
                debug!(%endpoint, status = %response.status(), "websocket handshake complete");
                Self::from_ws(stream)
            }
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(connect_err)?;
                // Frames are small and latency-sensitive.
                stream.set_nodelay(true)?;
                Self::from_tcp(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(connect_err)?;
                Self::from_unix(stream)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(TransportError::Unsupported("unix")),
        };

        debug!(%endpoint, "link connected");
        Ok(stream)
    }

    /// Wrap an established client WebSocket.
    pub fn from_ws(stream: WsStream) -> Self {
        Self {
            inner: LinkStreamInner::Ws(Box::new(stream)),
        }
    }

    /// Wrap an already-connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
        }
    }

    /// Wrap an already-connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (LinkReader, LinkWriter) {
        let (reader, writer) = match self.inner {
            LinkStreamInner::Ws(stream) => {
                let (sink, stream) = (*stream).split();
                (ReaderInner::Ws(stream), LinkWriter::Ws(sink))
            }
            LinkStreamInner::Tcp(stream) => {
                let (r, w) = stream.into_split();
                (ReaderInner::Tcp(r), LinkWriter::Tcp(w))
            }
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => {
                let (r, w) = stream.into_split();
                (ReaderInner::Unix(r), LinkWriter::Unix(w))
            }
        };
        let reader = LinkReader {
            inner: reader,
            buf: BytesMut::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        };
        (reader, writer)
    }

    /// Transport kind label.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Ws(_) => "ws",
            LinkStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
        }
    }
}

impl LinkReader {
    /// Bytes requested per read on byte-stream links. WebSocket messages are
    /// delivered whole regardless.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Next chunk of inbound bytes, in arrival order. `Ok(None)` once the
    /// peer has closed the link.
    ///
    /// Cancel safe: a chunk is never lost if the future is dropped.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        match &mut self.inner {
            ReaderInner::Ws(stream) => loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "websocket close received");
                        return Ok(None);
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(len = text.len(), "ignoring websocket text message");
                    }
                    // Pings are answered by the protocol layer.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok(None),
                }
            },
            ReaderInner::Tcp(half) => read_chunk(half, &mut self.buf, self.chunk_size).await,
            #[cfg(unix)]
            ReaderInner::Unix(half) => read_chunk(half, &mut self.buf, self.chunk_size).await,
        }
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
    chunk_size: usize,
) -> Result<Option<Bytes>> {
    buf.reserve(chunk_size);
    if reader.read_buf(buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some(buf.split().freeze()))
}

impl LinkWriter {
    /// Write one complete frame and flush it.
    ///
    /// WebSocket links carry the frame as a single binary message.
    pub async fn send(&mut self, frame: Bytes) -> Result<()> {
        match self {
            LinkWriter::Ws(sink) => sink.send(Message::Binary(frame)).await?,
            LinkWriter::Tcp(half) => {
                half.write_all(&frame).await?;
                half.flush().await?;
            }
            #[cfg(unix)]
            LinkWriter::Unix(half) => {
                half.write_all(&frame).await?;
                half.flush().await?;
            }
        }
        Ok(())
    }

    /// Close the write direction. WebSocket links start the closing handshake.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            LinkWriter::Ws(sink) => sink.close().await?,
            LinkWriter::Tcp(half) => half.shutdown().await?,
            #[cfg(unix)]
            LinkWriter::Unix(half) => half.shutdown().await?,
        }
        Ok(())
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.kind())
            .finish()
    }
}

impl std::fmt::Debug for LinkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkReader")
            .field("buffered", &self.buf.len())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

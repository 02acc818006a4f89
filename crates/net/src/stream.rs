//! A connected stream socket of either supported family.

use std::io;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use socket2::{Socket, Type};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tokio::time;

use crate::address::{EndpointAddress, PeerAddr};

const LOCAL_CONNECT_RETRY: Duration = Duration::from_millis(1);

/// A TCP or local-domain stream, selected at runtime by the endpoint address.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Local(UnixStream),
}

impl Stream {
    /// Connects to `address`.
    ///
    /// Local addresses are connected through their bind path, so abstract
    /// names reach the abstract namespace. The socket never blocks the
    /// runtime: while the peer's backlog is full the connect is retried.
    pub async fn connect(address: &EndpointAddress) -> io::Result<Self> {
        match address {
            EndpointAddress::Tcp(address) => TcpStream::connect(address).await.map(Self::Tcp),
            EndpointAddress::Local(_) => {
                let target = address.to_sock_addr()?;
                let socket = Socket::new(address.domain(), Type::STREAM, None)?;
                socket.set_nonblocking(true)?;
                // a full backlog fails with EAGAIN instead of completing later
                loop {
                    match socket.connect(&target) {
                        Ok(()) => break,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => time::sleep(LOCAL_CONNECT_RETRY).await,
                        Err(e) => return Err(e),
                    }
                }
                UnixStream::from_std(StdUnixStream::from(socket)).map(Self::Local)
            }
        }
    }

    pub fn peer_addr(&self) -> io::Result<PeerAddr> {
        match self {
            Self::Tcp(stream) => stream.peer_addr().map(PeerAddr::Tcp),
            Self::Local(stream) => {
                let address = stream.peer_addr()?;
                Ok(PeerAddr::Local(address.as_pathname().map(ToOwned::to_owned)))
            }
        }
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn as_local(&self) -> Option<&UnixStream> {
        match self {
            Self::Local(stream) => Some(stream),
            Self::Tcp(_) => None,
        }
    }
}

impl From<TcpStream> for Stream {
    fn from(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }
}

impl From<UnixStream> for Stream {
    fn from(stream: UnixStream) -> Self {
        Self::Local(stream)
    }
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Local(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Local(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Local(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Local(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

//! UDP sockets for QUIC endpoints.

use crate::base::context::NetResultExt;
use crate::base::errwrap::{wrap, Operation};
use crate::base::neterror::NetError;
use quinn::udp;
use quinn::{AsyncUdpSocket, Runtime, TokioRuntime, UdpPoller};
use std::fmt;
use std::io::{self, IoSliceMut};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Opens the local UDP socket a QUIC endpoint runs on.
pub trait QuicListener: Send + Sync {
    fn listen(&self, addr: SocketAddr) -> Result<Arc<dyn AsyncUdpSocket>, NetError>;
}

impl<L: QuicListener + ?Sized> QuicListener for Arc<L> {
    fn listen(&self, addr: SocketAddr) -> Result<Arc<dyn AsyncUdpSocket>, NetError> {
        (**self).listen(addr)
    }
}

/// Binds a plain operating-system UDP socket and registers it with tokio.
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpListener;

impl QuicListener for UdpListener {
    fn listen(&self, addr: SocketAddr) -> Result<Arc<dyn AsyncUdpSocket>, NetError> {
        let socket = std::net::UdpSocket::bind(addr)?;
        Ok(TokioRuntime.wrap_udp_socket(socket)?)
    }
}

/// Classifies listen errors with operation `quic_listen`, and the read and
/// write errors of the sockets it opens with `read_from` and `write_to`.
#[derive(Debug, Default)]
pub struct QuicListenerErrWrapper<L> {
    listener: L,
}

impl<L: QuicListener> QuicListenerErrWrapper<L> {
    pub fn new(listener: L) -> Self {
        Self { listener }
    }

    pub fn inner(&self) -> &L {
        &self.listener
    }
}

impl<L: QuicListener> QuicListener for QuicListenerErrWrapper<L> {
    fn listen(&self, addr: SocketAddr) -> Result<Arc<dyn AsyncUdpSocket>, NetError> {
        let socket = self.listener.listen(addr).wrap_err(Operation::QuicListen)?;
        Ok(Arc::new(UdpSocketErrWrapper::new(socket)))
    }
}

/// A QUIC socket whose send and receive errors carry a classified
/// [`NetError::Wrapped`].
///
/// The wrapped error travels inside the `io::Error` quinn expects and keeps
/// its kind, so `WouldBlock` backpressure is untouched.
pub struct UdpSocketErrWrapper {
    inner: Arc<dyn AsyncUdpSocket>,
}

impl UdpSocketErrWrapper {
    pub fn new(inner: Arc<dyn AsyncUdpSocket>) -> Self {
        Self { inner }
    }
}

impl fmt::Debug for UdpSocketErrWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

fn wrap_io(operation: Operation, e: io::Error) -> io::Error {
    let kind = e.kind();
    if kind == io::ErrorKind::WouldBlock {
        return e;
    }
    if let Some(NetError::Wrapped(_)) = e.get_ref().and_then(|i| i.downcast_ref::<NetError>()) {
        return e;
    }
    io::Error::new(kind, wrap(operation, NetError::Io(e)))
}

impl AsyncUdpSocket for UdpSocketErrWrapper {
    fn create_io_poller(self: Arc<Self>) -> Pin<Box<dyn UdpPoller>> {
        self.inner.clone().create_io_poller()
    }

    fn try_send(&self, transmit: &udp::Transmit) -> io::Result<()> {
        self.inner
            .try_send(transmit)
            .map_err(|e| wrap_io(Operation::WriteTo, e))
    }

    fn poll_recv(
        &self,
        cx: &mut Context,
        bufs: &mut [IoSliceMut<'_>],
        meta: &mut [udp::RecvMeta],
    ) -> Poll<io::Result<usize>> {
        let received = ready!(self.inner.poll_recv(cx, bufs, meta));
        Poll::Ready(received.map_err(|e| wrap_io(Operation::ReadFrom, e)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn max_transmit_segments(&self) -> usize {
        self.inner.max_transmit_segments()
    }

    fn max_receive_segments(&self) -> usize {
        self.inner.max_receive_segments()
    }

    fn may_fragment(&self) -> bool {
        self.inner.may_fragment()
    }
}

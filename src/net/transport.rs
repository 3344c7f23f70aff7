use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connection closed by peer")]
    Closed,
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("websocket protocol error: {0}")]
    Protocol(String),
}

/// Byte stream to a login or game server. Reads never block; a peer close
/// surfaces as [`TransportError::Closed`] from `poll_read`.
pub trait Transport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError>;
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    /// Copies available bytes into `buf`; `Ok(0)` means nothing arrived yet.
    fn poll_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
    fn is_connected(&self) -> bool;
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        (**self).connect(host, port)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send(bytes)
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).poll_read(buf)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Opens a blocking stream to the first address of `host:port` that answers.
pub(crate) fn connect_stream(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, TransportError> {
    let label = format!("{host}:{port}");
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| TransportError::Resolve(label.clone()))?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    match last_err {
        Some(source) => Err(TransportError::Connect {
            addr: label,
            source,
        }),
        None => Err(TransportError::Resolve(label)),
    }
}

/// Writes as much of `pending` as the socket takes without blocking.
pub(crate) fn flush_pending(
    stream: &mut TcpStream,
    pending: &mut Vec<u8>,
) -> Result<(), TransportError> {
    while !pending.is_empty() {
        match stream.write(pending) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(written) => {
                pending.drain(..written);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Plain TCP; the socket switches to non-blocking once connected.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    outgoing: Vec<u8>,
    connect_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            stream: None,
            outgoing: Vec::new(),
            connect_timeout,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.close();
        let stream = connect_stream(host, port, self.connect_timeout)?;
        stream.set_nonblocking(true)?;
        tracing::debug!(host, port, "tcp connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        self.outgoing.extend_from_slice(bytes);
        flush_pending(stream, &mut self.outgoing)
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        flush_pending(stream, &mut self.outgoing)?;
        loop {
            return match stream.read(buf) {
                Ok(0) => Err(TransportError::Closed),
                Ok(read) => Ok(read),
                Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => Err(err.into()),
            };
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.outgoing.clear();
    }
}

#[derive(Debug, Default)]
struct MemoryPipe {
    inbound: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    connects: Vec<(String, u16)>,
    connected: bool,
    remote_closed: bool,
    refuse_connect: bool,
}

/// In-process transport driven through a [`MemoryHandle`]; used by the
/// scenario tests and by trace replay.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pipe: Rc<RefCell<MemoryPipe>>,
}

/// The "server" side of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    pipe: Rc<RefCell<MemoryPipe>>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryHandle) {
        let pipe = Rc::new(RefCell::new(MemoryPipe::default()));
        (
            MemoryTransport { pipe: pipe.clone() },
            MemoryHandle { pipe },
        )
    }
}

impl MemoryHandle {
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.pipe.borrow_mut().inbound.extend(bytes.iter().copied());
    }

    /// Everything the client sent since the last call, one entry per `send`.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.pipe.borrow_mut().sent)
    }

    pub fn connects(&self) -> Vec<(String, u16)> {
        self.pipe.borrow().connects.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.pipe.borrow().connected
    }

    /// Closes from the server side; pending inbound bytes are still delivered.
    pub fn close_remote(&self) {
        self.pipe.borrow_mut().remote_closed = true;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.pipe.borrow_mut().refuse_connect = refuse;
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        let mut pipe = self.pipe.borrow_mut();
        pipe.connects.push((host.to_string(), port));
        if pipe.refuse_connect {
            return Err(TransportError::Connect {
                addr: format!("{host}:{port}"),
                source: std::io::Error::new(ErrorKind::ConnectionRefused, "refused"),
            });
        }
        pipe.connected = true;
        pipe.remote_closed = false;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut pipe = self.pipe.borrow_mut();
        if !pipe.connected {
            return Err(TransportError::NotConnected);
        }
        pipe.sent.push(bytes.to_vec());
        Ok(())
    }

    fn poll_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut pipe = self.pipe.borrow_mut();
        if !pipe.connected {
            return Err(TransportError::NotConnected);
        }
        if pipe.inbound.is_empty() {
            if pipe.remote_closed {
                pipe.connected = false;
                return Err(TransportError::Closed);
            }
            return Ok(0);
        }
        let count = buf.len().min(pipe.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn is_connected(&self) -> bool {
        self.pipe.borrow().connected
    }

    fn close(&mut self) {
        let mut pipe = self.pipe.borrow_mut();
        pipe.connected = false;
        pipe.inbound.clear();
    }
}

//! Per-port server socket and the shutdown handles shared with the
//! watchdog.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

/// Cloned socket handles for one port, owned jointly by the worker and
/// the watchdog.
///
/// The worker publishes a clone whenever it binds or accepts; the
/// watchdog's only use of the handles is [`shutdown_listener`] and
/// [`shutdown_connection`], which unblock the worker's `accept`/`read`
/// calls from the outside. Shutdown through a cloned handle reaches the
/// shared underlying socket, so the worker-side handle sees it too.
///
/// [`shutdown_listener`]: PortHandles::shutdown_listener
/// [`shutdown_connection`]: PortHandles::shutdown_connection
#[derive(Debug, Default)]
pub(crate) struct PortHandles {
    listener: Mutex<Option<Socket>>,
    connection: Mutex<Option<TcpStream>>,
}

impl PortHandles {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn set_listener(&self, socket: Socket) {
        *self.listener.lock().expect("port handle mutex poisoned") = Some(socket);
    }

    fn set_connection(&self, stream: TcpStream) {
        *self.connection.lock().expect("port handle mutex poisoned") = Some(stream);
    }

    fn clear_connection(&self) {
        *self.connection.lock().expect("port handle mutex poisoned") = None;
    }

    /// Shuts the listening socket down in both directions.
    ///
    /// A blocked `accept` in the owning worker fails afterwards. Returns
    /// `Ok` when no listener has been published yet.
    pub(crate) fn shutdown_listener(&self) -> io::Result<()> {
        match self
            .listener
            .lock()
            .expect("port handle mutex poisoned")
            .as_ref()
        {
            Some(socket) => socket.shutdown(Shutdown::Both),
            None => Ok(()),
        }
    }

    /// Shuts the accepted connection down in both directions.
    ///
    /// A blocked `read` in the owning worker returns EOF afterwards.
    /// Returns `Ok` when no connection is currently published.
    pub(crate) fn shutdown_connection(&self) -> io::Result<()> {
        match self
            .connection
            .lock()
            .expect("port handle mutex poisoned")
            .as_ref()
        {
            Some(stream) => stream.shutdown(Shutdown::Both),
            None => Ok(()),
        }
    }
}

/// Listening socket plus the currently accepted connection for one port.
///
/// Exactly one worker owns each `ServerSocket`; all operations are
/// strictly ordered by that worker. The socket tolerates every operation
/// failing after the watchdog shuts it down through [`PortHandles`].
#[derive(Debug)]
pub(crate) struct ServerSocket {
    port: u16,
    backlog: u32,
    listener: Option<TcpListener>,
    connection: Option<TcpStream>,
    handles: Arc<PortHandles>,
}

impl ServerSocket {
    pub(crate) fn new(port: u16, backlog: u32, handles: Arc<PortHandles>) -> Self {
        Self {
            port,
            backlog,
            listener: None,
            connection: None,
            handles,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Binds and starts listening on the port. Idempotent: a socket that
    /// is already listening returns `Ok` without rebinding.
    pub(crate) fn listen(&mut self) -> io::Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        // Built through socket2 because std's TcpListener::bind hardcodes
        // its backlog.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        socket.bind(&addr.into())?;
        socket.listen(self.backlog as i32)?;

        let listener = TcpListener::from(socket);
        match listener.try_clone() {
            Ok(clone) => self.handles.set_listener(Socket::from(clone)),
            Err(error) => {
                warn!(port = self.port, %error, "could not publish listener handle");
            }
        }
        debug!(port = self.port, backlog = self.backlog, "listening");
        self.listener = Some(listener);
        Ok(())
    }

    /// Blocks until the next connection arrives and makes it current.
    pub(crate) fn accept_next_connection(&mut self) -> io::Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not listening"))?;
        let (stream, peer) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        };
        debug!(port = self.port, %peer, "accepted connection");
        match stream.try_clone() {
            Ok(clone) => self.handles.set_connection(clone),
            Err(error) => {
                warn!(port = self.port, %error, "could not publish connection handle");
            }
        }
        self.connection = Some(stream);
        Ok(())
    }

    /// Writes the whole buffer to the current connection.
    pub(crate) fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.current()?.write_all(buf)
    }

    /// Drops the current connection; the listening socket stays up.
    pub(crate) fn close_current_connection(&mut self) {
        self.connection = None;
        self.handles.clear_connection();
    }

    fn current(&mut self) -> io::Result<&mut TcpStream> {
        self.connection
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no accepted connection"))
    }
}

impl Read for ServerSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.current()?.read(buf)
    }
}

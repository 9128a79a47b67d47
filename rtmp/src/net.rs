/*!
A `Network` and `Listener` over blocking `std::net` sockets.

Everything runs on the calling thread.  Sockets are read with a short timeout by
`SystemNetwork::poll()`, which also reports transport establishment and completed name
resolutions, so an application (or test) drives its connections by polling in a loop:

```no_run
# use std::rc::Rc;
# use rml_netconn::connection::{connect, ConnectionConfig, ConnectionHandlers};
# use rml_netconn::net::SystemNetwork;
let network = Rc::new(SystemNetwork::new());
let connection = connect(
    network.clone(),
    "rtmp://localhost/live/stream",
    ConnectionConfig::new(),
    ConnectionHandlers::new(),
).unwrap();

while !connection.is_closed() {
    network.poll();
}
```
*/

use crate::transport::{Listener, Network, PendingQuery, ResolveHandler, Transport, TransportEvents};
use std::cell::{Cell, RefCell};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const READ_BUFFER_SIZE: usize = 4096;
const READ_TIMEOUT: Duration = Duration::from_millis(1);

struct Socket {
    stream: TcpStream,
    events: TransportEvents,
    established_reported: bool,
    closed: Rc<Cell<bool>>,
}

struct PendingResolve {
    result: io::Result<Ipv4Addr>,
    handler: ResolveHandler,
    cancelled: Rc<Cell<bool>>,
}

enum Work {
    Resolved(PendingResolve),
    Established(TransportEvents),
    Received(TransportEvents, Vec<u8>),
    Closed(TransportEvents, Option<io::Error>),
}

#[derive(Default)]
struct NetworkState {
    sockets: Vec<Socket>,
    resolves: Vec<PendingResolve>,
    listener: Option<TcpListener>,
}

/// Blocking socket network, driven by `poll()`
#[derive(Default)]
pub struct SystemNetwork {
    state: RefCell<NetworkState>,
}

impl SystemNetwork {
    pub fn new() -> SystemNetwork {
        SystemNetwork::default()
    }

    /// Binds the listener used by `Listener::accept()`, returning the bound address
    pub fn listen<A: ToSocketAddrs>(&self, address: A) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(address)?;
        let local = listener.local_addr()?;
        debug!(address = %local, "Listening");

        self.state.borrow_mut().listener = Some(listener);
        Ok(local)
    }

    /// Number of sockets that have not been closed yet
    pub fn open_sockets(&self) -> usize {
        self.state.borrow().sockets.len()
    }

    /// Reports every completed resolution and whatever each socket has to say.  Returns the
    /// number of events reported.
    pub fn poll(&self) -> usize {
        let work = self.collect_work();
        let count = work.len();

        for item in work {
            match item {
                Work::Resolved(resolve) => {
                    if !resolve.cancelled.get() {
                        (resolve.handler)(resolve.result);
                    }
                }

                Work::Established(events) => events.established(),
                Work::Received(events, bytes) => events.received(&bytes),
                Work::Closed(events, error) => events.closed(error),
            }
        }

        count
    }

    /// Polls until `done` returns true or `timeout` passes.  Returns the final `done` value.
    pub fn poll_until<F: FnMut() -> bool>(&self, mut done: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            if Instant::now() >= deadline {
                return false;
            }

            self.poll();
        }

        true
    }

    fn collect_work(&self) -> Vec<Work> {
        let mut state = self.state.borrow_mut();
        let mut work: Vec<Work> = state.resolves.drain(..).map(Work::Resolved).collect();

        let mut buffer = [0_u8; READ_BUFFER_SIZE];
        for socket in state.sockets.iter_mut() {
            if socket.closed.get() {
                continue;
            }

            if !socket.established_reported {
                socket.established_reported = true;
                work.push(Work::Established(socket.events.clone()));
            }

            match socket.stream.read(&mut buffer) {
                Ok(0) => {
                    trace!("Socket closed by peer");
                    socket.closed.set(true);
                    work.push(Work::Closed(socket.events.clone(), None));
                }

                Ok(count) => work.push(Work::Received(socket.events.clone(), buffer[..count].to_vec())),
                Err(ref error) if error.kind() == ErrorKind::WouldBlock || error.kind() == ErrorKind::TimedOut => (),
                Err(error) => {
                    debug!(error = %error, "Socket read failed");
                    socket.closed.set(true);
                    work.push(Work::Closed(socket.events.clone(), Some(error)));
                }
            }
        }

        state.sockets.retain(|socket| !socket.closed.get());
        work
    }

    fn register(&self, stream: TcpStream, events: TransportEvents, established: bool) -> io::Result<Box<dyn Transport>> {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;

        let closed = Rc::new(Cell::new(false));
        let writer = stream.try_clone()?;
        self.state.borrow_mut().sockets.push(Socket {
            stream,
            events,
            established_reported: established,
            closed: Rc::clone(&closed),
        });

        Ok(Box::new(TcpTransport { stream: writer, closed }))
    }
}

impl Network for SystemNetwork {
    fn resolve(&self, host: &str, handler: ResolveHandler) -> io::Result<Box<dyn PendingQuery>> {
        let result = (host, 0)
            .to_socket_addrs()
            .and_then(|mut addresses| {
                addresses
                    .find_map(|address| match address {
                        SocketAddr::V4(address) => Some(*address.ip()),
                        SocketAddr::V6(_) => None,
                    })
                    .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "no IPv4 address found"))
            });

        debug!(host, resolved = ?result.as_ref().ok(), "Resolved host name");

        let cancelled = Rc::new(Cell::new(false));
        self.state.borrow_mut().resolves.push(PendingResolve {
            result,
            handler,
            cancelled: Rc::clone(&cancelled),
        });

        Ok(Box::new(ResolveQuery { cancelled }))
    }

    fn open(&self, address: SocketAddr, events: TransportEvents) -> io::Result<Box<dyn Transport>> {
        debug!(address = %address, "Opening TCP connection");
        let stream = TcpStream::connect(address)?;
        self.register(stream, events, false)
    }
}

impl Listener for SystemNetwork {
    fn accept(&self, events: TransportEvents) -> io::Result<Box<dyn Transport>> {
        let accepted = match &self.state.borrow().listener {
            Some(listener) => listener.accept(),
            None => Err(io::Error::new(ErrorKind::NotConnected, "listen() was not called")),
        };

        let (stream, peer) = accepted?;
        debug!(peer = %peer, "Accepted TCP connection");
        self.register(stream, events, true)
    }
}

struct TcpTransport {
    stream: TcpStream,
    closed: Rc<Cell<bool>>,
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.closed.get() {
            return Err(io::Error::new(ErrorKind::NotConnected, "socket is closed"));
        }

        self.stream.write_all(bytes)
    }

    fn close(&mut self) {
        if !self.closed.replace(true) {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

struct ResolveQuery {
    cancelled: Rc<Cell<bool>>,
}

impl PendingQuery for ResolveQuery {
    fn cancel(&mut self) {
        self.cancelled.set(true);
    }
}

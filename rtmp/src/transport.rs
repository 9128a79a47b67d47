/*!
The boundary between a connection and the network it runs over.

A connection never performs I/O itself.  Outbound bytes are handed to a `Transport`, and the
owner of the socket reports inbound bytes and socket state changes through the `TransportEvents`
handle it was given when the transport was opened or accepted.

Implementations must not report events before `Network::open`, `Network::resolve` or
`Listener::accept` has returned, and must not report them from inside `Transport::send`.
*/

use crate::connection::{dispatch, ConnectionInner};
use std::cell::RefCell;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Weak;

/// A reliable, ordered byte stream to the peer
pub trait Transport {
    /// Queues bytes for delivery to the peer
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Shuts the byte stream down.  Called at most once by the connection, and may be called
    /// after the peer already closed it.
    fn close(&mut self) {}
}

/// An outstanding name resolution
pub trait PendingQuery {
    /// Stops the query.  Its handler must not be invoked afterwards.
    fn cancel(&mut self) {}
}

/// Receives the outcome of `Network::resolve`
pub type ResolveHandler = Box<dyn FnOnce(io::Result<Ipv4Addr>)>;

/// Name resolution and outbound transports, as used by client connections
pub trait Network {
    /// Looks up the IPv4 (A record) address of `host`
    fn resolve(&self, host: &str, handler: ResolveHandler) -> io::Result<Box<dyn PendingQuery>>;

    /// Starts opening a transport to `address`.  `TransportEvents::established` must be reported
    /// once the transport is ready to carry bytes.
    fn open(&self, address: SocketAddr, events: TransportEvents) -> io::Result<Box<dyn Transport>>;
}

/// Source of inbound transports, as used by server connections
pub trait Listener {
    /// Takes ownership of the next inbound transport.  The transport is considered established as
    /// soon as it is returned.
    fn accept(&self, events: TransportEvents) -> io::Result<Box<dyn Transport>>;
}

/// Handle through which a transport reports what happens on its byte stream.
///
/// Holds only a weak reference, so a transport owning this handle does not keep its connection
/// alive.  Once the connection is gone every method is a no-op.
#[derive(Clone)]
pub struct TransportEvents {
    connection: Weak<RefCell<ConnectionInner>>,
}

impl TransportEvents {
    pub(crate) fn new(connection: Weak<RefCell<ConnectionInner>>) -> TransportEvents {
        TransportEvents { connection }
    }

    /// The transport is ready to carry bytes
    pub fn established(&self) {
        dispatch::transport_established(&self.connection);
    }

    /// Bytes arrived from the peer
    pub fn received(&self, bytes: &[u8]) {
        dispatch::bytes_received(&self.connection, bytes);
    }

    /// The byte stream ended, either cleanly (`None`) or with an error
    pub fn closed(&self, error: Option<io::Error>) {
        dispatch::transport_closed(&self.connection, error);
    }

    /// Whether the connection these events feed still exists and is open
    pub fn is_active(&self) -> bool {
        let inner = match self.connection.upgrade() {
            Some(inner) => inner,
            None => return false,
        };

        let active = match inner.try_borrow() {
            Ok(state) => !state.closed,
            Err(_) => true,
        };

        active
    }
}

//! An RTMP NetConnection and NetStream session layer.
//!
//! This crate speaks the plain RTMP protocol (no encryption) on top of any reliable byte
//! transport.  It performs the handshake, reassembles inbound chunks into messages, answers
//! protocol control messages on its own, correlates command requests with their responses, and
//! multiplexes any number of NetStreams (`play` and `publish`) over a single connection.
//!
//! The connection performs no I/O of its own.  A `transport::Network` (or `transport::Listener`)
//! provides the bytes, and reports transport events back into the connection through the
//! `transport::TransportEvents` handle it is given.  `net::SystemNetwork` implements both traits
//! over blocking `std::net` sockets.
//!
//! Everything is single threaded, and callbacks registered on connections and streams are
//! allowed to call back into the connection, close it, or drop the last handle to it.

#[cfg(test)]
#[macro_use]
mod test_utils;

pub mod chunk_io;
pub mod connection;
pub mod handshake;
pub mod messages;
pub mod net;
pub mod stream;
pub mod transactions;
pub mod transport;

pub use crate::connection::{
    accept, connect, Connection, ConnectionConfig, ConnectionError, ConnectionHandlers,
};
pub use crate::stream::Stream;

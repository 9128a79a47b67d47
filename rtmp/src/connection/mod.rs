/*!
A single RTMP connection (NetConnection), either initiated as a client with `connect()` or
accepted as a server with `accept()`.

The connection drives the handshake, reassembles inbound chunks into messages, answers protocol
control messages on its own, and hands commands, media and data to the callbacks registered on
the connection and its streams.  All work happens synchronously inside the `TransportEvents`
calls made by the transport, on a single thread.

`Connection` is a cheap, clonable handle.  The connection lives as long as at least one handle
exists, and callbacks are free to close the connection or drop the last handle while a message is
being dispatched.
*/

mod config;
pub(crate) mod dispatch;
mod errors;
mod handlers;
mod summary;
mod uri;


pub use self::config::ConnectionConfig;
pub use self::errors::ConnectionError;
pub use self::handlers::{
    CloseHandler, CommandHandler, CommandMessage, ConnectionHandlers, EstablishedHandler,
};
pub use self::summary::{ConnectionStats, ConnectionSummary, StreamSummary};
pub use self::uri::{RtmpUri, UriParseError, DEFAULT_RTMP_PORT};

use crate::chunk_io::{ChunkDeserializer, ChunkFormat, ChunkSerializer, OutboundHeader};
use crate::handshake::{ConnectionRole, Handshake, HandshakeState, Nonce};
use crate::messages::{Amf0Command, RtmpMessage, AMF0_COMMAND_TYPE_ID};
use crate::stream::StreamShared;
use crate::transactions::{CommandResponse, TransactionList};
use crate::transport::{Listener, Network, PendingQuery, ResolveHandler, Transport, TransportEvents};
use bytes::BytesMut;
use rand::RngCore;
use rml_amf0::Amf0Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use tracing::debug;

/// Chunk stream carrying protocol control messages
pub const CONTROL_CHUNK_STREAM_ID: u32 = 2;

/// Chunk stream carrying connection and stream commands
pub const COMMAND_CHUNK_STREAM_ID: u32 = 3;

/// Message stream id of the connection itself
pub const CONTROL_MESSAGE_STREAM_ID: u32 = 0;

/// Handle to an RTMP connection
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Rc<RefCell<ConnectionInner>>,
}

pub(crate) struct ConnectionInner {
    pub(crate) role: ConnectionRole,
    pub(crate) config: ConnectionConfig,
    pub(crate) handshake: Handshake,
    pub(crate) connected: bool,
    pub(crate) closed: bool,
    pub(crate) network: Option<Rc<dyn Network>>,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) query: Option<Box<dyn PendingQuery>>,
    pub(crate) serializer: ChunkSerializer,
    pub(crate) deserializer: ChunkDeserializer,
    pub(crate) buffer: BytesMut,
    pub(crate) streams: Vec<Rc<StreamShared>>,
    pub(crate) transactions: TransactionList,
    pub(crate) handlers: ConnectionHandlers,
    pub(crate) stats: ConnectionStats,
    pub(crate) window_ack_size: u32,
    pub(crate) last_chunk_id: u32,
    pub(crate) target: Option<RtmpUri>,
    pub(crate) uri: Option<String>,
}

/// Opens a client connection to `uri`, which must have the form
/// `rtmp://host[:port]/app/stream-path`.
///
/// The handshake starts once the transport reports that it is established, and the `connect`
/// request is sent as soon as the handshake completes.  The established handler fires when the
/// server accepts the `connect` request.
pub fn connect(
    network: Rc<dyn Network>,
    uri: &str,
    config: ConnectionConfig,
    handlers: ConnectionHandlers,
) -> Result<Connection, ConnectionError> {
    connect_with_rng(network, uri, config, handlers, &mut rand::thread_rng())
}

/// Same as `connect()`, with the handshake nonce drawn from `rng`
pub fn connect_with_rng<R: RngCore + ?Sized>(
    network: Rc<dyn Network>,
    uri: &str,
    config: ConnectionConfig,
    handlers: ConnectionHandlers,
    rng: &mut R,
) -> Result<Connection, ConnectionError> {
    let target = RtmpUri::parse(uri)?;
    let connection = Connection::new(ConnectionRole::Client, config, handlers, Nonce::generate(rng));
    {
        let mut inner = connection.inner.borrow_mut();
        inner.network = Some(Rc::clone(&network));
        inner.uri = Some(uri.to_string());
        inner.target = Some(target.clone());
    }

    match target.ip_address() {
        Some(ip) => {
            debug!(address = %ip, port = target.port, "Connecting to IP address");
            let events = TransportEvents::new(Rc::downgrade(&connection.inner));
            let transport = network.open(SocketAddr::new(ip, target.port), events)?;
            connection.inner.borrow_mut().transport = Some(transport);
        }

        None => {
            debug!(host = %target.host, "Resolving host");
            let weak = Rc::downgrade(&connection.inner);
            let host = target.host.clone();
            let port = target.port;
            let handler: ResolveHandler = Box::new(move |result| {
                dispatch::host_resolved(&weak, host, port, result.map(IpAddr::V4));
            });

            let query = network.resolve(&target.host, handler)?;
            connection.inner.borrow_mut().query = Some(query);
        }
    }

    Ok(connection)
}

/// Accepts the next inbound transport from `listener` as a server connection
pub fn accept(
    listener: &dyn Listener,
    config: ConnectionConfig,
    handlers: ConnectionHandlers,
) -> Result<Connection, ConnectionError> {
    accept_with_rng(listener, config, handlers, &mut rand::thread_rng())
}

/// Same as `accept()`, with the handshake nonce drawn from `rng`
pub fn accept_with_rng<R: RngCore + ?Sized>(
    listener: &dyn Listener,
    config: ConnectionConfig,
    handlers: ConnectionHandlers,
    rng: &mut R,
) -> Result<Connection, ConnectionError> {
    let connection = Connection::new(ConnectionRole::Server, config, handlers, Nonce::generate(rng));
    let events = TransportEvents::new(Rc::downgrade(&connection.inner));
    let transport = listener.accept(events)?;
    connection.inner.borrow_mut().transport = Some(transport);

    debug!("Accepted inbound connection");
    Ok(connection)
}

impl Connection {
    fn new(role: ConnectionRole, config: ConnectionConfig, handlers: ConnectionHandlers, nonce: Nonce) -> Connection {
        let inner = ConnectionInner {
            role,
            handshake: Handshake::new(role, nonce),
            connected: false,
            closed: false,
            network: None,
            transport: None,
            query: None,
            serializer: ChunkSerializer::new(),
            deserializer: ChunkDeserializer::new(),
            buffer: BytesMut::new(),
            streams: Vec::new(),
            transactions: TransactionList::new(),
            handlers,
            stats: ConnectionStats::default(),
            window_ack_size: 0,
            last_chunk_id: COMMAND_CHUNK_STREAM_ID + 1,
            target: None,
            uri: None,
            config,
        };

        Connection {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub fn role(&self) -> ConnectionRole {
        self.inner.borrow().role
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.borrow().handshake.state()
    }

    /// True once the client's `connect` request was accepted
    pub fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.borrow().stats
    }

    /// The window acknowledgement size most recently announced by the peer
    pub fn window_ack_size(&self) -> u32 {
        self.inner.borrow().window_ack_size
    }

    pub fn send_chunk_size(&self) -> u32 {
        self.inner.borrow().serializer.max_chunk_size()
    }

    pub fn has_stream(&self, stream_id: u32) -> bool {
        self.inner.borrow().find_stream(stream_id).is_some()
    }

    /// Application name from the URI the client connected to
    pub fn app(&self) -> Option<String> {
        self.inner.borrow().target.as_ref().map(|x| x.app.clone())
    }

    pub fn uri(&self) -> Option<String> {
        self.inner.borrow().uri.clone()
    }

    /// Allocates a chunk stream id for outbound messages.  Ids are never reused and never
    /// collide with the control and command chunk streams.
    pub fn assign_chunk_id(&self) -> u32 {
        self.inner.borrow_mut().assign_chunk_id()
    }

    /// Sends a message with an explicit chunk header
    pub fn send_message(&self, header: &OutboundHeader, payload: &[u8]) -> Result<(), ConnectionError> {
        self.inner.borrow_mut().send_message(header, payload)
    }

    /// Sends an already encoded AMF0 command or data payload
    pub fn send_amf_command(
        &self,
        format: ChunkFormat,
        chunk_stream_id: u32,
        type_id: u8,
        message_stream_id: u32,
        payload: &[u8],
    ) -> Result<(), ConnectionError> {
        if payload.is_empty() {
            return Err(ConnectionError::EmptyPayload);
        }

        let header = OutboundHeader {
            format,
            chunk_stream_id,
            timestamp: 0,
            timestamp_delta: 0,
            type_id,
            message_stream_id,
        };

        self.send_message(&header, payload)
    }

    /// Sends a command that expects no response (transaction id 0)
    pub fn send_command(
        &self,
        message_stream_id: u32,
        name: &str,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
    ) -> Result<(), ConnectionError> {
        let command = Amf0Command::new(name, 0.0, command_object, arguments);
        self.inner.borrow_mut().send_command(message_stream_id, &command)
    }

    /// Sends a command and registers `handler` to receive its `_result` or `_error` response.
    ///
    /// Returns the transaction id the request was sent with.  Nothing is registered if the
    /// request could not be sent.
    pub fn send_request<F>(
        &self,
        message_stream_id: u32,
        name: &str,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
        handler: F,
    ) -> Result<u32, ConnectionError>
    where
        F: FnOnce(&Connection, CommandResponse) + 'static,
    {
        self.inner.borrow_mut().send_request(
            message_stream_id,
            name,
            command_object,
            arguments,
            Box::new(handler),
        )
    }

    /// Closes the connection.  The close handler is invoked with no error if it has not run yet.
    pub fn close(&self) {
        dispatch::close(&self.inner, None);
    }

    pub fn summary(&self) -> ConnectionSummary {
        let inner = self.inner.borrow();
        ConnectionSummary {
            role: inner.role,
            handshake_state: inner.handshake.state(),
            connected: inner.connected,
            closed: inner.closed,
            app: inner.target.as_ref().map(|x| x.app.clone()),
            uri: inner.uri.clone(),
            stats: inner.stats,
            window_ack_size: inner.window_ack_size,
            send_chunk_size: inner.serializer.max_chunk_size(),
            receive_chunk_size: inner.deserializer.max_chunk_size(),
            buffered_bytes: inner.buffer.len(),
            pending_transactions: inner.transactions.len(),
            streams: inner
                .streams
                .iter()
                .map(|stream| StreamSummary {
                    id: stream.id,
                    name: stream.name.clone(),
                    chunk_stream_id: stream.chunk_stream_id,
                })
                .collect(),
        }
    }
}

impl ConnectionInner {
    pub(crate) fn assign_chunk_id(&mut self) -> u32 {
        self.last_chunk_id += 1;
        self.last_chunk_id
    }

    pub(crate) fn find_stream(&self, stream_id: u32) -> Option<&Rc<StreamShared>> {
        self.streams.iter().find(|stream| stream.id == stream_id)
    }

    pub(crate) fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        match self.transport.as_mut() {
            Some(transport) => Ok(transport.send(bytes)?),
            None => Err(ConnectionError::NotConnected),
        }
    }

    /// Chunks and sends a message.  Only allowed once the handshake is complete.
    pub(crate) fn send_message(&mut self, header: &OutboundHeader, payload: &[u8]) -> Result<(), ConnectionError> {
        if self.closed || self.handshake.state() != HandshakeState::HandshakeDone {
            return Err(ConnectionError::NotConnected);
        }

        let bytes = self.serializer.serialize(header, payload)?;
        self.send_raw(&bytes)
    }

    pub(crate) fn send_control(&mut self, message: RtmpMessage) -> Result<(), ConnectionError> {
        let payload = message.into_message_payload(0, CONTROL_MESSAGE_STREAM_ID)?;
        let header = OutboundHeader {
            format: ChunkFormat::Full,
            chunk_stream_id: CONTROL_CHUNK_STREAM_ID,
            timestamp: 0,
            timestamp_delta: 0,
            type_id: payload.type_id,
            message_stream_id: CONTROL_MESSAGE_STREAM_ID,
        };

        self.send_message(&header, &payload.data)
    }

    pub(crate) fn send_command(&mut self, message_stream_id: u32, command: &Amf0Command) -> Result<(), ConnectionError> {
        let payload = command.serialize()?;
        let header = OutboundHeader {
            format: ChunkFormat::Full,
            chunk_stream_id: COMMAND_CHUNK_STREAM_ID,
            timestamp: 0,
            timestamp_delta: 0,
            type_id: AMF0_COMMAND_TYPE_ID,
            message_stream_id,
        };

        self.send_message(&header, &payload)
    }

    pub(crate) fn send_request(
        &mut self,
        message_stream_id: u32,
        name: &str,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
        handler: crate::transactions::ResponseHandler,
    ) -> Result<u32, ConnectionError> {
        let transaction_id = self.transactions.next_id();
        let command = Amf0Command::new(name, transaction_id as f64, command_object, arguments);
        self.send_command(message_stream_id, &command)?;
        self.transactions.register(transaction_id, name, handler);

        debug!(command = name, transaction_id, "Sent request");
        Ok(transaction_id)
    }

    pub(crate) fn connect_command_object(&self) -> Amf0Value {
        let (app, uri) = match (&self.target, &self.uri) {
            (Some(target), Some(uri)) => (target.app.clone(), uri.clone()),
            _ => (String::new(), String::new()),
        };

        let mut properties = HashMap::new();
        properties.insert("app".to_string(), Amf0Value::Utf8String(app));
        properties.insert(
            "flashVer".to_string(),
            Amf0Value::Utf8String(self.config.flash_version.clone()),
        );
        properties.insert("tcUrl".to_string(), Amf0Value::Utf8String(uri));
        properties.insert("fpad".to_string(), Amf0Value::Boolean(false));
        properties.insert(
            "capabilities".to_string(),
            Amf0Value::Number(self.config.capabilities),
        );
        properties.insert(
            "audioCodecs".to_string(),
            Amf0Value::Number(self.config.audio_codecs),
        );
        properties.insert(
            "videoCodecs".to_string(),
            Amf0Value::Number(self.config.video_codecs),
        );
        properties.insert(
            "videoFunction".to_string(),
            Amf0Value::Number(self.config.video_function),
        );

        Amf0Value::Object(properties)
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Some(mut query) = self.query.take() {
            query.cancel();
        }

        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}

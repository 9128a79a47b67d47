//! Inbound processing: transport events, the reassembly loop, message routing and teardown.
//!
//! Connection state is only ever borrowed for one processing step at a time.  A step returns the
//! callbacks it wants to run as `Delivery` values, and those run after the borrow is released so
//! they can freely call back into the connection, close it, or drop the last handle to it.

use super::{Connection, ConnectionError, ConnectionInner, CONTROL_MESSAGE_STREAM_ID};
use crate::chunk_io::ChunkReadResult;
use crate::handshake::{ConnectionRole, HandshakeState};
use crate::messages::{Amf0Command, MessagePayload, RtmpMessage, UserControlEvent};
use crate::stream::StreamShared;
use crate::transactions::{CommandResponse, ResponseHandler, TransactionList};
use crate::transport::{PendingQuery, Transport, TransportEvents};
use bytes::{Bytes, BytesMut};
use rml_amf0::Amf0Value;
use std::cell::RefCell;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

use super::handlers::{CommandHandler, CommandMessage, ConnectionHandlers, EstablishedHandler};

type SharedInner = Rc<RefCell<ConnectionInner>>;

/// A callback to run once connection state is no longer borrowed
pub(crate) enum Delivery {
    Established(EstablishedHandler),
    Command(CommandMessage),
    Response(ResponseHandler, CommandResponse),
    Audio(Rc<StreamShared>, u32, Bytes),
    Video(Rc<StreamShared>, u32, Bytes),
    StreamCommand(Rc<StreamShared>, Amf0Command),
    StreamData(Rc<StreamShared>, Vec<Amf0Value>),
    StreamControl(Rc<StreamShared>, UserControlEvent),
}

enum Step {
    NeedMoreData,
    Consumed {
        consumed: usize,
        deliveries: Vec<Delivery>,
    },
}

/// Everything a closing connection lets go of.  Released outside of any borrow, since closing
/// the transport or dropping handlers may call back into the connection.
struct Teardown {
    transport: Option<Box<dyn Transport>>,
    query: Option<Box<dyn PendingQuery>>,
    streams: Vec<Rc<StreamShared>>,
    transactions: TransactionList,
    handlers: ConnectionHandlers,
}

impl Teardown {
    fn run(self, error: Option<ConnectionError>) {
        let Teardown {
            transport,
            query,
            streams,
            transactions,
            mut handlers,
        } = self;

        if let Some(mut query) = query {
            query.cancel();
        }

        if let Some(mut transport) = transport {
            transport.close();
        }

        let close_handler = handlers.close.take();
        drop(streams);
        drop(transactions);
        drop(handlers);

        if let Some(handler) = close_handler {
            handler(error);
        }
    }
}

fn upgrade(connection: &Weak<RefCell<ConnectionInner>>) -> Option<Connection> {
    connection.upgrade().map(|inner| Connection { inner })
}

/// Closes the connection if it is still open.  Safe to call any number of times.
pub(crate) fn close(inner: &SharedInner, error: Option<ConnectionError>) {
    let teardown = {
        let mut state = match inner.try_borrow_mut() {
            Ok(state) => state,
            Err(_) => {
                // Every caller releases its borrow before closing
                debug_assert!(false, "close requested while connection state was borrowed");
                warn!("Close requested while connection state was in use");
                return;
            }
        };

        if state.closed {
            return;
        }

        match &error {
            Some(error) => debug!(role = %state.role, error = %error, "Closing connection"),
            None => debug!(role = %state.role, "Closing connection"),
        }

        state.closed = true;
        state.buffer = BytesMut::new();
        Teardown {
            transport: state.transport.take(),
            query: state.query.take(),
            streams: std::mem::take(&mut state.streams),
            transactions: std::mem::take(&mut state.transactions),
            handlers: std::mem::take(&mut state.handlers),
        }
    };

    teardown.run(error);
}

pub(crate) fn transport_established(connection: &Weak<RefCell<ConnectionInner>>) {
    let connection = match upgrade(connection) {
        Some(connection) => connection,
        None => return,
    };

    let result = {
        let mut inner = connection.inner.borrow_mut();
        if inner.closed || inner.role != ConnectionRole::Client {
            return;
        }

        debug!("Transport established, starting handshake");
        match inner.handshake.start() {
            Ok(bytes) => inner.send_raw(&bytes),
            Err(error) => Err(error.into()),
        }
    };

    if let Err(error) = result {
        close(&connection.inner, Some(error));
    }
}

pub(crate) fn transport_closed(connection: &Weak<RefCell<ConnectionInner>>, error: Option<io::Error>) {
    if let Some(connection) = upgrade(connection) {
        let error = match error {
            Some(error) => ConnectionError::Transport(error),
            None => ConnectionError::TransportClosed,
        };

        close(&connection.inner, Some(error));
    }
}

pub(crate) fn host_resolved(
    connection: &Weak<RefCell<ConnectionInner>>,
    host: String,
    port: u16,
    result: io::Result<IpAddr>,
) {
    let connection = match upgrade(connection) {
        Some(connection) => connection,
        None => return,
    };

    let network = {
        let mut inner = connection.inner.borrow_mut();
        if inner.closed {
            return;
        }

        inner.query = None;
        inner.network.clone()
    };

    let opened = match (result, network) {
        (Ok(address), Some(network)) => {
            debug!(host = %host, address = %address, "Resolved host");
            let events = TransportEvents::new(Rc::downgrade(&connection.inner));
            network.open(SocketAddr::new(address, port), events)
        }

        (Ok(_), None) => Err(io::Error::new(io::ErrorKind::Other, "no network to connect with")),

        (Err(error), _) => {
            warn!(host = %host, error = %error, "Host resolution failed");
            close(&connection.inner, Some(ConnectionError::HostNotFound { host }));
            return;
        }
    };

    match opened {
        Ok(transport) => connection.inner.borrow_mut().transport = Some(transport),
        Err(error) => close(&connection.inner, Some(ConnectionError::Transport(error))),
    }
}

/// Runs the reassembly loop over newly received bytes
pub(crate) fn bytes_received(connection: &Weak<RefCell<ConnectionInner>>, bytes: &[u8]) {
    let connection = match upgrade(connection) {
        Some(connection) => connection,
        None => return,
    };

    // Bytes are only copied when a partial unit is waiting for them
    let buffered = {
        let mut inner = connection.inner.borrow_mut();
        if inner.closed {
            return;
        }

        if inner.buffer.is_empty() {
            None
        } else {
            let total = inner.buffer.len() + bytes.len();
            let limit = inner.config.max_buffered_bytes;
            if total > limit {
                drop(inner);
                let error = ConnectionError::BufferOverflow { buffered: total, limit };
                close(&connection.inner, Some(error));
                return;
            }

            let mut buffer = std::mem::take(&mut inner.buffer);
            buffer.extend_from_slice(bytes);
            Some(buffer)
        }
    };

    let input: &[u8] = match &buffered {
        Some(buffer) => &buffer[..],
        None => bytes,
    };

    let mut offset = 0;
    while offset < input.len() {
        let step = {
            let mut inner = connection.inner.borrow_mut();
            if inner.closed {
                return;
            }

            inner.process_step(&input[offset..])
        };

        match step {
            Ok(Step::NeedMoreData) => break,
            Ok(Step::Consumed { consumed, deliveries }) => {
                offset += consumed;
                if !deliver(&connection, deliveries) {
                    return;
                }
            }

            Err(error) => {
                close(&connection.inner, Some(error));
                return;
            }
        }
    }

    let remaining = &input[offset..];
    let overflow = {
        let mut inner = connection.inner.borrow_mut();
        if inner.closed {
            return;
        }

        let limit = inner.config.max_buffered_bytes;
        if remaining.len() > limit {
            Some(ConnectionError::BufferOverflow {
                buffered: remaining.len(),
                limit,
            })
        } else {
            inner.buffer = if remaining.is_empty() {
                BytesMut::new()
            } else {
                trace!(bytes = remaining.len(), "Holding partial data");
                BytesMut::from(remaining)
            };

            None
        }
    };

    if let Some(error) = overflow {
        close(&connection.inner, Some(error));
    }
}

/// Whether dispatch may continue after running a callback
fn still_active(connection: &Connection) -> bool {
    // Our own handle is the only one left when the user dropped the connection
    Rc::strong_count(&connection.inner) > 1 && !connection.inner.borrow().closed
}

/// Runs the callbacks produced by a processing step.  Returns false if the connection was closed
/// or released by one of them, in which case the rest are discarded.
fn deliver(connection: &Connection, deliveries: Vec<Delivery>) -> bool {
    for delivery in deliveries {
        if !still_active(connection) {
            return false;
        }

        match delivery {
            Delivery::Established(handler) => handler(connection),
            Delivery::Command(message) => deliver_command(connection, &message),
            Delivery::Response(handler, response) => handler(connection, response),
            Delivery::Audio(stream, timestamp, data) => stream.deliver_audio(timestamp, data),
            Delivery::Video(stream, timestamp, data) => stream.deliver_video(timestamp, data),
            Delivery::StreamCommand(stream, command) => stream.deliver_command(&command),
            Delivery::StreamData(stream, values) => stream.deliver_data(&values),
            Delivery::StreamControl(stream, event) => stream.deliver_control(&event),
        }
    }

    still_active(connection)
}

fn deliver_command(connection: &Connection, message: &CommandMessage) {
    let handler: Option<CommandHandler> = connection.inner.borrow_mut().handlers.command.take();
    let mut handler = match handler {
        Some(handler) => handler,
        None => {
            debug!(command = %message.command.name, "No command handler registered");
            return;
        }
    };

    handler(connection, message);

    let mut inner = connection.inner.borrow_mut();
    if !inner.closed && inner.handlers.command.is_none() {
        inner.handlers.command = Some(handler);
    }
}

/// Response handler for the client's `connect` request
pub(crate) fn connect_response(connection: &Connection, response: CommandResponse) {
    if let CommandResponse::Error(command) = &response {
        let description = command
            .info_property("description")
            .or_else(|| command.info_property("code"))
            .unwrap_or("connect rejected")
            .to_string();

        warn!(description = %description, "Connect request was rejected");
        close(&connection.inner, Some(ConnectionError::ConnectRejected { description }));
        return;
    }

    let result = {
        let mut inner = connection.inner.borrow_mut();
        if inner.closed || inner.connected {
            return;
        }

        inner.connected = true;
        debug!(app = ?inner.target.as_ref().map(|x| &x.app), "Connect request accepted");
        match inner.renegotiate_chunk_size() {
            Ok(()) => Ok(inner.handlers.established.take()),
            Err(error) => Err(error),
        }
    };

    match result {
        Ok(Some(handler)) => handler(connection),
        Ok(None) => (),
        Err(error) => close(&connection.inner, Some(error)),
    }
}

impl ConnectionInner {
    fn process_step(&mut self, bytes: &[u8]) -> Result<Step, ConnectionError> {
        if self.handshake.state() != HandshakeState::HandshakeDone {
            return self.process_handshake(bytes);
        }

        match self.deserializer.read_chunk(bytes)? {
            ChunkReadResult::NeedMoreData => Ok(Step::NeedMoreData),
            ChunkReadResult::Chunk { consumed, message } => {
                let mut deliveries = Vec::new();
                if let Some(payload) = message {
                    self.handle_payload(payload, &mut deliveries)?;
                }

                Ok(Step::Consumed { consumed, deliveries })
            }
        }
    }

    fn process_handshake(&mut self, bytes: &[u8]) -> Result<Step, ConnectionError> {
        let previous_state = self.handshake.state();
        let progress = match self.handshake.process(bytes)? {
            Some(progress) => progress,
            None => return Ok(Step::NeedMoreData),
        };

        debug!(
            role = %self.role,
            from = %previous_state,
            to = %self.handshake.state(),
            "Handshake progressed"
        );

        if !progress.response.is_empty() {
            self.send_raw(&progress.response)?;
        }

        let mut deliveries = Vec::new();
        if progress.completed {
            self.handshake_completed(&mut deliveries)?;
        }

        Ok(Step::Consumed {
            consumed: progress.consumed,
            deliveries,
        })
    }

    fn handshake_completed(&mut self, deliveries: &mut Vec<Delivery>) -> Result<(), ConnectionError> {
        match self.role {
            ConnectionRole::Client => {
                let command_object = self.connect_command_object();
                self.send_request(
                    CONTROL_MESSAGE_STREAM_ID,
                    "connect",
                    command_object,
                    Vec::new(),
                    Box::new(connect_response),
                )?;
            }

            ConnectionRole::Server => {
                if let Some(handler) = self.handlers.established.take() {
                    deliveries.push(Delivery::Established(handler));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn renegotiate_chunk_size(&mut self) -> Result<(), ConnectionError> {
        let size = self.config.chunk_size;
        self.serializer.set_max_chunk_size(size)?;
        self.send_control(RtmpMessage::SetChunkSize { size })
    }

    fn handle_payload(&mut self, payload: MessagePayload, deliveries: &mut Vec<Delivery>) -> Result<(), ConnectionError> {
        let stream_id = payload.message_stream_id;
        let timestamp = payload.timestamp;
        trace!(
            type_id = payload.type_id,
            stream_id,
            timestamp,
            length = payload.data.len(),
            "Received message"
        );

        match payload.to_rtmp_message()? {
            RtmpMessage::SetChunkSize { size } => {
                if size == 0 {
                    return Err(ConnectionError::InvalidChunkSize);
                }

                debug!(size, "Peer changed its chunk size");
                self.deserializer.set_max_chunk_size(size as usize)?;
            }

            RtmpMessage::Abort { chunk_stream_id } => self.deserializer.abort(chunk_stream_id),

            RtmpMessage::Acknowledgement { sequence_number } => {
                trace!(sequence_number, "Received acknowledgement");
                self.stats.acknowledgements += 1;
            }

            RtmpMessage::WindowAcknowledgement { size } => {
                debug!(size, "Peer set window acknowledgement size");
                self.window_ack_size = size;
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                debug!(size, limit_type = ?limit_type, "Peer set bandwidth limit");
                let size = self.config.window_ack_size;
                self.send_control(RtmpMessage::WindowAcknowledgement { size })?;
            }

            RtmpMessage::UserControl(event) => self.handle_user_control(event, deliveries)?,

            RtmpMessage::AudioData { data } => match self.find_stream(stream_id) {
                Some(stream) => deliveries.push(Delivery::Audio(Rc::clone(stream), timestamp, data)),
                None => warn!(stream_id, "Audio received for unknown stream"),
            },

            RtmpMessage::VideoData { data } => match self.find_stream(stream_id) {
                Some(stream) => deliveries.push(Delivery::Video(Rc::clone(stream), timestamp, data)),
                None => warn!(stream_id, "Video received for unknown stream"),
            },

            RtmpMessage::Amf0Data { values } => {
                if stream_id == CONTROL_MESSAGE_STREAM_ID {
                    debug!("Dropping data message sent on stream 0");
                } else {
                    match self.find_stream(stream_id) {
                        Some(stream) => deliveries.push(Delivery::StreamData(Rc::clone(stream), values)),
                        None => warn!(stream_id, "Data message received for unknown stream"),
                    }
                }
            }

            RtmpMessage::Amf0Command(command) => self.handle_command(stream_id, command, deliveries),

            RtmpMessage::Unknown { type_id, .. } => {
                debug!(type_id, "Unhandled message type");
            }
        }

        Ok(())
    }

    fn handle_user_control(&mut self, event: UserControlEvent, deliveries: &mut Vec<Delivery>) -> Result<(), ConnectionError> {
        match event {
            UserControlEvent::StreamBegin { stream_id }
            | UserControlEvent::StreamEof { stream_id }
            | UserControlEvent::StreamIsRecorded { stream_id } => {
                if stream_id != CONTROL_MESSAGE_STREAM_ID {
                    match self.find_stream(stream_id) {
                        Some(stream) => deliveries.push(Delivery::StreamControl(Rc::clone(stream), event)),
                        None => warn!(stream_id, event = ?event, "Stream event for unknown stream"),
                    }
                }
            }

            UserControlEvent::PingRequest { timestamp } => {
                trace!(timestamp, "Received ping request");
                self.stats.pings += 1;
                self.send_control(RtmpMessage::UserControl(UserControlEvent::PingResponse { timestamp }))?;
            }

            other => trace!(event = ?other, "Ignoring user control event"),
        }

        Ok(())
    }

    fn handle_command(&mut self, stream_id: u32, command: Amf0Command, deliveries: &mut Vec<Delivery>) {
        if self.role == ConnectionRole::Server {
            deliveries.push(Delivery::Command(CommandMessage { stream_id, command }));
            return;
        }

        if command.is_named("_result") || command.is_named("_error") {
            let success = command.is_named("_result");
            match self.transactions.take(command.transaction_id) {
                Some((request, handler)) => {
                    debug!(request = %request, success, "Received response");
                    let response = if success {
                        CommandResponse::Result(command)
                    } else {
                        CommandResponse::Error(command)
                    };

                    deliveries.push(Delivery::Response(handler, response));
                }

                None => debug!(
                    transaction_id = command.transaction_id,
                    "Response for unknown transaction"
                ),
            }
        } else if command.is_named("onStatus") {
            debug!(stream_id, code = ?command.info_property("code"), "Received onStatus");
            if stream_id == CONTROL_MESSAGE_STREAM_ID {
                deliveries.push(Delivery::Command(CommandMessage { stream_id, command }));
            } else {
                match self.find_stream(stream_id) {
                    Some(stream) => deliveries.push(Delivery::StreamCommand(Rc::clone(stream), command)),
                    None => warn!(stream_id, "onStatus received for unknown stream"),
                }
            }
        } else {
            debug!(command = %command.name, stream_id, "Command not handled");
        }
    }
}

use crate::chunk_io::{ChunkDeserializationError, ChunkSerializationError};
use crate::connection::UriParseError;
use crate::handshake::HandshakeError;
use crate::messages::{MessageDeserializationError, MessageSerializationError};
use std::io;
use thiserror::Error;

/// Errors returned by connection and stream operations, or passed to the close handler when a
/// connection is torn down
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The URI passed to `connect` could not be parsed
    #[error("Invalid RTMP URI: {0}")]
    InvalidUri(#[from] UriParseError),

    /// Media and command payloads must contain at least one byte
    #[error("Cannot send an empty payload")]
    EmptyPayload,

    /// Play and publish requests need a stream name
    #[error("A stream name is required")]
    EmptyStreamName,

    /// Message stream 0 is the control stream and cannot be used for a media stream
    #[error("Stream id 0 is reserved for the connection itself")]
    ReservedStreamId,

    /// Stream ids must be unique within a connection
    #[error("Stream id {stream_id} is already in use on this connection")]
    StreamIdInUse { stream_id: u32 },

    /// The peer did not follow the handshake
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Encountered when an error occurs while deserializing the incoming byte data
    #[error("An error occurred deserializing incoming data: {0}")]
    ChunkDeserialization(#[from] ChunkDeserializationError),

    /// Encountered when an error occurs while serializing outbound messages
    #[error("An error occurred serializing outbound messages: {0}")]
    ChunkSerialization(#[from] ChunkSerializationError),

    /// Encountered when a message payload could not be decoded
    #[error("An error occurred while attempting to turn a message payload into an RTMP message: {0}")]
    MessageDeserialization(#[from] MessageDeserializationError),

    /// Encountered when a message could not be encoded
    #[error("An error occurred while attempting to turn an RTMP message into a message payload: {0}")]
    MessageSerialization(#[from] MessageSerializationError),

    /// The peer sent more bytes without completing a chunk than the connection is willing to hold
    #[error("Holding {buffered} unprocessed bytes would exceed the limit of {limit}")]
    BufferOverflow { buffered: usize, limit: usize },

    /// The peer sent a Set Chunk Size message with a size of zero
    #[error("The peer requested a chunk size of zero")]
    InvalidChunkSize,

    /// The server answered the `connect` request with `_error`
    #[error("The connect request was rejected: {description}")]
    ConnectRejected { description: String },

    /// The host name in the URI did not resolve to an address
    #[error("Could not resolve host {host}")]
    HostNotFound { host: String },

    /// The transport reported an error
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// The peer closed the transport
    #[error("The transport was closed by the peer")]
    TransportClosed,

    /// No transport is open, either because it is still being set up or because the
    /// connection has been closed
    #[error("The connection is not open")]
    NotConnected,

    /// The stream is no longer linked to an open connection
    #[error("The stream has been closed")]
    StreamClosed,
}

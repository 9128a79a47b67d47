use rml_amf0::Amf0DeserializationError;
use std::io;
use thiserror::Error;

/// Errors that can occur while decoding the payload of an RTMP message
#[derive(Debug, Error)]
pub enum MessageDeserializationError {
    /// The bytes or AMF0 values in the message were not laid out the way the message type
    /// requires.
    #[error("The message was not encoded in an expected format")]
    InvalidMessageFormat,

    /// Bytes that were expected to be AMF0 values could not be decoded
    #[error("The message did not contain valid Amf0 encoded values: {0}")]
    Amf0DeserializationError(#[from] Amf0DeserializationError),

    /// The payload ended before all fields of the message were read
    #[error("An IO error occurred while reading the input: {0}")]
    Io(#[from] io::Error),
}

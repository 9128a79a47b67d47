use rml_amf0::Amf0SerializationError;
use std::io;
use thiserror::Error;

/// Errors that can occur while encoding an RTMP message into a raw payload
#[derive(Debug, Error)]
pub enum MessageSerializationError {
    /// Set Chunk Size values must fit in 31 bits
    #[error("Cannot serialize a SetChunkSize message with a size of {size}, sizes must be below 2147483648")]
    InvalidChunkSize { size: u32 },

    /// The values provided could not be encoded as AMF0
    #[error("The values provided could not be serialized into valid AMF0 encoded data: {0}")]
    Amf0SerializationError(#[from] Amf0SerializationError),

    /// Failed to write to the output buffer
    #[error("An IO error occurred while writing the output: {0}")]
    Io(#[from] io::Error),
}

use std::io;
use thiserror::Error;

/// Errors that can occur while splitting an RTMP message into chunks
#[derive(Debug, Error)]
pub enum ChunkSerializationError {
    /// A message cannot be longer than 16777215 bytes, even when split across chunks
    #[error("The message has a length of {size} bytes, which is over the allowed size of 16777215 bytes")]
    MessageTooLong { size: usize },

    /// Chunk sizes must be between 1 and 2147483647
    #[error("An invalid chunk size of {attempted_chunk_size} was specified.  Chunk size must be between 1 and 2147483647")]
    InvalidMaxChunkSize { attempted_chunk_size: u32 },

    /// Chunk stream ids 0 and 1 are reserved and anything above 65599 cannot be encoded
    #[error("Chunk stream id {csid} cannot be encoded, only ids 2 through 65599 are allowed")]
    InvalidChunkStreamId { csid: u32 },

    /// An I/O error occurred while writing the output buffer
    #[error("{0}")]
    Io(#[from] io::Error),
}

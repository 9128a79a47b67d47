use std::io;
use thiserror::Error;

/// Errors that can occur while deserializing RTMP chunks
#[derive(Debug, Error)]
pub enum ChunkDeserializationError {
    /// Chunks with a non-zero header format reuse values from the previous chunk on the same chunk
    /// stream, so they cannot be the first chunk seen on that stream.
    #[error(
        "Received chunk with non-zero chunk type on csid {csid} prior to receiving a type 0 chunk"
    )]
    NoPreviousChunkOnStream { csid: u32 },

    /// The max chunk size must be between 1 and 2,147,483,647
    #[error("Requested an invalid max chunk size of {chunk_size}.  Chunk sizes must be between 1 and 2147483647")]
    InvalidMaxChunkSize { chunk_size: usize },

    /// An I/O error occurred while reading the input buffer
    #[error("{0}")]
    Io(#[from] io::Error),
}

//! Splitting RTMP messages into chunks and reassembling chunks back into messages.
//!
//! The serializer is driven by the caller: it is told which chunk stream and header format to
//! use for the first chunk of every message, and always uses type 3 headers for continuation
//! chunks.  The deserializer consumes at most one chunk per call and never consumes a partial
//! chunk, so callers can keep unread bytes around until more data arrives.

mod chunk_header;
mod deserialization_errors;
mod deserializer;
mod serialization_errors;
mod serializer;

pub use self::chunk_header::{ChunkFormat, OutboundHeader};
pub use self::deserialization_errors::ChunkDeserializationError;
pub use self::deserializer::{ChunkDeserializer, ChunkReadResult};
pub use self::serialization_errors::ChunkSerializationError;
pub use self::serializer::ChunkSerializer;

/// Chunk size both peers assume until a Set Chunk Size message says otherwise
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest chunk size that can be expressed in a Set Chunk Size message
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Largest message a chunk header can describe
pub const MAX_MESSAGE_LENGTH: usize = 0xFF_FFFF;

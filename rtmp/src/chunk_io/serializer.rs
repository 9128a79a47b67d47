use super::chunk_header::MAX_TIMESTAMP_FIELD;
use super::{ChunkFormat, ChunkSerializationError, OutboundHeader};
use super::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_MESSAGE_LENGTH};
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::io::Write;

/// Splits outbound RTMP messages into RTMP chunks.
///
/// The serializer only tracks the maximum chunk size.  Which chunk stream and header format a
/// message starts with is decided by the caller, so callers that use compressed header formats
/// are responsible for only doing so when the peer has the previous header for that chunk stream.
pub struct ChunkSerializer {
    max_chunk_size: u32,
}

impl ChunkSerializer {
    /// Creates a serializer that uses the protocol's default chunk size of 128 bytes
    pub fn new() -> ChunkSerializer {
        ChunkSerializer {
            max_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    /// Changes how many payload bytes are placed in each chunk.
    ///
    /// The peer must be told about the change with a Set Chunk Size message before any chunk
    /// using the new size is sent.
    pub fn set_max_chunk_size(&mut self, new_size: u32) -> Result<(), ChunkSerializationError> {
        if new_size == 0 || new_size > MAX_CHUNK_SIZE {
            return Err(ChunkSerializationError::InvalidMaxChunkSize {
                attempted_chunk_size: new_size,
            });
        }

        self.max_chunk_size = new_size;
        Ok(())
    }

    /// Turns a message into the bytes of one or more chunks.
    ///
    /// The first chunk uses the header format in `header`, every following chunk uses a type 3
    /// header on the same chunk stream.
    pub fn serialize(&self, header: &OutboundHeader, payload: &[u8]) -> Result<Vec<u8>, ChunkSerializationError> {
        if payload.len() > MAX_MESSAGE_LENGTH {
            return Err(ChunkSerializationError::MessageTooLong { size: payload.len() });
        }

        let chunk_size = self.max_chunk_size as usize;
        let chunk_count = std::cmp::max(1, (payload.len() + chunk_size - 1) / chunk_size);
        let mut bytes = Vec::with_capacity(payload.len() + 18 + chunk_count * 5);

        let extended_timestamp = extended_timestamp_for(header);
        write_basic_header(&mut bytes, header.format, header.chunk_stream_id)?;
        write_message_header(&mut bytes, header, payload.len() as u32)?;
        if let Some(value) = extended_timestamp {
            bytes.write_u32::<BigEndian>(value)?;
        }

        let mut chunks = payload.chunks(chunk_size);
        if let Some(first) = chunks.next() {
            bytes.write_all(first)?;
        }

        for chunk in chunks {
            write_basic_header(&mut bytes, ChunkFormat::Empty, header.chunk_stream_id)?;
            if let Some(value) = extended_timestamp {
                bytes.write_u32::<BigEndian>(value)?;
            }

            bytes.write_all(chunk)?;
        }

        Ok(bytes)
    }
}

impl Default for ChunkSerializer {
    fn default() -> Self {
        ChunkSerializer::new()
    }
}

fn write_basic_header(bytes: &mut Vec<u8>, format: ChunkFormat, csid: u32) -> Result<(), ChunkSerializationError> {
    let mask = format.basic_header_mask();
    match csid {
        2..=63 => bytes.write_u8(mask | csid as u8)?,
        64..=319 => {
            bytes.write_u8(mask)?;
            bytes.write_u8((csid - 64) as u8)?;
        }

        320..=65599 => {
            bytes.write_u8(mask | 1)?;
            bytes.write_u16::<LittleEndian>((csid - 64) as u16)?;
        }

        _ => return Err(ChunkSerializationError::InvalidChunkStreamId { csid }),
    }

    Ok(())
}

fn write_message_header(bytes: &mut Vec<u8>, header: &OutboundHeader, length: u32) -> Result<(), ChunkSerializationError> {
    match header.format {
        ChunkFormat::Full => {
            bytes.write_u24::<BigEndian>(std::cmp::min(header.timestamp, MAX_TIMESTAMP_FIELD))?;
            bytes.write_u24::<BigEndian>(length)?;
            bytes.write_u8(header.type_id)?;
            bytes.write_u32::<LittleEndian>(header.message_stream_id)?;
        }

        ChunkFormat::TimeDeltaWithoutMessageStreamId => {
            bytes.write_u24::<BigEndian>(std::cmp::min(header.timestamp_delta, MAX_TIMESTAMP_FIELD))?;
            bytes.write_u24::<BigEndian>(length)?;
            bytes.write_u8(header.type_id)?;
        }

        ChunkFormat::TimeDeltaOnly => {
            bytes.write_u24::<BigEndian>(std::cmp::min(header.timestamp_delta, MAX_TIMESTAMP_FIELD))?;
        }

        ChunkFormat::Empty => (),
    }

    Ok(())
}

fn extended_timestamp_for(header: &OutboundHeader) -> Option<u32> {
    let value = match header.format {
        ChunkFormat::Full => header.timestamp,
        ChunkFormat::TimeDeltaWithoutMessageStreamId | ChunkFormat::TimeDeltaOnly => header.timestamp_delta,
        ChunkFormat::Empty => return None,
    };

    if value >= MAX_TIMESTAMP_FIELD {
        Some(value)
    } else {
        None
    }
}

use super::chunk_header::{ChunkHeader, MAX_TIMESTAMP_FIELD};
use super::{ChunkDeserializationError, ChunkFormat, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::messages::MessagePayload;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::BytesMut;
use std::cmp::min;
use std::collections::HashMap;
use std::io::Cursor;
use tracing::trace;

/// Outcome of handing bytes to the `ChunkDeserializer`
#[derive(PartialEq, Debug)]
pub enum ChunkReadResult {
    /// The bytes do not contain a complete chunk.  Nothing was consumed and the same bytes
    /// (plus whatever arrives next) should be passed in again.
    NeedMoreData,

    /// One chunk was consumed from the front of the input.  If that chunk completed a message
    /// the reassembled message is returned with it.
    Chunk {
        consumed: usize,
        message: Option<MessagePayload>,
    },
}

struct ChunkStreamState {
    header: ChunkHeader,
    payload: BytesMut,
}

/// Reassembles RTMP chunks into RTMP message payloads.
///
/// Chunk headers may omit values that were present in the previous chunk on the same chunk
/// stream, so every byte received from a peer must go through the same deserializer instance.
///
/// Unlike a buffering reader, the deserializer never keeps bytes of an incomplete chunk.  It reads
/// at most one chunk per call and reports how many bytes it consumed, leaving the caller in charge
/// of keeping unread bytes until more data arrives.  Since a Set Chunk Size message changes how
/// the very next chunk must be read, callers should act on each completed message before reading
/// the next chunk.
///
/// ```
/// # use rml_netconn::chunk_io::{ChunkDeserializer, ChunkFormat, ChunkReadResult, ChunkSerializer, OutboundHeader};
/// let header = OutboundHeader {
///     format: ChunkFormat::Full,
///     chunk_stream_id: 5,
///     timestamp: 20,
///     timestamp_delta: 0,
///     type_id: 9,
///     message_stream_id: 1,
/// };
///
/// let bytes = ChunkSerializer::new().serialize(&header, &[1, 2, 3]).unwrap();
///
/// let mut deserializer = ChunkDeserializer::new();
/// assert_eq!(deserializer.read_chunk(&bytes[..4]).unwrap(), ChunkReadResult::NeedMoreData);
///
/// match deserializer.read_chunk(&bytes).unwrap() {
///     ChunkReadResult::Chunk { consumed, message: Some(payload) } => {
///         assert_eq!(consumed, bytes.len());
///         assert_eq!(payload.timestamp, 20);
///         assert_eq!(&payload.data[..], &[1, 2, 3]);
///     }
///
///     x => panic!("Unexpected result: {:?}", x),
/// }
/// ```
pub struct ChunkDeserializer {
    max_chunk_size: usize,
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkDeserializer {
    /// Creates a deserializer expecting chunks of the protocol's default 128 byte size
    pub fn new() -> ChunkDeserializer {
        ChunkDeserializer {
            max_chunk_size: DEFAULT_CHUNK_SIZE as usize,
            streams: HashMap::new(),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Changes the chunk size the peer is sending with, as announced by a Set Chunk Size message
    pub fn set_max_chunk_size(&mut self, new_size: usize) -> Result<(), ChunkDeserializationError> {
        if new_size == 0 || new_size > MAX_CHUNK_SIZE as usize {
            return Err(ChunkDeserializationError::InvalidMaxChunkSize { chunk_size: new_size });
        }

        self.max_chunk_size = new_size;
        Ok(())
    }

    /// Discards any partially received message on the specified chunk stream
    pub fn abort(&mut self, chunk_stream_id: u32) {
        if let Some(state) = self.streams.get_mut(&chunk_stream_id) {
            trace!(
                csid = chunk_stream_id,
                discarded = state.payload.len(),
                "Aborting partial message"
            );

            state.payload.clear();
        }
    }

    /// Attempts to read a single chunk from the front of `bytes`.
    pub fn read_chunk(&mut self, bytes: &[u8]) -> Result<ChunkReadResult, ChunkDeserializationError> {
        if bytes.is_empty() {
            return Ok(ChunkReadResult::NeedMoreData);
        }

        let format = ChunkFormat::from_basic_header(bytes[0]);
        let basic_header_size = match bytes[0] & 0b0011_1111 {
            0 => 2,
            1 => 3,
            _ => 1,
        };

        if bytes.len() < basic_header_size {
            return Ok(ChunkReadResult::NeedMoreData);
        }

        let mut cursor = Cursor::new(bytes);
        let csid = read_chunk_stream_id(&mut cursor)?;

        let previous = self.streams.get(&csid);
        let mut header = match (format, previous) {
            (ChunkFormat::Full, None) => ChunkHeader::new(),
            (_, Some(state)) => state.header.clone(),
            (_, None) => return Err(ChunkDeserializationError::NoPreviousChunkOnStream { csid }),
        };

        let partial_length = previous.map_or(0, |state| state.payload.len());
        let message_header_size = format.message_header_size();
        if bytes.len() < basic_header_size + message_header_size {
            return Ok(ChunkReadResult::NeedMoreData);
        }

        let timestamp_field = match format {
            ChunkFormat::Empty => None,
            _ => Some(cursor.read_u24::<BigEndian>()?),
        };

        match format {
            ChunkFormat::Full => {
                header.message_length = cursor.read_u24::<BigEndian>()?;
                header.type_id = cursor.read_u8()?;
                header.message_stream_id = cursor.read_u32::<LittleEndian>()?;
            }

            ChunkFormat::TimeDeltaWithoutMessageStreamId => {
                header.message_length = cursor.read_u24::<BigEndian>()?;
                header.type_id = cursor.read_u8()?;
            }

            _ => (),
        }

        let has_extended_timestamp = match timestamp_field {
            Some(value) => value == MAX_TIMESTAMP_FIELD,
            None => header.has_extended_timestamp,
        };

        let mut required = basic_header_size + message_header_size;
        if has_extended_timestamp {
            required += 4;
        }

        if bytes.len() < required {
            return Ok(ChunkReadResult::NeedMoreData);
        }

        let timestamp_value = if has_extended_timestamp {
            Some(cursor.read_u32::<BigEndian>()?)
        } else {
            timestamp_field
        };

        // A new header (anything but type 3) always starts a new message
        let continuing = format == ChunkFormat::Empty && partial_length > 0;
        let already_received = if continuing { partial_length } else { 0 };

        let message_length = header.message_length as usize;
        let remaining = message_length.saturating_sub(already_received);
        let chunk_payload_size = min(remaining, self.max_chunk_size);
        if bytes.len() < required + chunk_payload_size {
            return Ok(ChunkReadResult::NeedMoreData);
        }

        // The whole chunk is available, so state can now be committed
        match (format, timestamp_value) {
            (ChunkFormat::Full, Some(timestamp)) => {
                header.timestamp = timestamp;
                header.timestamp_delta = timestamp;
            }

            (ChunkFormat::Empty, _) => {
                if !continuing {
                    header.timestamp = header.timestamp.wrapping_add(header.timestamp_delta);
                }
            }

            (_, Some(delta)) => {
                header.timestamp_delta = delta;
                header.timestamp = header.timestamp.wrapping_add(delta);
            }

            (_, None) => (),
        }

        header.has_extended_timestamp = has_extended_timestamp;

        let state = self.streams.entry(csid).or_insert_with(|| ChunkStreamState {
            header: ChunkHeader::new(),
            payload: BytesMut::new(),
        });

        if !continuing && !state.payload.is_empty() {
            trace!(
                csid,
                discarded = state.payload.len(),
                "New message header arrived before previous message was complete"
            );

            state.payload.clear();
        }

        let payload_start = required;
        state
            .payload
            .extend_from_slice(&bytes[payload_start..payload_start + chunk_payload_size]);
        state.header = header;

        let message = if state.payload.len() >= message_length {
            Some(MessagePayload {
                timestamp: state.header.timestamp,
                type_id: state.header.type_id,
                message_stream_id: state.header.message_stream_id,
                data: state.payload.split().freeze(),
            })
        } else {
            None
        };

        Ok(ChunkReadResult::Chunk {
            consumed: payload_start + chunk_payload_size,
            message,
        })
    }
}

impl Default for ChunkDeserializer {
    fn default() -> Self {
        ChunkDeserializer::new()
    }
}

fn read_chunk_stream_id(cursor: &mut Cursor<&[u8]>) -> Result<u32, ChunkDeserializationError> {
    let first = cursor.read_u8()?;
    let csid = match first & 0b0011_1111 {
        0 => cursor.read_u8()? as u32 + 64,
        1 => cursor.read_u16::<LittleEndian>()? as u32 + 64,
        x => x as u32,
    };

    Ok(csid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_io::{ChunkSerializer, OutboundHeader};

    fn header(format: ChunkFormat, csid: u32, timestamp: u32, delta: u32) -> OutboundHeader {
        OutboundHeader {
            format,
            chunk_stream_id: csid,
            timestamp,
            timestamp_delta: delta,
            type_id: 8,
            message_stream_id: 1,
        }
    }

    /// Reads chunks until one completes a message, returning the message and total bytes consumed
    fn read_message(deserializer: &mut ChunkDeserializer, bytes: &[u8]) -> (MessagePayload, usize) {
        let mut offset = 0;
        loop {
            match deserializer.read_chunk(&bytes[offset..]).unwrap() {
                ChunkReadResult::Chunk { consumed, message } => {
                    offset += consumed;
                    if let Some(message) = message {
                        return (message, offset);
                    }
                }

                ChunkReadResult::NeedMoreData => panic!("Ran out of data at offset {}", offset),
            }
        }
    }

    #[test]
    fn can_read_single_chunk_message() {
        let bytes = ChunkSerializer::new()
            .serialize(&header(ChunkFormat::Full, 4, 55, 0), &[1, 2, 3])
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        let (message, consumed) = read_message(&mut deserializer, &bytes);

        assert_eq!(consumed, bytes.len(), "Unexpected consumed count");
        assert_eq!(message.timestamp, 55, "Unexpected timestamp");
        assert_eq!(message.type_id, 8, "Unexpected type id");
        assert_eq!(message.message_stream_id, 1, "Unexpected message stream id");
        assert_eq!(&message.data[..], &[1, 2, 3], "Unexpected payload");
    }

    #[test]
    fn can_read_message_split_across_chunks() {
        let payload: Vec<u8> = (0..300).map(|x| x as u8).collect();
        let bytes = ChunkSerializer::new()
            .serialize(&header(ChunkFormat::Full, 4, 10, 0), &payload)
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.read_chunk(&bytes).unwrap() {
            ChunkReadResult::Chunk { consumed: 140, message: None } => (),
            x => panic!("Expected first chunk without a message, instead got {:?}", x),
        }

        let (message, consumed) = read_message(&mut deserializer, &bytes[140..]);
        assert_eq!(consumed, bytes.len() - 140);
        assert_eq!(&message.data[..], &payload[..]);
    }

    #[test]
    fn partial_chunks_consume_nothing() {
        let bytes = ChunkSerializer::new()
            .serialize(&header(ChunkFormat::Full, 4, 10, 0), &[5_u8; 20])
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        for end in 0..bytes.len() {
            assert_eq!(
                deserializer.read_chunk(&bytes[..end]).unwrap(),
                ChunkReadResult::NeedMoreData,
                "Expected NeedMoreData for {} bytes",
                end
            );
        }

        let (message, _) = read_message(&mut deserializer, &bytes);
        assert_eq!(&message.data[..], &[5_u8; 20]);
    }

    #[test]
    fn non_type_0_chunk_on_new_stream_is_error() {
        let bytes = ChunkSerializer::new()
            .serialize(&header(ChunkFormat::TimeDeltaOnly, 4, 0, 10), &[1])
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.read_chunk(&bytes) {
            Err(ChunkDeserializationError::NoPreviousChunkOnStream { csid: 4 }) => (),
            x => panic!("Expected NoPreviousChunkOnStream error, instead got {:?}", x),
        }
    }

    #[test]
    fn compressed_headers_reuse_previous_values() {
        let serializer = ChunkSerializer::new();
        let mut bytes = serializer
            .serialize(&header(ChunkFormat::Full, 4, 100, 0), &[1, 2])
            .unwrap();

        bytes.extend(
            serializer
                .serialize(&header(ChunkFormat::TimeDeltaOnly, 4, 0, 20), &[3, 4])
                .unwrap(),
        );

        bytes.extend(
            serializer
                .serialize(&header(ChunkFormat::Empty, 4, 0, 0), &[5, 6])
                .unwrap(),
        );

        let mut deserializer = ChunkDeserializer::new();
        let (first, offset1) = read_message(&mut deserializer, &bytes);
        let (second, offset2) = read_message(&mut deserializer, &bytes[offset1..]);
        let (third, _) = read_message(&mut deserializer, &bytes[offset1 + offset2..]);

        assert_eq!(first.timestamp, 100);
        assert_eq!(second.timestamp, 120, "Delta should be added to previous timestamp");
        assert_eq!(third.timestamp, 140, "Type 3 should repeat previous delta");
        assert_eq!(third.type_id, 8);
        assert_eq!(third.message_stream_id, 1);
        assert_eq!(&third.data[..], &[5, 6]);
    }

    #[test]
    fn can_read_extended_timestamps() {
        let mut serializer = ChunkSerializer::new();
        serializer.set_max_chunk_size(2).unwrap();
        let bytes = serializer
            .serialize(&header(ChunkFormat::Full, 4, 0x0200_0000, 0), &[1, 2, 3, 4, 5])
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        deserializer.set_max_chunk_size(2).unwrap();
        let (message, consumed) = read_message(&mut deserializer, &bytes);

        assert_eq!(consumed, bytes.len());
        assert_eq!(message.timestamp, 0x0200_0000);
        assert_eq!(&message.data[..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn interleaved_chunk_streams_are_reassembled_separately() {
        let serializer = ChunkSerializer::new();
        let audio = serializer
            .serialize(&header(ChunkFormat::Full, 4, 1, 0), &[1_u8; 200])
            .unwrap();

        let video = serializer
            .serialize(&header(ChunkFormat::Full, 6, 2, 0), &[2_u8; 10])
            .unwrap();

        // First audio chunk, the full video message, then the rest of the audio message
        let mut bytes = audio[..140].to_vec();
        bytes.extend_from_slice(&video);
        bytes.extend_from_slice(&audio[140..]);

        let mut deserializer = ChunkDeserializer::new();
        let (first, offset) = read_message(&mut deserializer, &bytes);
        let (second, _) = read_message(&mut deserializer, &bytes[offset..]);

        assert_eq!(&first.data[..], &[2_u8; 10]);
        assert_eq!(&second.data[..], &[1_u8; 200][..]);
    }

    #[test]
    fn abort_discards_partial_message() {
        let serializer = ChunkSerializer::new();
        let partial = serializer
            .serialize(&header(ChunkFormat::Full, 4, 1, 0), &[1_u8; 200])
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.read_chunk(&partial).unwrap() {
            ChunkReadResult::Chunk { message: None, .. } => (),
            x => panic!("Expected partial chunk, instead got {:?}", x),
        }

        deserializer.abort(4);

        let next = serializer
            .serialize(&header(ChunkFormat::Empty, 4, 0, 0), &[9_u8; 200])
            .unwrap();

        // Type 3 after an abort starts a new message reusing the last header
        let (message, _) = read_message(&mut deserializer, &next);
        assert_eq!(&message.data[..], &[9_u8; 200][..]);
    }

    #[test]
    fn zero_length_message_completes_immediately() {
        let bytes = ChunkSerializer::new()
            .serialize(&header(ChunkFormat::Full, 4, 0, 0), &[])
            .unwrap();

        let mut deserializer = ChunkDeserializer::new();
        let (message, consumed) = read_message(&mut deserializer, &bytes);
        assert_eq!(consumed, 12);
        assert!(message.data.is_empty());
    }

    #[test]
    fn invalid_chunk_size_is_rejected() {
        let mut deserializer = ChunkDeserializer::new();
        assert!(deserializer.set_max_chunk_size(0).is_err());
        assert_eq!(deserializer.max_chunk_size(), 128);
    }
}

pub(crate) const MAX_TIMESTAMP_FIELD: u32 = 0xFF_FFFF;

/// The four chunk message header formats
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ChunkFormat {
    /// Type 0: timestamp, length, type id and message stream id
    Full,

    /// Type 1: timestamp delta, length and type id
    TimeDeltaWithoutMessageStreamId,

    /// Type 2: timestamp delta only
    TimeDeltaOnly,

    /// Type 3: no message header at all
    Empty,
}

impl ChunkFormat {
    pub(crate) fn from_basic_header(byte: u8) -> ChunkFormat {
        match byte >> 6 {
            0 => ChunkFormat::Full,
            1 => ChunkFormat::TimeDeltaWithoutMessageStreamId,
            2 => ChunkFormat::TimeDeltaOnly,
            _ => ChunkFormat::Empty,
        }
    }

    pub(crate) fn basic_header_mask(&self) -> u8 {
        match *self {
            ChunkFormat::Full => 0b0000_0000,
            ChunkFormat::TimeDeltaWithoutMessageStreamId => 0b0100_0000,
            ChunkFormat::TimeDeltaOnly => 0b1000_0000,
            ChunkFormat::Empty => 0b1100_0000,
        }
    }

    pub(crate) fn message_header_size(&self) -> usize {
        match *self {
            ChunkFormat::Full => 11,
            ChunkFormat::TimeDeltaWithoutMessageStreamId => 7,
            ChunkFormat::TimeDeltaOnly => 3,
            ChunkFormat::Empty => 0,
        }
    }
}

/// Header values used when chunking an outbound message.
///
/// `timestamp` is written for `Full` headers and `timestamp_delta` for the two delta formats.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OutboundHeader {
    pub format: ChunkFormat,
    pub chunk_stream_id: u32,
    pub timestamp: u32,
    pub timestamp_delta: u32,
    pub type_id: u8,
    pub message_stream_id: u32,
}

/// The last header seen on an inbound chunk stream
#[derive(Debug, Clone)]
pub(crate) struct ChunkHeader {
    pub timestamp: u32,
    pub timestamp_delta: u32,
    pub message_length: u32,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub has_extended_timestamp: bool,
}

impl ChunkHeader {
    pub fn new() -> ChunkHeader {
        ChunkHeader {
            timestamp: 0,
            timestamp_delta: 0,
            message_length: 0,
            type_id: 0,
            message_stream_id: 0,
            has_extended_timestamp: false,
        }
    }
}

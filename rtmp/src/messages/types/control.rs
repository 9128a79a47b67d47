//! Protocol control messages: set chunk size, abort, acknowledgement, window acknowledgement size
//! and set peer bandwidth.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError};
use crate::messages::{PeerBandwidthLimitType, RtmpMessage};

const CHUNK_SIZE_MASK: u32 = 0x7FFF_FFFF;

pub fn serialize_u32(value: u32) -> Result<Bytes, MessageSerializationError> {
    let mut bytes = Vec::with_capacity(4);
    bytes.write_u32::<BigEndian>(value)?;
    Ok(Bytes::from(bytes))
}

pub fn serialize_set_chunk_size(size: u32) -> Result<Bytes, MessageSerializationError> {
    if size > CHUNK_SIZE_MASK {
        return Err(MessageSerializationError::InvalidChunkSize { size });
    }

    serialize_u32(size)
}

pub fn serialize_set_peer_bandwidth(
    size: u32,
    limit_type: PeerBandwidthLimitType,
) -> Result<Bytes, MessageSerializationError> {
    let limit = match limit_type {
        PeerBandwidthLimitType::Hard => 0,
        PeerBandwidthLimitType::Soft => 1,
        PeerBandwidthLimitType::Dynamic => 2,
        PeerBandwidthLimitType::Unknown(value) => value,
    };

    let mut bytes = Vec::with_capacity(5);
    bytes.write_u32::<BigEndian>(size)?;
    bytes.write_u8(limit)?;
    Ok(Bytes::from(bytes))
}

/// The reserved high bit is ignored
pub fn deserialize_set_chunk_size(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let size = Cursor::new(data).read_u32::<BigEndian>()? & CHUNK_SIZE_MASK;
    Ok(RtmpMessage::SetChunkSize { size })
}

pub fn deserialize_abort(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let chunk_stream_id = Cursor::new(data).read_u32::<BigEndian>()?;
    Ok(RtmpMessage::Abort { chunk_stream_id })
}

pub fn deserialize_acknowledgement(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let sequence_number = Cursor::new(data).read_u32::<BigEndian>()?;
    Ok(RtmpMessage::Acknowledgement { sequence_number })
}

pub fn deserialize_window_acknowledgement(
    data: &[u8],
) -> Result<RtmpMessage, MessageDeserializationError> {
    let size = Cursor::new(data).read_u32::<BigEndian>()?;
    Ok(RtmpMessage::WindowAcknowledgement { size })
}

pub fn deserialize_set_peer_bandwidth(
    data: &[u8],
) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let size = cursor.read_u32::<BigEndian>()?;
    let limit_type = match cursor.read_u8()? {
        0 => PeerBandwidthLimitType::Hard,
        1 => PeerBandwidthLimitType::Soft,
        2 => PeerBandwidthLimitType::Dynamic,
        x => PeerBandwidthLimitType::Unknown(x),
    };

    Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
}

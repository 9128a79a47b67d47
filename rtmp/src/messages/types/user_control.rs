use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::Cursor;

use crate::messages::{MessageDeserializationError, MessageSerializationError};
use crate::messages::{RtmpMessage, UserControlEvent};

const STREAM_BEGIN: u16 = 0;
const STREAM_EOF: u16 = 1;
const STREAM_DRY: u16 = 2;
const SET_BUFFER_LENGTH: u16 = 3;
const STREAM_IS_RECORDED: u16 = 4;
const PING_REQUEST: u16 = 6;
const PING_RESPONSE: u16 = 7;

pub fn serialize(event: &UserControlEvent) -> Result<Bytes, MessageSerializationError> {
    let mut bytes = Vec::with_capacity(10);
    match *event {
        UserControlEvent::StreamBegin { stream_id } => {
            bytes.write_u16::<BigEndian>(STREAM_BEGIN)?;
            bytes.write_u32::<BigEndian>(stream_id)?;
        }

        UserControlEvent::StreamEof { stream_id } => {
            bytes.write_u16::<BigEndian>(STREAM_EOF)?;
            bytes.write_u32::<BigEndian>(stream_id)?;
        }

        UserControlEvent::StreamDry { stream_id } => {
            bytes.write_u16::<BigEndian>(STREAM_DRY)?;
            bytes.write_u32::<BigEndian>(stream_id)?;
        }

        UserControlEvent::SetBufferLength {
            stream_id,
            buffer_length,
        } => {
            bytes.write_u16::<BigEndian>(SET_BUFFER_LENGTH)?;
            bytes.write_u32::<BigEndian>(stream_id)?;
            bytes.write_u32::<BigEndian>(buffer_length)?;
        }

        UserControlEvent::StreamIsRecorded { stream_id } => {
            bytes.write_u16::<BigEndian>(STREAM_IS_RECORDED)?;
            bytes.write_u32::<BigEndian>(stream_id)?;
        }

        UserControlEvent::PingRequest { timestamp } => {
            bytes.write_u16::<BigEndian>(PING_REQUEST)?;
            bytes.write_u32::<BigEndian>(timestamp)?;
        }

        UserControlEvent::PingResponse { timestamp } => {
            bytes.write_u16::<BigEndian>(PING_RESPONSE)?;
            bytes.write_u32::<BigEndian>(timestamp)?;
        }

        UserControlEvent::Unknown { event_type } => {
            bytes.write_u16::<BigEndian>(event_type)?;
        }
    }

    Ok(Bytes::from(bytes))
}

pub fn deserialize(data: &[u8]) -> Result<RtmpMessage, MessageDeserializationError> {
    let mut cursor = Cursor::new(data);
    let event = match cursor.read_u16::<BigEndian>()? {
        STREAM_BEGIN => UserControlEvent::StreamBegin {
            stream_id: cursor.read_u32::<BigEndian>()?,
        },

        STREAM_EOF => UserControlEvent::StreamEof {
            stream_id: cursor.read_u32::<BigEndian>()?,
        },

        STREAM_DRY => UserControlEvent::StreamDry {
            stream_id: cursor.read_u32::<BigEndian>()?,
        },

        SET_BUFFER_LENGTH => UserControlEvent::SetBufferLength {
            stream_id: cursor.read_u32::<BigEndian>()?,
            buffer_length: cursor.read_u32::<BigEndian>()?,
        },

        STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded {
            stream_id: cursor.read_u32::<BigEndian>()?,
        },

        PING_REQUEST => UserControlEvent::PingRequest {
            timestamp: cursor.read_u32::<BigEndian>()?,
        },

        PING_RESPONSE => UserControlEvent::PingResponse {
            timestamp: cursor.read_u32::<BigEndian>()?,
        },

        event_type => UserControlEvent::Unknown { event_type },
    };

    Ok(RtmpMessage::UserControl(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_stream_begin() {
        let message = deserialize(&[0, 0, 0, 0, 0, 5]).unwrap();
        assert_eq!(
            message,
            RtmpMessage::UserControl(UserControlEvent::StreamBegin { stream_id: 5 })
        );
    }

    #[test]
    fn can_write_ping_response() {
        let bytes = serialize(&UserControlEvent::PingResponse { timestamp: 0x0102_0304 }).unwrap();
        assert_eq!(&bytes[..], &[0, 7, 1, 2, 3, 4]);
    }

    #[test]
    fn can_read_set_buffer_length() {
        let message = deserialize(&[0, 3, 0, 0, 0, 1, 0, 0, 0x0B, 0xB8]).unwrap();
        assert_eq!(
            message,
            RtmpMessage::UserControl(UserControlEvent::SetBufferLength {
                stream_id: 1,
                buffer_length: 3000,
            })
        );
    }

    #[test]
    fn unknown_event_types_are_not_errors() {
        let message = deserialize(&[0, 31, 1, 2]).unwrap();
        assert_eq!(
            message,
            RtmpMessage::UserControl(UserControlEvent::Unknown { event_type: 31 })
        );
    }

    #[test]
    fn truncated_ping_is_error() {
        assert!(deserialize(&[0, 6, 0, 0]).is_err());
        assert!(deserialize(&[0]).is_err());
    }
}

use super::types::{amf0_command, amf0_data, control, user_control};
use super::{MessageDeserializationError, MessageSerializationError, RtmpMessage};
use super::{
    ABORT_TYPE_ID, ACKNOWLEDGEMENT_TYPE_ID, AMF0_COMMAND_TYPE_ID, AMF0_DATA_TYPE_ID, AUDIO_TYPE_ID,
    SET_CHUNK_SIZE_TYPE_ID, SET_PEER_BANDWIDTH_TYPE_ID, USER_CONTROL_TYPE_ID, VIDEO_TYPE_ID,
    WINDOW_ACKNOWLEDGEMENT_TYPE_ID,
};
use bytes::Bytes;

/// A raw RTMP message, as reassembled from (or about to be split into) chunks
#[derive(PartialEq, Debug, Clone)]
pub struct MessagePayload {
    pub timestamp: u32,
    pub type_id: u8,
    pub message_stream_id: u32,
    pub data: Bytes,
}

impl MessagePayload {
    /// Decodes the payload based on its type id.  Unrecognized type ids decode to
    /// `RtmpMessage::Unknown` rather than failing.
    pub fn to_rtmp_message(&self) -> Result<RtmpMessage, MessageDeserializationError> {
        let data = &self.data[..];
        match self.type_id {
            SET_CHUNK_SIZE_TYPE_ID => control::deserialize_set_chunk_size(data),
            ABORT_TYPE_ID => control::deserialize_abort(data),
            ACKNOWLEDGEMENT_TYPE_ID => control::deserialize_acknowledgement(data),
            USER_CONTROL_TYPE_ID => user_control::deserialize(data),
            WINDOW_ACKNOWLEDGEMENT_TYPE_ID => control::deserialize_window_acknowledgement(data),
            SET_PEER_BANDWIDTH_TYPE_ID => control::deserialize_set_peer_bandwidth(data),
            AUDIO_TYPE_ID => Ok(RtmpMessage::AudioData {
                data: self.data.clone(),
            }),
            VIDEO_TYPE_ID => Ok(RtmpMessage::VideoData {
                data: self.data.clone(),
            }),
            AMF0_DATA_TYPE_ID => amf0_data::deserialize(data),
            AMF0_COMMAND_TYPE_ID => amf0_command::deserialize(data),
            _ => Ok(RtmpMessage::Unknown {
                type_id: self.type_id,
                data: self.data.clone(),
            }),
        }
    }

    pub fn from_rtmp_message(
        message: RtmpMessage,
        timestamp: u32,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageSerializationError> {
        let type_id = message.type_id();
        let data = match message {
            RtmpMessage::Unknown { data, .. } => data,
            RtmpMessage::AudioData { data } => data,
            RtmpMessage::VideoData { data } => data,
            RtmpMessage::Abort { chunk_stream_id } => control::serialize_u32(chunk_stream_id)?,
            RtmpMessage::Acknowledgement { sequence_number } => {
                control::serialize_u32(sequence_number)?
            }
            RtmpMessage::WindowAcknowledgement { size } => control::serialize_u32(size)?,
            RtmpMessage::SetChunkSize { size } => control::serialize_set_chunk_size(size)?,
            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                control::serialize_set_peer_bandwidth(size, limit_type)?
            }
            RtmpMessage::UserControl(event) => user_control::serialize(&event)?,
            RtmpMessage::Amf0Data { values } => amf0_data::serialize(&values)?,
            RtmpMessage::Amf0Command(command) => command.serialize()?,
        };

        Ok(MessagePayload {
            timestamp,
            type_id,
            message_stream_id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::UserControlEvent;

    #[test]
    fn unknown_type_ids_decode_as_unknown_messages() {
        let payload = MessagePayload {
            timestamp: 0,
            type_id: 99,
            message_stream_id: 0,
            data: Bytes::from(vec![1, 2, 3]),
        };

        match payload.to_rtmp_message().unwrap() {
            RtmpMessage::Unknown { type_id: 99, data } => assert_eq!(&data[..], &[1, 2, 3]),
            x => panic!("Expected unknown message, instead got {:?}", x),
        }
    }

    #[test]
    fn audio_payload_is_passed_through() {
        let message = RtmpMessage::AudioData {
            data: Bytes::from(vec![5, 6]),
        };

        let payload = message.into_message_payload(33, 4).unwrap();
        assert_eq!(payload.type_id, 8);
        assert_eq!(payload.timestamp, 33);
        assert_eq!(payload.message_stream_id, 4);
        assert_eq!(&payload.data[..], &[5, 6]);
    }

    #[test]
    fn ping_request_payload_decodes() {
        let payload = MessagePayload {
            timestamp: 0,
            type_id: 4,
            message_stream_id: 0,
            data: Bytes::from(vec![0, 6, 0, 0, 1, 0]),
        };

        assert_eq!(
            payload.to_rtmp_message().unwrap(),
            RtmpMessage::UserControl(UserControlEvent::PingRequest { timestamp: 256 })
        );
    }
}

/*!
RTMP message types, and conversion between messages and the raw payloads carried by chunks.

A `MessagePayload` is what the chunk layer produces and consumes: the raw bytes of a message plus
its type id, timestamp and message stream id.  An `RtmpMessage` is the decoded form, with one
variant per message type this library understands.
*/

mod deserialization_errors;
mod message_payload;
mod serialization_errors;
mod types;

pub use self::deserialization_errors::MessageDeserializationError;
pub use self::message_payload::MessagePayload;
pub use self::serialization_errors::MessageSerializationError;
pub use self::types::amf0_command::Amf0Command;

use bytes::Bytes;
use rml_amf0::Amf0Value;

pub const SET_CHUNK_SIZE_TYPE_ID: u8 = 1;
pub const ABORT_TYPE_ID: u8 = 2;
pub const ACKNOWLEDGEMENT_TYPE_ID: u8 = 3;
pub const USER_CONTROL_TYPE_ID: u8 = 4;
pub const WINDOW_ACKNOWLEDGEMENT_TYPE_ID: u8 = 5;
pub const SET_PEER_BANDWIDTH_TYPE_ID: u8 = 6;
pub const AUDIO_TYPE_ID: u8 = 8;
pub const VIDEO_TYPE_ID: u8 = 9;
pub const AMF0_DATA_TYPE_ID: u8 = 18;
pub const AMF0_COMMAND_TYPE_ID: u8 = 20;

/// The type of bandwidth limiting that is being requested.  The limit is advisory only.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PeerBandwidthLimitType {
    /// Peer should limit its output bandwidth to the indicated window size
    Hard,

    /// The peer should limit its output bandwidth to the window indicated or the limit
    /// already in effect, whichever is smaller.
    Soft,

    /// If we previously had a hard limit, this limit should be treated as hard.  Otherwise ignore.
    Dynamic,

    /// A limit type value that is not defined by the protocol
    Unknown(u8),
}

/// Events carried in User Control messages
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum UserControlEvent {
    /// A stream has become functional
    StreamBegin { stream_id: u32 },

    /// Playback of data on the stream is over
    StreamEof { stream_id: u32 },

    /// There is no more data on the stream
    StreamDry { stream_id: u32 },

    /// The buffer size (in milliseconds) the client is using for a stream
    SetBufferLength { stream_id: u32, buffer_length: u32 },

    /// The stream is a recorded stream
    StreamIsRecorded { stream_id: u32 },

    /// Sent to test whether the peer is reachable
    PingRequest { timestamp: u32 },

    /// Reply to a ping request, echoing its value
    PingResponse { timestamp: u32 },

    /// An event type this library does not know about.  Its data is not kept.
    Unknown { event_type: u16 },
}

/// All RTMP message types this library can encode and decode
#[derive(PartialEq, Debug, Clone)]
pub enum RtmpMessage {
    /// Message with a type id this library does not understand
    Unknown { type_id: u8, data: Bytes },

    /// Tells the peer to discard the partial message on the chunk stream
    Abort { chunk_stream_id: u32 },

    /// Confirms how many bytes have been received
    Acknowledgement { sequence_number: u32 },

    /// An AMF0 encoded command
    Amf0Command(Amf0Command),

    /// A list of AMF0 encoded values, such as stream metadata
    Amf0Data { values: Vec<Amf0Value> },

    /// Opaque audio payload
    AudioData { data: Bytes },

    /// The sender's maximum chunk size is changing
    SetChunkSize { size: u32 },

    /// Asks the peer to limit its output bandwidth
    SetPeerBandwidth {
        size: u32,
        limit_type: PeerBandwidthLimitType,
    },

    /// Stream or connection level event
    UserControl(UserControlEvent),

    /// Opaque video payload
    VideoData { data: Bytes },

    /// How many bytes the sender wants to receive between acknowledgements
    WindowAcknowledgement { size: u32 },
}

impl RtmpMessage {
    pub fn into_message_payload(
        self,
        timestamp: u32,
        message_stream_id: u32,
    ) -> Result<MessagePayload, MessageSerializationError> {
        MessagePayload::from_rtmp_message(self, timestamp, message_stream_id)
    }

    pub fn type_id(&self) -> u8 {
        match self {
            RtmpMessage::Unknown { type_id, .. } => *type_id,
            RtmpMessage::Abort { .. } => ABORT_TYPE_ID,
            RtmpMessage::Acknowledgement { .. } => ACKNOWLEDGEMENT_TYPE_ID,
            RtmpMessage::Amf0Command(_) => AMF0_COMMAND_TYPE_ID,
            RtmpMessage::Amf0Data { .. } => AMF0_DATA_TYPE_ID,
            RtmpMessage::AudioData { .. } => AUDIO_TYPE_ID,
            RtmpMessage::SetChunkSize { .. } => SET_CHUNK_SIZE_TYPE_ID,
            RtmpMessage::SetPeerBandwidth { .. } => SET_PEER_BANDWIDTH_TYPE_ID,
            RtmpMessage::UserControl(_) => USER_CONTROL_TYPE_ID,
            RtmpMessage::VideoData { .. } => VIDEO_TYPE_ID,
            RtmpMessage::WindowAcknowledgement { .. } => WINDOW_ACKNOWLEDGEMENT_TYPE_ID,
        }
    }
}

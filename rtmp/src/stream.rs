/*!
NetStreams: logical media streams multiplexed over a connection.

A `Stream` is created by `Connection::play()` or `Connection::publish()` and stays linked to its
connection until the handle is dropped or closed, or the connection closes.  Inbound audio,
video, `onStatus` commands, data messages and stream events addressed to the stream's message
stream id are handed to the handlers registered on it.
*/

use crate::chunk_io::{ChunkFormat, OutboundHeader};
use crate::connection::{Connection, ConnectionError, ConnectionInner};
use crate::messages::{Amf0Command, RtmpMessage, UserControlEvent};
use crate::messages::{AUDIO_TYPE_ID, VIDEO_TYPE_ID};
use bytes::Bytes;
use rml_amf0::Amf0Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Receives audio payloads and their timestamps
pub type AudioHandler = Box<dyn FnMut(u32, Bytes)>;

/// Receives video payloads and their timestamps
pub type VideoHandler = Box<dyn FnMut(u32, Bytes)>;

/// Receives `onStatus` commands sent on the stream
pub type StreamCommandHandler = Box<dyn FnMut(&Amf0Command)>;

/// Receives AMF0 data messages (such as `onMetaData`) sent on the stream
pub type DataHandler = Box<dyn FnMut(&[Amf0Value])>;

/// Receives Stream Begin, Stream EOF and Stream Is Recorded events
pub type ControlHandler = Box<dyn FnMut(&UserControlEvent)>;

#[derive(Default)]
struct StreamHandlers {
    audio: Option<AudioHandler>,
    video: Option<VideoHandler>,
    command: Option<StreamCommandHandler>,
    data: Option<DataHandler>,
    control: Option<ControlHandler>,
}

fn audio_slot(handlers: &mut StreamHandlers) -> &mut Option<AudioHandler> {
    &mut handlers.audio
}

fn video_slot(handlers: &mut StreamHandlers) -> &mut Option<VideoHandler> {
    &mut handlers.video
}

fn command_slot(handlers: &mut StreamHandlers) -> &mut Option<StreamCommandHandler> {
    &mut handlers.command
}

fn data_slot(handlers: &mut StreamHandlers) -> &mut Option<DataHandler> {
    &mut handlers.data
}

fn control_slot(handlers: &mut StreamHandlers) -> &mut Option<ControlHandler> {
    &mut handlers.control
}

/// Stream state shared between the user's `Stream` handle and the connection's stream list
pub(crate) struct StreamShared {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) chunk_stream_id: u32,
    handlers: RefCell<StreamHandlers>,
}

impl StreamShared {
    /// Takes the handler out of its slot while it runs, so the handler itself may replace any of
    /// the stream's handlers.  It is put back unless a replacement was registered meanwhile.
    fn invoke<H>(&self, slot: fn(&mut StreamHandlers) -> &mut Option<H>, call: impl FnOnce(&mut H)) {
        let handler = slot(&mut *self.handlers.borrow_mut()).take();
        if let Some(mut handler) = handler {
            call(&mut handler);

            let mut handlers = self.handlers.borrow_mut();
            let current = slot(&mut *handlers);
            if current.is_none() {
                *current = Some(handler);
            }
        }
    }

    pub(crate) fn deliver_audio(&self, timestamp: u32, data: Bytes) {
        self.invoke(audio_slot, |handler| handler(timestamp, data));
    }

    pub(crate) fn deliver_video(&self, timestamp: u32, data: Bytes) {
        self.invoke(video_slot, |handler| handler(timestamp, data));
    }

    pub(crate) fn deliver_command(&self, command: &Amf0Command) {
        self.invoke(command_slot, |handler| handler(command));
    }

    pub(crate) fn deliver_data(&self, values: &[Amf0Value]) {
        self.invoke(data_slot, |handler| handler(values));
    }

    pub(crate) fn deliver_control(&self, event: &UserControlEvent) {
        self.invoke(control_slot, |handler| handler(event));
    }
}

/// Handle to a NetStream.  Dropping it unlinks the stream from its connection.
pub struct Stream {
    shared: Rc<StreamShared>,
    connection: Weak<RefCell<ConnectionInner>>,
}

impl Stream {
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The chunk stream this stream's media is sent on
    pub fn chunk_stream_id(&self) -> u32 {
        self.shared.chunk_stream_id
    }

    /// Whether the stream is still linked into an open connection
    pub fn is_active(&self) -> bool {
        let inner = match self.connection.upgrade() {
            Some(inner) => inner,
            None => return false,
        };

        let state = inner.borrow();
        let linked = state.streams.iter().any(|x| Rc::ptr_eq(x, &self.shared));
        !state.closed && linked
    }

    pub fn send_audio(&self, timestamp: u32, payload: &[u8]) -> Result<(), ConnectionError> {
        self.send_media(AUDIO_TYPE_ID, timestamp, payload)
    }

    /// Sends a video payload with a timestamp of 0
    pub fn send_video(&self, payload: &[u8]) -> Result<(), ConnectionError> {
        self.send_video_with_timestamp(0, payload)
    }

    pub fn send_video_with_timestamp(&self, timestamp: u32, payload: &[u8]) -> Result<(), ConnectionError> {
        self.send_media(VIDEO_TYPE_ID, timestamp, payload)
    }

    /// Sends an AMF0 data message, such as `@setDataFrame`, on this stream
    pub fn send_data(&self, values: Vec<Amf0Value>) -> Result<(), ConnectionError> {
        if values.is_empty() {
            return Err(ConnectionError::EmptyPayload);
        }

        let payload = RtmpMessage::Amf0Data { values }.into_message_payload(0, self.shared.id)?;
        self.send_payload(payload.type_id, 0, &payload.data)
    }

    pub fn set_audio_handler(&self, handler: impl FnMut(u32, Bytes) + 'static) {
        self.shared.handlers.borrow_mut().audio = Some(Box::new(handler));
    }

    pub fn set_video_handler(&self, handler: impl FnMut(u32, Bytes) + 'static) {
        self.shared.handlers.borrow_mut().video = Some(Box::new(handler));
    }

    pub fn set_command_handler(&self, handler: impl FnMut(&Amf0Command) + 'static) {
        self.shared.handlers.borrow_mut().command = Some(Box::new(handler));
    }

    pub fn set_data_handler(&self, handler: impl FnMut(&[Amf0Value]) + 'static) {
        self.shared.handlers.borrow_mut().data = Some(Box::new(handler));
    }

    pub fn set_control_handler(&self, handler: impl FnMut(&UserControlEvent) + 'static) {
        self.shared.handlers.borrow_mut().control = Some(Box::new(handler));
    }

    /// Unlinks the stream from its connection.  No message is sent to the peer.
    pub fn close(self) {}

    fn send_media(&self, type_id: u8, timestamp: u32, payload: &[u8]) -> Result<(), ConnectionError> {
        if payload.is_empty() {
            return Err(ConnectionError::EmptyPayload);
        }

        self.send_payload(type_id, timestamp, payload)
    }

    fn send_payload(&self, type_id: u8, timestamp: u32, payload: &[u8]) -> Result<(), ConnectionError> {
        let inner = self.connection.upgrade().ok_or(ConnectionError::StreamClosed)?;
        let mut inner = inner.borrow_mut();
        if !inner.streams.iter().any(|x| Rc::ptr_eq(x, &self.shared)) {
            return Err(ConnectionError::StreamClosed);
        }

        let header = OutboundHeader {
            format: ChunkFormat::Full,
            chunk_stream_id: self.shared.chunk_stream_id,
            timestamp,
            timestamp_delta: 0,
            type_id,
            message_stream_id: self.shared.id,
        };

        inner.send_message(&header, payload)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Some(inner) = self.connection.upgrade() {
            if let Ok(mut inner) = inner.try_borrow_mut() {
                inner.streams.retain(|x| !Rc::ptr_eq(x, &self.shared));
            }
        }
    }
}

impl Connection {
    /// Starts playback of `name` on message stream `stream_id`.
    ///
    /// The `play` command expects no response, so success only means the command was sent.
    /// Progress is reported through `onStatus` commands on the stream's command handler.
    pub fn play<A, V>(&self, name: &str, stream_id: u32, on_audio: A, on_video: V) -> Result<Stream, ConnectionError>
    where
        A: FnMut(u32, Bytes) + 'static,
        V: FnMut(u32, Bytes) + 'static,
    {
        let handlers = StreamHandlers {
            audio: Some(Box::new(on_audio)),
            video: Some(Box::new(on_video)),
            ..StreamHandlers::default()
        };

        let arguments = vec![
            Amf0Value::Utf8String(name.to_string()),
            Amf0Value::Number(-2000.0),
        ];

        self.open_stream(name, stream_id, "play", arguments, handlers)
    }

    /// Starts publishing live media as `name` on message stream `stream_id`
    pub fn publish(&self, name: &str, stream_id: u32) -> Result<Stream, ConnectionError> {
        let arguments = vec![
            Amf0Value::Utf8String(name.to_string()),
            Amf0Value::Utf8String("live".to_string()),
        ];

        self.open_stream(name, stream_id, "publish", arguments, StreamHandlers::default())
    }

    fn open_stream(
        &self,
        name: &str,
        stream_id: u32,
        command_name: &str,
        arguments: Vec<Amf0Value>,
        handlers: StreamHandlers,
    ) -> Result<Stream, ConnectionError> {
        if name.is_empty() {
            return Err(ConnectionError::EmptyStreamName);
        }

        if stream_id == 0 {
            return Err(ConnectionError::ReservedStreamId);
        }

        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(ConnectionError::NotConnected);
        }

        if inner.find_stream(stream_id).is_some() {
            return Err(ConnectionError::StreamIdInUse { stream_id });
        }

        let shared = Rc::new(StreamShared {
            id: stream_id,
            name: name.to_string(),
            chunk_stream_id: inner.assign_chunk_id(),
            handlers: RefCell::new(handlers),
        });

        inner.streams.push(Rc::clone(&shared));

        let command = Amf0Command::new(command_name, 0.0, Amf0Value::Null, arguments);
        if let Err(error) = inner.send_command(stream_id, &command) {
            inner.streams.retain(|x| !Rc::ptr_eq(x, &shared));
            return Err(error);
        }

        debug!(
            command = command_name,
            stream = name,
            stream_id,
            chunk_stream_id = shared.chunk_stream_id,
            "Stream opened"
        );

        Ok(Stream {
            shared,
            connection: Rc::downgrade(&self.inner),
        })
    }
}

//! In-memory transports and a scripted peer for exercising connections without sockets.

#[macro_use]
mod assert_vec_contains_macro;

use crate::chunk_io::{ChunkDeserializer, ChunkFormat, ChunkReadResult, ChunkSerializer, OutboundHeader};
use crate::handshake::HANDSHAKE_PACKET_SIZE;
use crate::messages::{Amf0Command, MessagePayload, RtmpMessage};
use crate::transport::{Listener, Network, PendingQuery, ResolveHandler, Transport, TransportEvents};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::{Cell, RefCell};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(42)
}

/// Everything the connection did to its transport
#[derive(Default)]
pub struct TransportLog {
    pub sent: Vec<u8>,
    pub fail_sends: bool,
    pub close_count: usize,
}

pub struct MockTransport {
    log: Rc<RefCell<TransportLog>>,
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.fail_sends {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "send failure requested"));
        }

        log.sent.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.log.borrow_mut().close_count += 1;
    }
}

struct MockQuery {
    cancelled: Rc<Cell<bool>>,
}

impl PendingQuery for MockQuery {
    fn cancel(&mut self) {
        self.cancelled.set(true);
    }
}

/// Network and listener whose transports write into a shared `TransportLog`.  Name resolutions
/// stay pending until the test completes them.
#[derive(Default)]
pub struct MockNetwork {
    pub log: Rc<RefCell<TransportLog>>,
    pub opened: RefCell<Vec<SocketAddr>>,
    pub resolved_hosts: RefCell<Vec<String>>,
    pub query_cancelled: Rc<Cell<bool>>,
    pub fail_open: Cell<bool>,
    events: RefCell<Option<TransportEvents>>,
    resolves: RefCell<Vec<ResolveHandler>>,
}

impl MockNetwork {
    pub fn new() -> Rc<MockNetwork> {
        Rc::new(MockNetwork::default())
    }

    /// The events handle of the most recently opened or accepted transport
    pub fn events(&self) -> TransportEvents {
        match self.events.borrow().as_ref() {
            Some(events) => events.clone(),
            None => panic!("No transport was opened"),
        }
    }

    pub fn complete_resolve(&self, result: io::Result<Ipv4Addr>) {
        let handler = self.resolves.borrow_mut().remove(0);
        handler(result);
    }

    pub fn sent_bytes(&self) -> Vec<u8> {
        self.log.borrow().sent.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.log.borrow_mut().fail_sends = fail;
    }

    pub fn close_count(&self) -> usize {
        self.log.borrow().close_count
    }

    fn new_transport(&self, events: TransportEvents) -> Box<dyn Transport> {
        *self.events.borrow_mut() = Some(events);
        Box::new(MockTransport {
            log: Rc::clone(&self.log),
        })
    }
}

impl Network for MockNetwork {
    fn resolve(&self, host: &str, handler: ResolveHandler) -> io::Result<Box<dyn PendingQuery>> {
        self.resolved_hosts.borrow_mut().push(host.to_string());
        self.resolves.borrow_mut().push(handler);
        Ok(Box::new(MockQuery {
            cancelled: Rc::clone(&self.query_cancelled),
        }))
    }

    fn open(&self, address: SocketAddr, events: TransportEvents) -> io::Result<Box<dyn Transport>> {
        if self.fail_open.get() {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "open failure requested"));
        }

        self.opened.borrow_mut().push(address);
        Ok(self.new_transport(events))
    }
}

impl Listener for MockNetwork {
    fn accept(&self, events: TransportEvents) -> io::Result<Box<dyn Transport>> {
        Ok(self.new_transport(events))
    }
}

/// The far side of a connection under test.  Encodes messages the way a real peer would and
/// decodes whatever the connection sent after the handshake.
pub struct Peer {
    serializer: ChunkSerializer,
    deserializer: ChunkDeserializer,
    read_offset: usize,
}

impl Peer {
    /// A peer that already went through the handshake, with `handshake_bytes` being how many
    /// bytes the connection sent during it
    pub fn new(handshake_bytes: usize) -> Peer {
        Peer {
            serializer: ChunkSerializer::new(),
            deserializer: ChunkDeserializer::new(),
            read_offset: handshake_bytes,
        }
    }

    /// Bytes the client sends during the handshake (C0, C1 and C2)
    pub fn client_handshake_length() -> usize {
        1 + HANDSHAKE_PACKET_SIZE * 2
    }

    /// Bytes the server sends during the handshake (S0, S1 and S2)
    pub fn server_handshake_length() -> usize {
        1 + HANDSHAKE_PACKET_SIZE * 2
    }

    /// Decodes every complete message sent since the last call, following Set Chunk Size
    /// messages the connection sends along the way
    pub fn read_messages(&mut self, sent: &[u8]) -> Vec<MessagePayload> {
        let mut messages = Vec::new();
        loop {
            let result = match self.deserializer.read_chunk(&sent[self.read_offset..]) {
                Ok(result) => result,
                Err(error) => panic!("Connection sent an undecodable chunk: {}", error),
            };

            match result {
                ChunkReadResult::NeedMoreData => break,
                ChunkReadResult::Chunk { consumed, message } => {
                    self.read_offset += consumed;
                    if let Some(payload) = message {
                        if let Ok(RtmpMessage::SetChunkSize { size }) = payload.to_rtmp_message() {
                            self.deserializer.set_max_chunk_size(size as usize).unwrap();
                        }

                        messages.push(payload);
                    }
                }
            }
        }

        messages
    }

    /// Same as `read_messages()`, decoded into RTMP messages
    pub fn read_rtmp_messages(&mut self, sent: &[u8]) -> Vec<(MessagePayload, RtmpMessage)> {
        self.read_messages(sent)
            .into_iter()
            .map(|payload| {
                let message = payload.to_rtmp_message().unwrap();
                (payload, message)
            })
            .collect()
    }

    pub fn set_chunk_size(&mut self, size: u32) {
        self.serializer.set_max_chunk_size(size).unwrap();
    }

    /// Encodes a message the way the peer would send it
    pub fn encode(&self, chunk_stream_id: u32, stream_id: u32, timestamp: u32, message: RtmpMessage) -> Vec<u8> {
        let payload = message.into_message_payload(timestamp, stream_id).unwrap();
        let header = OutboundHeader {
            format: ChunkFormat::Full,
            chunk_stream_id,
            timestamp,
            timestamp_delta: 0,
            type_id: payload.type_id,
            message_stream_id: stream_id,
        };

        self.serializer.serialize(&header, &payload.data).unwrap()
    }

    pub fn encode_control(&self, message: RtmpMessage) -> Vec<u8> {
        self.encode(2, 0, 0, message)
    }

    pub fn encode_command(&self, stream_id: u32, command: Amf0Command) -> Vec<u8> {
        self.encode(3, stream_id, 0, RtmpMessage::Amf0Command(command))
    }
}

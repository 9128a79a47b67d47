//! The plain RTMP handshake (C0/C1/C2 and S0/S1/S2) that precedes all other traffic.
//!
//! The handshake engine does not perform any I/O.  Bytes that have been received from the peer
//! are handed to `Handshake::process()`, which either reports that it needs more bytes (without
//! consuming anything) or consumes exactly one handshake packet and returns the bytes that should
//! be sent back to the peer.
//!
//! # Examples
//!
//! ```
//! use rml_netconn::handshake::{Handshake, HandshakeState, Nonce, ConnectionRole};
//!
//! let mut rng = rand::thread_rng();
//! let mut client = Handshake::new(ConnectionRole::Client, Nonce::generate(&mut rng));
//! let mut server = Handshake::new(ConnectionRole::Server, Nonce::generate(&mut rng));
//!
//! let c0_and_c1 = client.start().unwrap();
//! let s0_and_s1 = server.process(&c0_and_c1[..1]).unwrap().unwrap().response;
//! let s2 = server.process(&c0_and_c1[1..]).unwrap().unwrap().response;
//!
//! let c2 = client.process(&s0_and_s1).unwrap().unwrap().response;
//! client.process(&s2).unwrap();
//! server.process(&c2).unwrap();
//!
//! assert_eq!(client.state(), HandshakeState::HandshakeDone);
//! assert_eq!(server.state(), HandshakeState::HandshakeDone);
//! ```

mod errors;

pub use self::errors::HandshakeError;

use rand::RngCore;
use std::fmt;

/// The only RTMP version this crate speaks (no encryption, no RTMPE)
pub const RTMP_VERSION: u8 = 3;

/// Size of the C1/S1/C2/S2 packets
pub const HANDSHAKE_PACKET_SIZE: usize = 1536;

const NONCE_VERSION_OFFSET: usize = 4;
const NONCE_RANDOM_OFFSET: usize = 8;

/// Which side of the connection we are
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ConnectionRole {
    Client,
    Server,
}

impl fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConnectionRole::Client => write!(f, "Client"),
            ConnectionRole::Server => write!(f, "Server"),
        }
    }
}

/// Handshake states.  A handshake only ever moves forward through these, in order.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy)]
pub enum HandshakeState {
    Uninitialized,
    VersionSent,
    AckSent,
    HandshakeDone,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            HandshakeState::Uninitialized => "Uninitialized",
            HandshakeState::VersionSent => "Version Sent",
            HandshakeState::AckSent => "Ack Sent",
            HandshakeState::HandshakeDone => "Handshake Done",
        };

        write!(f, "{}", name)
    }
}

/// The 1536 byte block we send as C1 (or S1).
///
/// The first four bytes are a zero time field, bytes 4 through 6 carry our major, minor and
/// patch version and everything from byte 8 onward is random.
#[derive(Clone)]
pub struct Nonce {
    bytes: [u8; HANDSHAKE_PACKET_SIZE],
}

impl Nonce {
    /// Creates a nonce whose random section is filled from the provided random source
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Nonce {
        let mut bytes = [0_u8; HANDSHAKE_PACKET_SIZE];
        bytes[NONCE_VERSION_OFFSET..NONCE_VERSION_OFFSET + 3].copy_from_slice(&version_triplet());
        rng.fill_bytes(&mut bytes[NONCE_RANDOM_OFFSET..]);

        Nonce { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// The version triplet carried by this nonce
    pub fn version(&self) -> (u8, u8, u8) {
        version_of(&self.bytes[..])
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (major, minor, patch) = self.version();
        write!(f, "Nonce {{ version: {}.{}.{} }}", major, minor, patch)
    }
}

/// The result of successfully consuming one handshake packet
#[derive(Debug, PartialEq)]
pub struct HandshakeProgress {
    /// How many of the input bytes made up the packet
    pub consumed: usize,

    /// Bytes that must be sent to the peer (may be empty)
    pub response: Vec<u8>,

    /// True once the handshake has reached `HandshakeDone`
    pub completed: bool,
}

/// Drives one side of the handshake.
pub struct Handshake {
    role: ConnectionRole,
    state: HandshakeState,
    nonce: Nonce,
    peer_version: Option<(u8, u8, u8)>,
}

impl Handshake {
    pub fn new(role: ConnectionRole, nonce: Nonce) -> Handshake {
        Handshake {
            role,
            state: HandshakeState::Uninitialized,
            nonce,
            peer_version: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// The version triplet the peer advertised in its C1/S1, once received
    pub fn peer_version(&self) -> Option<(u8, u8, u8)> {
        self.peer_version
    }

    /// Generates our version byte followed by our nonce and moves to `VersionSent`.
    ///
    /// Clients call this when the transport is established.  Servers never need to call this
    /// directly, as the S0 and S1 packets are produced in response to the client's C0.
    pub fn start(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.state != HandshakeState::Uninitialized {
            return Err(HandshakeError::AlreadyStarted { state: self.state });
        }

        self.state = HandshakeState::VersionSent;
        Ok(self.version_and_nonce())
    }

    /// Attempts to consume the next handshake packet from the start of `input`.
    ///
    /// `Ok(None)` means `input` does not yet hold the complete packet and nothing was consumed.
    pub fn process(&mut self, input: &[u8]) -> Result<Option<HandshakeProgress>, HandshakeError> {
        match (self.role, self.state) {
            (ConnectionRole::Client, HandshakeState::VersionSent) => self.read_version_and_nonce(input),
            (ConnectionRole::Server, HandshakeState::Uninitialized) => self.read_version(input),
            (ConnectionRole::Server, HandshakeState::VersionSent) => self.read_nonce(input),
            (_, HandshakeState::AckSent) => self.read_ack(input),
            (_, state) => Err(HandshakeError::UnexpectedData { state }),
        }
    }

    fn version_and_nonce(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + HANDSHAKE_PACKET_SIZE);
        bytes.push(RTMP_VERSION);
        bytes.extend_from_slice(self.nonce.as_bytes());
        bytes
    }

    // S0 + S1, which the client echoes back as C2
    fn read_version_and_nonce(&mut self, input: &[u8]) -> Result<Option<HandshakeProgress>, HandshakeError> {
        if input.len() < 1 + HANDSHAKE_PACKET_SIZE {
            return Ok(None);
        }

        check_version(input[0])?;

        let peer_nonce = &input[1..1 + HANDSHAKE_PACKET_SIZE];
        self.peer_version = Some(version_of(peer_nonce));
        self.state = HandshakeState::AckSent;

        Ok(Some(HandshakeProgress {
            consumed: 1 + HANDSHAKE_PACKET_SIZE,
            response: peer_nonce.to_vec(),
            completed: false,
        }))
    }

    // C0, answered with S0 + S1
    fn read_version(&mut self, input: &[u8]) -> Result<Option<HandshakeProgress>, HandshakeError> {
        if input.is_empty() {
            return Ok(None);
        }

        check_version(input[0])?;

        let response = self.start()?;
        Ok(Some(HandshakeProgress {
            consumed: 1,
            response,
            completed: false,
        }))
    }

    // C1, echoed back as S2
    fn read_nonce(&mut self, input: &[u8]) -> Result<Option<HandshakeProgress>, HandshakeError> {
        if input.len() < HANDSHAKE_PACKET_SIZE {
            return Ok(None);
        }

        let peer_nonce = &input[..HANDSHAKE_PACKET_SIZE];
        self.peer_version = Some(version_of(peer_nonce));
        self.state = HandshakeState::AckSent;

        Ok(Some(HandshakeProgress {
            consumed: HANDSHAKE_PACKET_SIZE,
            response: peer_nonce.to_vec(),
            completed: false,
        }))
    }

    // S2 or C2
    fn read_ack(&mut self, input: &[u8]) -> Result<Option<HandshakeProgress>, HandshakeError> {
        if input.len() < HANDSHAKE_PACKET_SIZE {
            return Ok(None);
        }

        self.state = HandshakeState::HandshakeDone;
        Ok(Some(HandshakeProgress {
            consumed: HANDSHAKE_PACKET_SIZE,
            response: Vec::new(),
            completed: true,
        }))
    }
}

fn check_version(version: u8) -> Result<(), HandshakeError> {
    if version != RTMP_VERSION {
        return Err(HandshakeError::BadVersionId { version });
    }

    Ok(())
}

fn version_of(block: &[u8]) -> (u8, u8, u8) {
    (
        block[NONCE_VERSION_OFFSET],
        block[NONCE_VERSION_OFFSET + 1],
        block[NONCE_VERSION_OFFSET + 2],
    )
}

fn version_triplet() -> [u8; 3] {
    [
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    ]
}

use crate::handshake::{ConnectionRole, HandshakeState};
use std::fmt;

/// Counters kept by a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Acknowledgement messages received
    pub acknowledgements: u64,

    /// Ping requests received
    pub pings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub id: u32,
    pub name: String,
    pub chunk_stream_id: u32,
}

/// Point in time description of a connection, for diagnostics
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub role: ConnectionRole,
    pub handshake_state: HandshakeState,
    pub connected: bool,
    pub closed: bool,
    pub app: Option<String>,
    pub uri: Option<String>,
    pub stats: ConnectionStats,
    pub window_ack_size: u32,
    pub send_chunk_size: u32,
    pub receive_chunk_size: usize,
    pub buffered_bytes: usize,
    pub pending_transactions: usize,
    pub streams: Vec<StreamSummary>,
}

impl fmt::Display for ConnectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "role:          {}", self.role)?;
        writeln!(f, "state:         {}", self.handshake_state)?;
        writeln!(f, "connected:     {}", self.connected)?;
        writeln!(f, "closed:        {}", self.closed)?;

        if self.role == ConnectionRole::Client {
            writeln!(f, "app:           {}", self.app.as_deref().unwrap_or(""))?;
            writeln!(f, "uri:           {}", self.uri.as_deref().unwrap_or(""))?;
        }

        writeln!(f, "ack:           {}", self.stats.acknowledgements)?;
        writeln!(f, "ping:          {}", self.stats.pings)?;
        writeln!(f, "window ack:    {}", self.window_ack_size)?;
        writeln!(f, "chunk size:    send={} receive={}", self.send_chunk_size, self.receive_chunk_size)?;
        writeln!(f, "buffered:      {}", self.buffered_bytes)?;
        writeln!(f, "transactions:  {}", self.pending_transactions)?;
        writeln!(f, "streams:")?;
        for stream in &self.streams {
            writeln!(
                f,
                ".... id={} name='{}' chunk_id={}",
                stream.id, stream.name, stream.chunk_stream_id
            )?;
        }

        Ok(())
    }
}

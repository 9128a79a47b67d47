/// Configuration options that govern how a connection operates
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Sent as `flashVer` in the client's `connect` request
    pub flash_version: String,

    /// Outbound chunk size announced once the client's `connect` request succeeds
    pub chunk_size: u32,

    /// Window acknowledgement size sent in reply to Set Peer Bandwidth messages
    pub window_ack_size: u32,

    /// Upper bound on bytes held while waiting for the rest of a handshake step or chunk
    pub max_buffered_bytes: usize,

    pub capabilities: f64,
    pub audio_codecs: f64,
    pub video_codecs: f64,
    pub video_function: f64,
}

impl ConnectionConfig {
    /// Creates a new configuration object with default values
    pub fn new() -> ConnectionConfig {
        ConnectionConfig {
            flash_version: "LNX 9,0,124,2".to_string(),
            chunk_size: 4096,
            window_ack_size: 2_500_000,
            max_buffered_bytes: 524_288,
            capabilities: 15.0,
            audio_codecs: 1024.0,
            video_codecs: 128.0,
            video_function: 1.0,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::new()
    }
}

use super::{Connection, ConnectionError};
use crate::messages::Amf0Command;

/// Invoked once the connection is ready for use.  Clients reach this point when the server
/// accepts the `connect` request, servers when the handshake completes.
pub type EstablishedHandler = Box<dyn FnOnce(&Connection)>;

/// Invoked for commands addressed to the connection rather than to one of its streams
pub type CommandHandler = Box<dyn FnMut(&Connection, &CommandMessage)>;

/// Invoked when the connection closes, with the error that caused it (if any)
pub type CloseHandler = Box<dyn FnOnce(Option<ConnectionError>)>;

/// A command received by the connection, along with the message stream it arrived on
#[derive(PartialEq, Debug, Clone)]
pub struct CommandMessage {
    pub stream_id: u32,
    pub command: Amf0Command,
}

/// The callbacks a connection reports its life cycle through.
///
/// ```
/// # use rml_netconn::connection::ConnectionHandlers;
/// let handlers = ConnectionHandlers::new()
///     .on_established(|_connection| println!("connected"))
///     .on_command(|_connection, message| println!("command: {}", message.command.name))
///     .on_close(|error| println!("closed: {:?}", error));
/// ```
#[derive(Default)]
pub struct ConnectionHandlers {
    pub(crate) established: Option<EstablishedHandler>,
    pub(crate) command: Option<CommandHandler>,
    pub(crate) close: Option<CloseHandler>,
}

impl ConnectionHandlers {
    pub fn new() -> ConnectionHandlers {
        ConnectionHandlers::default()
    }

    pub fn on_established<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(&Connection) + 'static,
    {
        self.established = Some(Box::new(handler));
        self
    }

    pub fn on_command<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Connection, &CommandMessage) + 'static,
    {
        self.command = Some(Box::new(handler));
        self
    }

    pub fn on_close<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Option<ConnectionError>) + 'static,
    {
        self.close = Some(Box::new(handler));
        self
    }
}

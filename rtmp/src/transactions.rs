//! Correlation of outbound command requests with their `_result`/`_error` responses.

use crate::connection::Connection;
use crate::messages::Amf0Command;

/// Invoked once with the response to a request sent with `Connection::send_request`
pub type ResponseHandler = Box<dyn FnOnce(&Connection, CommandResponse)>;

/// The peer's answer to a correlated command request
#[derive(PartialEq, Debug, Clone)]
pub enum CommandResponse {
    /// The peer replied with `_result`
    Result(Amf0Command),

    /// The peer replied with `_error`
    Error(Amf0Command),
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        match self {
            CommandResponse::Result(_) => true,
            CommandResponse::Error(_) => false,
        }
    }

    pub fn command(&self) -> &Amf0Command {
        match self {
            CommandResponse::Result(command) => command,
            CommandResponse::Error(command) => command,
        }
    }
}

struct PendingTransaction {
    id: u32,
    command_name: String,
    handler: ResponseHandler,
}

/// Outstanding requests keyed by transaction id.
///
/// Transaction ids start at 1, since 0 is reserved for commands that expect no response.
pub struct TransactionList {
    next_id: u32,
    pending: Vec<PendingTransaction>,
}

impl TransactionList {
    pub fn new() -> TransactionList {
        TransactionList {
            next_id: 1,
            pending: Vec::new(),
        }
    }

    /// Reserves the transaction id the next registered request will use
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    pub fn register(&mut self, id: u32, command_name: impl Into<String>, handler: ResponseHandler) {
        self.pending.push(PendingTransaction {
            id,
            command_name: command_name.into(),
            handler,
        });
    }

    /// Removes the pending request matching the transaction id, so its handler can only ever be
    /// handed out once.  Returns the original command name along with the handler.
    pub fn take(&mut self, transaction_id: f64) -> Option<(String, ResponseHandler)> {
        if transaction_id.fract() != 0.0 || transaction_id < 1.0 || transaction_id > u32::MAX as f64 {
            return None;
        }

        let id = transaction_id as u32;
        let index = self.pending.iter().position(|x| x.id == id)?;
        let transaction = self.pending.remove(index);
        Some((transaction.command_name, transaction.handler))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for TransactionList {
    fn default() -> Self {
        TransactionList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ResponseHandler {
        Box::new(|_, _| ())
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut list = TransactionList::new();
        assert_eq!(list.next_id(), 1);
        assert_eq!(list.next_id(), 2);
        assert_eq!(list.next_id(), 3);
    }

    #[test]
    fn handler_can_only_be_taken_once() {
        let mut list = TransactionList::new();
        let id = list.next_id();
        list.register(id, "connect", noop());

        let (name, _) = list.take(1.0).unwrap();
        assert_eq!(name, "connect");
        assert!(list.take(1.0).is_none(), "Handler was returned twice");
        assert!(list.is_empty());
    }

    #[test]
    fn unknown_and_fractional_ids_match_nothing() {
        let mut list = TransactionList::new();
        let id = list.next_id();
        list.register(id, "connect", noop());

        assert!(list.take(2.0).is_none());
        assert!(list.take(1.5).is_none());
        assert!(list.take(0.0).is_none());
        assert!(list.take(-1.0).is_none());
        assert_eq!(list.len(), 1);
    }
}

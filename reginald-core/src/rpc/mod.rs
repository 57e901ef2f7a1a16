//! Length-prefixed JSON-RPC 2.0 transport and the five typed exchanges
//! Reginald uses to talk to an external plugin process.

pub mod protocol;
pub mod transport;

pub use protocol::{HandshakeReply, HandshakeRequest, LogRecord};
pub use transport::{Envelope, Transport};

// Domain types shared between the transport layer, the history store and the
// presentation layer.

pub mod constants;
pub mod error;
pub mod types;

pub use error::PeerIdError;
pub use types::{Direction, Message, MessageStatus, PeerId};

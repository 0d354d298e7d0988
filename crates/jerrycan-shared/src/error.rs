use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerIdError {
    #[error("Peer id is empty")]
    Empty,

    #[error("Peer id too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Invalid character {0:?} in peer id")]
    InvalidChar(char),
}

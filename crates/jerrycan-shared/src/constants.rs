/// Maximum length of a peer identifier in bytes
pub const MAX_PEER_ID_LEN: usize = 128;

/// Separator used inside peer identifiers (hardware addresses)
pub const PEER_ID_SEPARATOR: char = ':';

/// Filesystem-safe replacement for [`PEER_ID_SEPARATOR`]
pub const FILE_STEM_SEPARATOR: char = '_';

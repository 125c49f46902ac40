// ABOUTME: Post-processing of finished dump files
// ABOUTME: DEFINER clause removal and archive compression

pub mod compress;
pub mod definers;

pub use compress::{apply_compression, archive_prefix, CompressionFormat};
pub use definers::{remove_definers, remove_definers_from_all, DefinerRemoval};

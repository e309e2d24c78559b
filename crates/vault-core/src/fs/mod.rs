//! Filesystem primitives shared across features.

pub mod digest;
pub mod unpack;

pub use digest::hash_file;
pub use unpack::{clear_dir, extract_archive};

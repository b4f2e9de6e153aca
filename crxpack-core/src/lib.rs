pub mod archive;
pub mod checksum;
pub mod compress;
pub mod container;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod pack;
pub mod path_safety;
pub mod verify;

pub use error::{PackError, Result, Stage};

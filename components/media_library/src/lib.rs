//! The on-disk library of finished audio files.
//!
//! A [`LibraryStore`] owns one directory. Files land there only through
//! [`LibraryStore::register`], which refuses a second file for a media id
//! that is already present.

mod entry;
mod error;
mod index;
mod store;

pub use entry::{LibraryEntry, LibraryStats, NewEntry};
pub use error::{LibraryError, Result};
pub use store::{validate_filename, LibraryStore};

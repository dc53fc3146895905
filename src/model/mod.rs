//! The in-memory archive and entry model (section 3, 4.D, 4.E): what this
//! crate actually lets you inspect and mutate, independent of how it was
//! read or how it will be written.

mod archive;
mod data_source;
mod entry;

pub use archive::Archive;
pub use data_source::DataSource;
pub use entry::{Entry, EntryKind};

//! Turns a byte source into an [Archive](crate::model::Archive): locating
//! the end of central directory record, parsing the central directory, and
//! confirming each entry's local header (section 4.F).

mod archive_reader;
pub use archive_reader::{read_archive, ReaderOptions};

mod local_header;
pub(crate) use local_header::confirm_local_header;

//! Streaming decrypt+decompress and compress+encrypt pipelines (section 4.G).
//!
//! Reading an entry and writing one are mirror images of each other, built
//! from the same three layers in opposite order:
//!
//! - Read:  cipher-decrypt -> decompress -> CRC-32 accumulator
//! - Write: CRC-32 accumulator -> compress -> cipher-encrypt
//!
//! Both are implemented as plain [std::io::Read]/[std::io::Write] adapters
//! so a caller never has to think about buffering: bytes are processed in
//! whatever chunk size the consumer asks for (section 5 recommends 8 KiB).

mod decode;
mod encode;

pub use decode::{open_entry_reader, EntryReader};
pub use encode::{EntryWriteOutcome, EntryWriter};

//! LogDeck Logs - Log sources: decoding, ranged reads, and tailing

mod decoder;
mod rotation;
mod source;
mod tail;

pub use decoder::{
    decoder_for, parse_timestamp, AutoDecoder, DecodedRecord, JsonLinesDecoder, LogDecoder,
    TextDecoder,
};
pub use rotation::FileIdentity;
pub use source::{LogRecord, LogSource, ReadBatch};
pub use tail::{watch_file, watched_dir, FileWatch, Tail, TailBatch};

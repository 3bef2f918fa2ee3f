//! Streaming ingestion of word-vector text files.
//!
//! ```text
//! Start -> ReadHeader -> StreamRecords -> Flush* -> Done
//!   \________________________\_____________\______-> Error
//! ```
//!
//! Input is `<word_count> <dimension>` followed by one `<word> <f1> … <fN>` line
//! per word, optionally gzip- or bzip2-compressed (detected from content). Records
//! are written in batches; each batch is committed before the next is read, so a
//! failure keeps everything flushed before it.

mod error;
mod pipeline;
mod reader;

pub use error::{IngestAborted, IngestError, Result};
pub use pipeline::{
    ingest, IngestOptions, IngestPipeline, IngestReport, ProgressObserver, Stage,
};
pub use reader::{sniff, Header, SourceEncoding, VectorFileReader, WordRecord};
pub use wordvec_protocol::IngestMode;

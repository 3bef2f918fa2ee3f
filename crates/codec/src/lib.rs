//! # wordvec codec
//!
//! Packs word-vector coordinates into compact blobs for storage and transport.
//!
//! ```text
//! [f64; N]
//!     │
//!     ├──> Encoding (JSON numeric array)
//!     │
//!     └──> Compression (none | zlib | bz2)
//!            └─> blob + 1 tag byte
//! ```
//!
//! The tag byte makes every blob self-describing: [`unpack`] never needs the
//! compression setting that was active when the blob was written.
//!
//! ## Example
//!
//! ```
//! use wordvec_codec::{pack, unpack, Compression};
//!
//! let (blob, tag) = pack(&[0.5, -1.25], Compression::Bz2).unwrap();
//! assert_eq!(unpack(&blob, tag).unwrap(), vec![0.5, -1.25]);
//! ```

mod error;
mod pack;
mod tag;

pub use error::{CodecError, Result};
pub use pack::{pack, unpack};
pub use tag::{
    CodecTag, Compression, Encoding, BZ2_COMPRESSION, COMPRESSION_MASK, ENCODING_MASK,
    JSON_ENCODING, NO_COMPRESSION, ZLIB_COMPRESSION,
};

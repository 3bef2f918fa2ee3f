use crate::error::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bits of the tag that carry the encoding.
pub const ENCODING_MASK: u8 = 0b1111_0000;
/// Bits of the tag that carry the compression.
pub const COMPRESSION_MASK: u8 = 0b0000_1111;

/// Values serialized as a JSON numeric array.
pub const JSON_ENCODING: u8 = 0b0000_0000;

pub const NO_COMPRESSION: u8 = 0b1111_0000;
pub const ZLIB_COMPRESSION: u8 = 0b0000_0001;
pub const BZ2_COMPRESSION: u8 = 0b0000_0010;

/// How the float sequence is turned into bytes before compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Json,
}

impl Encoding {
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Json => JSON_ENCODING,
        }
    }

    fn from_bits(bits: u8, tag: u8) -> Result<Self> {
        match bits {
            JSON_ENCODING => Ok(Self::Json),
            _ => Err(CodecError::UnknownEncoding { tag }),
        }
    }
}

/// Compression applied to the encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Zlib,
    #[default]
    Bz2,
}

impl Compression {
    pub const ALL: [Self; 3] = [Self::None, Self::Zlib, Self::Bz2];

    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::None => NO_COMPRESSION,
            Self::Zlib => ZLIB_COMPRESSION,
            Self::Bz2 => BZ2_COMPRESSION,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
            Self::Bz2 => "bz2",
        }
    }

    /// `NO_COMPRESSION` lives in the high nibble, so an empty low nibble means "none".
    fn from_tag(tag: u8) -> Result<Self> {
        match tag & COMPRESSION_MASK {
            0 => Ok(Self::None),
            ZLIB_COMPRESSION => Ok(Self::Zlib),
            BZ2_COMPRESSION => Ok(Self::Bz2),
            _ => Err(CodecError::UnknownCompression { tag }),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = CodecError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "zlib" => Ok(Self::Zlib),
            "bz2" | "bzip2" => Ok(Self::Bz2),
            other => Err(CodecError::UnknownCompressionName(other.to_string())),
        }
    }
}

/// The self-describing byte stored next to every packed payload.
///
/// The byte is `encoding ^ compression`. Compression is read from the low nibble; the
/// encoding is whatever remains once the compression bits are XOR-ed back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecTag {
    pub encoding: Encoding,
    pub compression: Compression,
}

impl CodecTag {
    #[must_use]
    pub const fn new(encoding: Encoding, compression: Compression) -> Self {
        Self {
            encoding,
            compression,
        }
    }

    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.encoding.bits() ^ self.compression.bits()
    }

    pub fn parse(tag: u8) -> Result<Self> {
        let compression = Compression::from_tag(tag)?;
        let rest = tag ^ compression.bits();
        if rest & !ENCODING_MASK != 0 {
            return Err(CodecError::UnknownEncoding { tag });
        }
        let encoding = Encoding::from_bits(rest & ENCODING_MASK, tag)?;
        Ok(Self {
            encoding,
            compression,
        })
    }
}

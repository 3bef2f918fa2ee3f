use crate::error::{CodecError, Result};
use crate::tag::{CodecTag, Compression, Encoding};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::{self, Read, Write};

/// Pack `values` into a blob plus the tag byte describing how it was produced.
///
/// The JSON encoding writes the shortest text that parses back to the same `f64`, so
/// `unpack(pack(v))` reproduces `v` exactly. Non-finite values are rejected.
pub fn pack(values: &[f64], compression: Compression) -> Result<(Vec<u8>, u8)> {
    let tag = CodecTag::new(Encoding::Json, compression);
    let encoded = encode(tag.encoding, values)?;
    let blob = compress(compression, &encoded)?;
    Ok((blob, tag.to_byte()))
}

/// Reverse of [`pack`]. The tag alone decides how the blob is read.
pub fn unpack(blob: &[u8], tag: u8) -> Result<Vec<f64>> {
    let tag = CodecTag::parse(tag)?;
    let raw = decompress(tag.compression, blob)?;
    decode(tag.encoding, &raw)
}

fn encode(encoding: Encoding, values: &[f64]) -> Result<Vec<u8>> {
    if let Some((index, value)) = values
        .iter()
        .copied()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
    {
        return Err(CodecError::NonFinite { index, value });
    }
    match encoding {
        Encoding::Json => Ok(serde_json::to_vec(values)?),
    }
}

fn decode(encoding: Encoding, raw: &[u8]) -> Result<Vec<f64>> {
    match encoding {
        Encoding::Json => Ok(serde_json::from_slice(raw)?),
    }
}

fn compress(compression: Compression, bytes: &[u8]) -> Result<Vec<u8>> {
    let name = compression.name();
    let wrap = |source| CodecError::Compress {
        compression: name,
        source,
    };
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(bytes).map_err(wrap)?;
            encoder.finish().map_err(wrap)
        }
        Compression::Bz2 => {
            let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(bytes).map_err(wrap)?;
            encoder.finish().map_err(wrap)
        }
    }
}

fn decompress(compression: Compression, blob: &[u8]) -> Result<Vec<u8>> {
    let inflated = match compression {
        Compression::None => return Ok(blob.to_vec()),
        Compression::Zlib => inflate_zlib(blob),
        Compression::Bz2 => {
            let mut out = Vec::new();
            BzDecoder::new(blob).read_to_end(&mut out).map(|_| out)
        }
    };
    inflated.map_err(|source| CodecError::Decompress {
        compression: compression.name(),
        source,
    })
}

// `read::ZlibDecoder` reports a cut-off stream as a clean EOF, so drive the inflater by hand
// and insist on reaching the end-of-stream marker.
fn inflate_zlib(blob: &[u8]) -> io::Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(blob.len().saturating_mul(4).max(64));
    loop {
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let status = inflater
            .decompress_vec(&blob[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if status == Status::StreamEnd {
            return Ok(out);
        }
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(64));
            continue;
        }
        if inflater.total_out() == produced && inflater.total_in() as usize == consumed {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "zlib stream ended before its end marker",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{BZ2_COMPRESSION, NO_COMPRESSION, ZLIB_COMPRESSION};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn uncompressed_blob_is_the_json_array() {
        let (blob, tag) = pack(&[1.0, -2.5, 0.125], Compression::None).unwrap();
        assert_eq!(tag, NO_COMPRESSION);
        assert_eq!(String::from_utf8(blob).unwrap(), "[1.0,-2.5,0.125]");
    }

    #[test]
    fn empty_sequence_roundtrips_for_every_compression() {
        for compression in Compression::ALL {
            let (blob, tag) = pack(&[], compression).unwrap();
            assert_eq!(unpack(&blob, tag).unwrap(), Vec::<f64>::new());
        }
    }

    #[test]
    fn tag_drives_unpack_not_caller_defaults() {
        let values = vec![0.1, 0.2, 0.3];
        let (zlib_blob, zlib_tag) = pack(&values, Compression::Zlib).unwrap();
        let (bz2_blob, bz2_tag) = pack(&values, Compression::Bz2).unwrap();
        assert_eq!(zlib_tag, ZLIB_COMPRESSION);
        assert_eq!(bz2_tag, BZ2_COMPRESSION);
        assert_eq!(unpack(&zlib_blob, zlib_tag).unwrap(), values);
        assert_eq!(unpack(&bz2_blob, bz2_tag).unwrap(), values);
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let err = pack(&[1.0, f64::NAN], Compression::None).unwrap_err();
        assert!(matches!(err, CodecError::NonFinite { index: 1, .. }));
        assert!(pack(&[f64::INFINITY], Compression::Zlib).is_err());
    }

    #[test]
    fn corrupt_payloads_fail_with_decode_errors() {
        let (mut blob, tag) = pack(&[1.0; 32], Compression::Zlib).unwrap();
        blob.truncate(blob.len() / 2);
        let err = unpack(&blob, tag).unwrap_err();
        assert!(err.is_decode(), "{err}");
        assert!(matches!(err, CodecError::Decompress { compression: "zlib", .. }));

        let err = unpack(b"not bzip2 at all", BZ2_COMPRESSION).unwrap_err();
        assert!(matches!(err, CodecError::Decompress { compression: "bz2", .. }));

        let err = unpack(b"{\"a\":1}", NO_COMPRESSION).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));

        let err = unpack(b"[1.0]", 0b0000_0111).unwrap_err();
        assert!(matches!(err, CodecError::UnknownCompression { tag: 0b0000_0111 }));
    }

    proptest! {
        #[test]
        fn pack_unpack_roundtrip(
            values in proptest::collection::vec(
                any::<f64>().prop_filter("finite", |v| v.is_finite()),
                0..48,
            ),
            choice in 0usize..3,
        ) {
            let compression = Compression::ALL[choice];
            let (blob, tag) = pack(&values, compression).unwrap();
            prop_assert_eq!(unpack(&blob, tag).unwrap(), values);
        }
    }
}

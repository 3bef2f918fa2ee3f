use crate::model::Model;
use serde::{Deserialize, Serialize};
use wordvec_codec::{pack, unpack, CodecError, Compression};

/// Base64 (standard alphabet) for byte blobs embedded in JSON.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::STANDARD;
        use base64::Engine as _;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| STANDARD.decode(raw.as_bytes()))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}

/// One word's coordinates inside a model, kept in packed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub id: u64,
    pub model_id: u64,
    pub word: String,
    #[serde(with = "base64_bytes")]
    pub packed_values: Vec<u8>,
    pub codec: u8,
}

impl Vector {
    /// Decode the payload using the vector's own codec tag.
    pub fn values(&self) -> Result<Vec<f64>, CodecError> {
        unpack(&self.packed_values, self.codec)
    }

    /// Wire form; `packed = false` ships decoded `values` instead of the blob.
    pub fn to_record(&self, packed: bool) -> Result<VectorRecord, CodecError> {
        let (values, packed_values, codec) = if packed {
            (None, Some(self.packed_values.clone()), Some(self.codec))
        } else {
            (Some(self.values()?), None, None)
        };
        Ok(VectorRecord {
            id: self.id,
            model_id: self.model_id,
            word: self.word.clone(),
            values,
            packed_values,
            codec,
            model: None,
        })
    }
}

/// Vector as it travels over the wire or is printed for users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: u64,
    pub model_id: u64,
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes::option"
    )]
    pub packed_values: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
}

impl VectorRecord {
    /// Back to the stored shape. Records that only carry `values` are packed with `compression`.
    pub fn into_vector(self, compression: Compression) -> Result<Vector, CodecError> {
        let (packed_values, codec) = match (self.packed_values, self.codec, self.values) {
            (Some(blob), Some(codec), _) => (blob, codec),
            (_, _, Some(values)) => pack(&values, compression)?,
            _ => pack(&[], compression)?,
        };
        Ok(Vector {
            id: self.id,
            model_id: self.model_id,
            word: self.word,
            packed_values,
            codec,
        })
    }
}

/// Payload accepted by create/update: decoded floats or an already-packed blob.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorPayload {
    Values(Vec<f64>),
    Packed { blob: Vec<u8>, codec: u8 },
}

/// Create/update input for one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VectorInputWire", into = "VectorInputWire")]
pub struct VectorInput {
    pub word: String,
    pub payload: VectorPayload,
}

impl VectorInput {
    pub fn from_values(word: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            word: word.into(),
            payload: VectorPayload::Values(values),
        }
    }

    pub fn from_packed(word: impl Into<String>, blob: Vec<u8>, codec: u8) -> Self {
        Self {
            word: word.into(),
            payload: VectorPayload::Packed { blob, codec },
        }
    }

    /// Resolve to `(blob, codec)`, packing plain values with `compression`.
    ///
    /// Packed inputs are checked by decoding them once so a bad tag never reaches storage.
    pub fn to_packed(&self, compression: Compression) -> Result<(Vec<u8>, u8), CodecError> {
        match &self.payload {
            VectorPayload::Values(values) => pack(values, compression),
            VectorPayload::Packed { blob, codec } => {
                unpack(blob, *codec)?;
                Ok((blob.clone(), *codec))
            }
        }
    }

    /// Same input in packed form; keeps transport payloads compact.
    pub fn into_packed(self, compression: Compression) -> Result<Self, CodecError> {
        match self.payload {
            VectorPayload::Packed { .. } => Ok(self),
            VectorPayload::Values(values) => {
                let (blob, codec) = pack(&values, compression)?;
                Ok(Self::from_packed(self.word, blob, codec))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorInputWire {
    word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<f64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes::option"
    )]
    packed_values: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    codec: Option<u8>,
}

impl TryFrom<VectorInputWire> for VectorInput {
    type Error = String;

    fn try_from(wire: VectorInputWire) -> Result<Self, Self::Error> {
        let payload = match (wire.values, wire.packed_values, wire.codec) {
            (_, Some(blob), Some(codec)) => VectorPayload::Packed { blob, codec },
            (_, Some(_), None) => {
                return Err(format!("vector '{}': packed_values requires codec", wire.word))
            }
            (Some(values), None, _) => VectorPayload::Values(values),
            (None, None, _) => {
                return Err(format!(
                    "vector '{}': one of values or packed_values is required",
                    wire.word
                ))
            }
        };
        Ok(Self {
            word: wire.word,
            payload,
        })
    }
}

impl From<VectorInput> for VectorInputWire {
    fn from(input: VectorInput) -> Self {
        match input.payload {
            VectorPayload::Values(values) => Self {
                word: input.word,
                values: Some(values),
                packed_values: None,
                codec: None,
            },
            VectorPayload::Packed { blob, codec } => Self {
                word: input.word,
                values: None,
                packed_values: Some(blob),
                codec: Some(codec),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wordvec_codec::NO_COMPRESSION;

    #[test]
    fn input_accepts_values_or_packed_shapes() {
        let from_values: VectorInput =
            serde_json::from_str(r#"{"word": "foo", "values": [1.0, 2.0]}"#).unwrap();
        assert_eq!(from_values, VectorInput::from_values("foo", vec![1.0, 2.0]));

        // "WzEuMF0=" is base64 for "[1.0]".
        let from_packed: VectorInput = serde_json::from_str(&format!(
            r#"{{"word": "bar", "packed_values": "WzEuMF0=", "codec": {NO_COMPRESSION}}}"#
        ))
        .unwrap();
        assert_eq!(
            from_packed.to_packed(Compression::Zlib).unwrap(),
            (b"[1.0]".to_vec(), NO_COMPRESSION)
        );

        assert!(serde_json::from_str::<VectorInput>(r#"{"word": "baz"}"#).is_err());
        assert!(
            serde_json::from_str::<VectorInput>(r#"{"word": "q", "packed_values": "WzEuMF0="}"#)
                .is_err()
        );
    }

    #[test]
    fn packed_inputs_with_bad_tags_are_rejected() {
        let input = VectorInput::from_packed("w", b"[1.0]".to_vec(), 0b0000_1111);
        assert!(input.to_packed(Compression::None).unwrap_err().is_decode());
    }

    #[test]
    fn records_convert_both_ways() {
        let (blob, codec) = pack(&[0.5, 1.5], Compression::Bz2).unwrap();
        let vector = Vector {
            id: 4,
            model_id: 1,
            word: "w".into(),
            packed_values: blob,
            codec,
        };

        let unpacked = vector.to_record(false).unwrap();
        assert_eq!(unpacked.values, Some(vec![0.5, 1.5]));
        assert_eq!(unpacked.packed_values, None);

        let packed = vector.to_record(true).unwrap();
        let json = serde_json::to_string(&packed).unwrap();
        let back: VectorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_vector(Compression::None).unwrap(), vector);
    }
}

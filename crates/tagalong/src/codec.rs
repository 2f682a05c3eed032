// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Value encodings for cache payloads.
//!
//! A [`Codec`] turns values into the opaque byte payloads a store keeps, and back.
//! [`JsonCodec`] is the default and produces payloads other JSON-speaking clients of
//! the same store can read. [`PostcardCodec`] trades that interoperability for
//! smaller payloads and is available behind the `postcard` feature.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// An encode or decode failure reported by a [`Codec`].
#[ohno::error]
pub struct CodecError {}

impl CodecError {
    /// Creates a codec error from an underlying serializer error.
    pub fn from_cause(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// Converts values to and from stored payloads.
///
/// Implementations must be pure: the same value always encodes to a payload that
/// decodes back to an equal value.
pub trait Codec: Send + Sync {
    /// Encodes `value` into a payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the value cannot be represented, such as a map with
    /// non-string keys in JSON.
    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, CodecError>;

    /// Decodes a payload into a `V`.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the payload is malformed or does not fit `V`.
    fn decode<V: DeserializeOwned>(&self, payload: &[u8]) -> Result<V, CodecError>;

    /// Returns `true` if `payload` is this codec's encoding of "no value".
    ///
    /// [`remember`](crate::TagCache::remember) treats such a payload as a miss unless
    /// the cache was built with `cache_nulls(true)`. Codecs without a distinguished
    /// null never report one.
    fn is_null(&self, payload: &[u8]) -> bool {
        let _ = payload;
        false
    }
}

/// JSON payloads via `serde_json`.
///
/// # Examples
///
/// ```
/// use tagalong::codec::{Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let payload = codec.encode(&vec![1, 2, 3]).unwrap();
/// assert_eq!(payload, b"[1,2,3]");
///
/// let value: Vec<i32> = codec.decode(&payload).unwrap();
/// assert_eq!(value, [1, 2, 3]);
/// assert!(codec.is_null(b"null"));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::from_cause)
    }

    fn decode<V: DeserializeOwned>(&self, payload: &[u8]) -> Result<V, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::from_cause)
    }

    fn is_null(&self, payload: &[u8]) -> bool {
        payload.trim_ascii() == b"null"
    }
}

/// Compact binary payloads via `postcard`.
///
/// Postcard is not self-describing: a payload can only be decoded into the same type
/// it was encoded from.
#[cfg(any(feature = "postcard", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "postcard")))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostcardCodec;

#[cfg(any(feature = "postcard", test))]
impl Codec for PostcardCodec {
    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        postcard::to_allocvec(value).map_err(CodecError::from_cause)
    }

    fn decode<V: DeserializeOwned>(&self, payload: &[u8]) -> Result<V, CodecError> {
        postcard::from_bytes(payload).map_err(CodecError::from_cause)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        age: u8,
        tags: Vec<String>,
        manager: Option<Box<Profile>>,
    }

    fn sample() -> Profile {
        Profile {
            name: "Ada".to_string(),
            age: 36,
            tags: vec!["admin".to_string()],
            manager: Some(Box::new(Profile {
                name: "Charles".to_string(),
                age: 52,
                tags: Vec::new(),
                manager: None,
            })),
        }
    }

    #[test]
    fn json_round_trips_nested_values() {
        let codec = JsonCodec;
        let payload = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode::<Profile>(&payload).unwrap(), sample());
    }

    #[test]
    fn json_round_trips_maps_and_unicode() {
        let codec = JsonCodec;
        let value = BTreeMap::from([("ключ".to_string(), "値".to_string()), ("emoji".to_string(), "🦀".to_string())]);
        let payload = codec.encode(&value).unwrap();
        assert_eq!(codec.decode::<BTreeMap<String, String>>(&payload).unwrap(), value);
    }

    #[test]
    fn json_decodes_into_a_different_shape() {
        let codec = JsonCodec;
        let payload = codec.encode(&sample()).unwrap();
        let loose: serde_json::Value = codec.decode(&payload).unwrap();
        assert_eq!(loose["name"], "Ada");
    }

    #[test]
    fn json_rejects_non_string_map_keys() {
        let codec = JsonCodec;
        let value = HashMap::from([(vec![1_u8], 1)]);
        assert!(codec.encode(&value).is_err());
    }

    #[test]
    fn json_decode_reports_malformed_payloads() {
        let codec = JsonCodec;
        assert!(codec.decode::<Profile>(b"{not json").is_err());
        assert!(codec.decode::<u8>(b"300").is_err());
    }

    #[test]
    fn json_null_detection() {
        let codec = JsonCodec;
        assert!(codec.is_null(&codec.encode(&Option::<u8>::None).unwrap()));
        assert!(codec.is_null(b"  null\n"));
        assert!(!codec.is_null(b"\"null\""));
        assert!(!codec.is_null(b"0"));
    }

    #[test]
    fn postcard_round_trips() {
        let codec = PostcardCodec;
        let payload = codec.encode(&sample()).unwrap();
        assert!(payload.len() < JsonCodec.encode(&sample()).unwrap().len());
        assert_eq!(codec.decode::<Profile>(&payload).unwrap(), sample());
        assert!(!codec.is_null(&payload));
    }

    #[test]
    fn postcard_rejects_truncated_payloads() {
        let codec = PostcardCodec;
        let payload = codec.encode(&sample()).unwrap();
        assert!(codec.decode::<Profile>(&payload[..3]).is_err());
    }
}

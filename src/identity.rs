//! Composite pull request identity codec.
//!
//! Callers hold an opaque logical id for a pull request. For most providers
//! that is a plain native id, but some use compound keys (a numeric id plus
//! a `full-path!index` pair), so the opaque form is a JSON object string
//! carrying both. Decoding is total over everything this system produces,
//! and re-encoding a decoded key reproduces the original bytes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while decoding an opaque pull request id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The id string was empty or blank.
    #[error("pull request id must not be blank")]
    Blank,

    /// The id looked like JSON but could not be parsed.
    #[error("pull request id is malformed JSON: {message}")]
    MalformedJson {
        /// Parse error detail.
        message: String,
    },

    /// The JSON object carried neither an `id` nor a `full` key.
    #[error("pull request id object carries neither \"id\" nor \"full\"")]
    MissingFields,

    /// The `full` key was present but not of the `path!index` form.
    #[error("pull request id \"full\" key must be of the form path!index, got {value}")]
    MalformedFull {
        /// The offending `full` value.
        value: String,
    },
}

/// The provider-native compound part of a composite key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryKey {
    /// Project/repository path (e.g. `grp/proj`).
    pub path: String,
    /// Per-project index (e.g. a merge request iid).
    pub index: String,
}

/// A decoded logical pull request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeKey {
    /// The provider's globally unique id.
    pub native_id: String,
    /// The compound `path!index` part, for providers that need one.
    pub secondary: Option<SecondaryKey>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireKey {
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    full: Option<String>,
}

impl CompositeKey {
    /// Creates a key carrying only a native id.
    #[must_use]
    pub fn from_native(native_id: impl Into<String>) -> Self {
        Self {
            native_id: native_id.into(),
            secondary: None,
        }
    }

    /// Creates a compound key.
    #[must_use]
    pub fn compound(
        native_id: impl Into<String>,
        path: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            native_id: native_id.into(),
            secondary: Some(SecondaryKey {
                path: path.into(),
                index: index.into(),
            }),
        }
    }

    /// Decodes an opaque id string.
    ///
    /// A bare string (one not starting with `{`) is accepted as a plain
    /// native id. A JSON object must carry `id` and/or `full`; when only
    /// `full` is present its index segment doubles as the native id.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the input is blank, carries malformed
    /// JSON, lacks both keys, or carries a `full` value without a `!`.
    pub fn decode(raw: &str) -> Result<Self, IdentityError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Blank);
        }
        if !trimmed.starts_with('{') {
            return Ok(Self::from_native(trimmed));
        }

        let wire: WireKey =
            serde_json::from_str(trimmed).map_err(|error| IdentityError::MalformedJson {
                message: error.to_string(),
            })?;

        let secondary = wire
            .full
            .as_deref()
            .map(parse_full)
            .transpose()?;

        let native_id = wire
            .id
            .or_else(|| {
                secondary
                    .as_ref()
                    .map(|compound| compound.index.clone())
            })
            .ok_or(IdentityError::MissingFields)?;

        Ok(Self {
            native_id,
            secondary,
        })
    }

    /// Encodes the key into its opaque JSON object form.
    ///
    /// The output is deterministic (`id` first, `full` omitted when absent)
    /// so that decode-then-encode round-trips byte-identically for any key
    /// this system produced.
    #[must_use]
    pub fn encode(&self) -> String {
        let wire = WireKey {
            id: Some(self.native_id.clone()),
            full: self
                .secondary
                .as_ref()
                .map(|compound| format!("{}!{}", compound.path, compound.index)),
        };
        // A struct of strings cannot fail to serialise.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Returns the exact id used to key cache entries.
    #[must_use]
    pub fn exact_id(&self) -> &str {
        self.native_id.as_str()
    }

    /// Derives the filesystem-safe lowercase key used by the pending review
    /// store: the compound path with separators flattened, suffixed with
    /// the index; plain keys fall back to the flattened native id.
    #[must_use]
    pub fn review_store_key(&self) -> String {
        self.secondary.as_ref().map_or_else(
            || self.native_id.replace('/', "-").to_lowercase(),
            |compound| format!("{}-{}", compound.path.replace('/', "-"), compound.index).to_lowercase(),
        )
    }
}

fn parse_full(full: &str) -> Result<SecondaryKey, IdentityError> {
    full.rsplit_once('!')
        .filter(|(path, index)| !path.is_empty() && !index.is_empty())
        .map(|(path, index)| SecondaryKey {
            path: path.to_owned(),
            index: index.to_owned(),
        })
        .ok_or_else(|| IdentityError::MalformedFull {
            value: full.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{CompositeKey, IdentityError};

    #[rstest]
    #[case::plain(CompositeKey::from_native("42"))]
    #[case::compound(CompositeKey::compound("42", "grp/proj", "7"))]
    #[case::nested_path(CompositeKey::compound("9001", "grp/sub/proj", "12"))]
    fn decode_inverts_encode(#[case] key: CompositeKey) {
        let encoded = key.encode();
        let decoded = CompositeKey::decode(&encoded)
            .unwrap_or_else(|error| panic!("decode should succeed: {error}"));
        assert_eq!(decoded, key);
    }

    #[test]
    fn encoding_a_decoded_key_is_byte_identical() {
        let raw = r#"{"id":"42","full":"grp/proj!7"}"#;
        let key = CompositeKey::decode(raw)
            .unwrap_or_else(|error| panic!("decode should succeed: {error}"));
        assert_eq!(key.encode(), raw);
    }

    #[test]
    fn bare_strings_decode_as_native_ids() {
        let key = CompositeKey::decode("12345")
            .unwrap_or_else(|error| panic!("decode should succeed: {error}"));
        assert_eq!(key, CompositeKey::from_native("12345"));
    }

    #[test]
    fn full_only_objects_use_the_index_as_native_id() {
        let key = CompositeKey::decode(r#"{"full":"grp/proj!7"}"#)
            .unwrap_or_else(|error| panic!("decode should succeed: {error}"));
        assert_eq!(key.native_id, "7");
        assert_eq!(key.review_store_key(), "grp-proj-7");
    }

    #[rstest]
    #[case::blank("", IdentityError::Blank)]
    #[case::whitespace("   ", IdentityError::Blank)]
    fn blank_inputs_fail_with_a_typed_error(#[case] raw: &str, #[case] expected: IdentityError) {
        let error = CompositeKey::decode(raw).expect_err("blank ids should fail");
        assert_eq!(error, expected);
    }

    #[test]
    fn malformed_json_fails_with_a_typed_error() {
        let error = CompositeKey::decode(r#"{"id": "#).expect_err("truncated JSON should fail");
        assert!(
            matches!(error, IdentityError::MalformedJson { .. }),
            "expected MalformedJson, got {error:?}"
        );
    }

    #[test]
    fn objects_without_identifying_keys_fail() {
        let error =
            CompositeKey::decode(r#"{"other":"x"}"#).expect_err("objects need id or full");
        assert_eq!(error, IdentityError::MissingFields);
    }

    #[test]
    fn full_without_a_separator_fails() {
        let error = CompositeKey::decode(r#"{"full":"grp/proj"}"#)
            .expect_err("full keys need a path!index separator");
        assert!(
            matches!(error, IdentityError::MalformedFull { .. }),
            "expected MalformedFull, got {error:?}"
        );
    }

    #[test]
    fn review_store_keys_are_filesystem_safe_and_lowercase() {
        let key = CompositeKey::compound("42", "Grp/Proj", "7");
        assert_eq!(key.review_store_key(), "grp-proj-7");
    }
}

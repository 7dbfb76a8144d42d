//! Canonical byte encoding of entity join-key values.
//!
//! Layout, repeated for each join key in ascending name order:
//!
//! ```text
//! u32 LE name length | name bytes | u8 type tag | value
//! ```
//!
//! where the tag is the `ValueType` code and the value is an `i32`/`i64` in
//! little-endian, or a `u32` LE length followed by the raw bytes for strings and
//! bytes. Names are part of the key, so tables joined on different keys never
//! share store keys, and every supported value is self-delimiting, so distinct
//! inputs never produce the same bytes.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{Value, ValueType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyEncodeError {
    #[error("entity row is missing join key '{join_key}'")]
    MissingJoinKey { join_key: String },
    #[error("join key '{join_key}' has unsupported value type {value_type:?}")]
    UnsupportedValueType {
        join_key: String,
        value_type: ValueType,
    },
}

/// Serialized join-key values; the lookup key for one feature-table record.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(Vec<u8>);

impl EntityKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Hex SHA-256 of the encoded key, used as a document id by stores that
    /// want fixed-width keys.
    pub fn document_id(&self) -> String {
        hex::encode(Sha256::digest(&self.0))
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityKey").field(&hex::encode(&self.0)).finish()
    }
}

impl AsRef<[u8]> for EntityKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode `(join key, value)` pairs. Input order does not matter.
pub fn encode_entity_key<'a, I>(entries: I) -> Result<EntityKey, KeyEncodeError>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut entries: Vec<(&str, &Value)> = entries.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut buf = Vec::with_capacity(entries.len() * 24);
    for (name, value) in entries {
        write_len_prefixed(&mut buf, name.as_bytes());
        buf.push(value.value_type().as_i32() as u8);
        match value {
            Value::Int32Val(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Int64Val(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::StringVal(s) => write_len_prefixed(&mut buf, s.as_bytes()),
            Value::BytesVal(b) => write_len_prefixed(&mut buf, b),
            other => {
                return Err(KeyEncodeError::UnsupportedValueType {
                    join_key: name.to_string(),
                    value_type: other.value_type(),
                });
            }
        }
    }
    Ok(EntityKey(buf))
}

/// Project a row onto `join_keys` and encode the result.
///
/// Fields of the row that are not join keys are ignored.
pub fn project_entity_key(
    join_keys: &[String],
    fields: &BTreeMap<String, Value>,
) -> Result<EntityKey, KeyEncodeError> {
    let mut projected = Vec::with_capacity(join_keys.len());
    for key in join_keys {
        let value = fields
            .get(key)
            .ok_or_else(|| KeyEncodeError::MissingJoinKey {
                join_key: key.clone(),
            })?;
        projected.push((key.as_str(), value));
    }
    encode_entity_key(projected)
}

fn write_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

use serde::{Deserialize, Serialize};

use crate::UnknownEnumCode;

/// Typed value carried by entity and feature fields.
///
/// Mirrors the `Value` oneof of the serving protocol. `NullVal` is the unset
/// value: it is what a response carries for a field that has nothing to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    BytesVal(#[serde(with = "b64")] Vec<u8>),
    StringVal(String),
    Int32Val(i32),
    Int64Val(i64),
    DoubleVal(f64),
    FloatVal(f32),
    BoolVal(bool),
    UnixTimestampVal(i64),
    BytesListVal(#[serde(with = "b64_list")] Vec<Vec<u8>>),
    StringListVal(Vec<String>),
    Int32ListVal(Vec<i32>),
    Int64ListVal(Vec<i64>),
    DoubleListVal(Vec<f64>),
    FloatListVal(Vec<f32>),
    BoolListVal(Vec<bool>),
    UnixTimestampListVal(Vec<i64>),
    NullVal(NullValue),
}

/// Payload of [`Value::NullVal`]. In JSON a null cell reads
/// `{"null_val": "NULL_VALUE"}`, like every other variant of the oneof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NullValue {
    #[default]
    NullValue,
}

impl Default for Value {
    fn default() -> Self {
        Value::NULL
    }
}

impl Value {
    pub const NULL: Value = Value::NullVal(NullValue::NullValue);

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::BytesVal(_) => ValueType::Bytes,
            Value::StringVal(_) => ValueType::String,
            Value::Int32Val(_) => ValueType::Int32,
            Value::Int64Val(_) => ValueType::Int64,
            Value::DoubleVal(_) => ValueType::Double,
            Value::FloatVal(_) => ValueType::Float,
            Value::BoolVal(_) => ValueType::Bool,
            Value::UnixTimestampVal(_) => ValueType::UnixTimestamp,
            Value::BytesListVal(_) => ValueType::BytesList,
            Value::StringListVal(_) => ValueType::StringList,
            Value::Int32ListVal(_) => ValueType::Int32List,
            Value::Int64ListVal(_) => ValueType::Int64List,
            Value::DoubleListVal(_) => ValueType::DoubleList,
            Value::FloatListVal(_) => ValueType::FloatList,
            Value::BoolListVal(_) => ValueType::BoolList,
            Value::UnixTimestampListVal(_) => ValueType::UnixTimestampList,
            Value::NullVal(_) => ValueType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::NullVal(_))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32Val(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64Val(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::DoubleVal(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::BoolVal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::StringVal(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::StringVal(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::BytesVal(value)
    }
}

/// Declared type of a feature or entity column. Codes match the protocol enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum ValueType {
    #[default]
    Invalid = 0,
    Bytes = 1,
    String = 2,
    Int32 = 3,
    Int64 = 4,
    Double = 5,
    Float = 6,
    Bool = 7,
    UnixTimestamp = 8,
    BytesList = 11,
    StringList = 12,
    Int32List = 13,
    Int64List = 14,
    DoubleList = 15,
    FloatList = 16,
    BoolList = 17,
    UnixTimestampList = 18,
    Null = 19,
}

impl ValueType {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for ValueType {
    type Error = UnknownEnumCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let ty = match value {
            0 => ValueType::Invalid,
            1 => ValueType::Bytes,
            2 => ValueType::String,
            3 => ValueType::Int32,
            4 => ValueType::Int64,
            5 => ValueType::Double,
            6 => ValueType::Float,
            7 => ValueType::Bool,
            8 => ValueType::UnixTimestamp,
            11 => ValueType::BytesList,
            12 => ValueType::StringList,
            13 => ValueType::Int32List,
            14 => ValueType::Int64List,
            15 => ValueType::DoubleList,
            16 => ValueType::FloatList,
            17 => ValueType::BoolList,
            18 => ValueType::UnixTimestampList,
            19 => ValueType::Null,
            _ => {
                return Err(UnknownEnumCode {
                    name: "ValueType",
                    value,
                });
            }
        };
        Ok(ty)
    }
}

// Bytes travel as standard base64 strings in JSON bodies.
mod b64 {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| de::Error::custom(format!("invalid base64: {e}")))
    }
}

mod b64_list {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer, de, ser::SerializeSeq};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&BASE64_STANDARD.encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| {
                BASE64_STANDARD
                    .decode(s.as_bytes())
                    .map_err(|e| de::Error::custom(format!("invalid base64: {e}")))
            })
            .collect()
    }
}

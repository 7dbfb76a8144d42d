//! Feature-serving wire records, typed values, and the canonical entity key encoding.

mod feature_service;
mod key;
mod serving;
mod time;
mod value;

pub use feature_service::{
    FeatureService, FeatureServiceMeta, FeatureServiceSpec, FeatureSpecV2, FeatureViewProjection,
};
pub use key::{EntityKey, KeyEncodeError, encode_entity_key, project_entity_key};
pub use serving::{
    EntityRow, FeastServingType, FeatureList, FeatureRefParseError, FeatureReferenceV2,
    FieldStatus, FieldValues, GetFeastServingInfoRequest, GetFeastServingInfoResponse,
    GetOnlineFeaturesRequest, GetOnlineFeaturesRequestV2, GetOnlineFeaturesResponse,
    RepeatedValue,
};
pub use time::Timestamp;
pub use value::{NullValue, Value, ValueType};

/// Error returned when an integer does not name a member of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{value} is not a valid {name} code")]
pub struct UnknownEnumCode {
    pub name: &'static str,
    pub value: i32,
}

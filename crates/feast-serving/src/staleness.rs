use std::time::Duration;

use feast_online_store::OnlineRecord;
use feast_types::{FieldStatus, Timestamp, Value};

/// Status of one feature of one row.
///
/// `observed` is the event timestamp of the stored record together with
/// whether the feature carried a non-null value; `None` means there is no
/// record. A zero `max_age` never goes stale, and a record dated after
/// `request_ts` has age zero.
pub fn field_status(
    request_ts: Timestamp,
    observed: Option<(Timestamp, bool)>,
    max_age: Duration,
) -> FieldStatus {
    let Some((event_ts, has_value)) = observed else {
        return FieldStatus::NotFound;
    };
    let fresh = max_age.is_zero() || event_ts.age_at(request_ts) <= max_age;
    match (has_value, fresh) {
        (_, false) => FieldStatus::OutsideMaxAge,
        (true, true) => FieldStatus::Present,
        (false, true) => FieldStatus::NullValue,
    }
}

/// Value and status of `feature` read from `record`.
///
/// A feature never written for the key is NOT_FOUND. Only PRESENT carries
/// the stored value; stale values are suppressed.
pub fn evaluate(
    request_ts: Timestamp,
    record: Option<&OnlineRecord>,
    feature: &str,
    max_age: Duration,
) -> (Value, FieldStatus) {
    let stored = record.and_then(|r| r.values.get(feature).map(|v| (r.event_timestamp, v)));
    let status = field_status(
        request_ts,
        stored.map(|(ts, value)| (ts, !value.is_null())),
        max_age,
    );
    match (status, stored) {
        (FieldStatus::Present, Some((_, value))) => (value.clone(), status),
        _ => (Value::NULL, status),
    }
}

use feast_types::{EntityRow, FieldStatus, FieldValues, GetOnlineFeaturesResponse, Value};

use crate::resolver::ResolvedFeature;

/// Evaluated values of one resolved feature, indexed by row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub field_name: String,
    pub cells: Vec<(Value, FieldStatus)>,
}

impl FeatureColumn {
    pub fn new(feature: &ResolvedFeature, cells: Vec<(Value, FieldStatus)>) -> Self {
        Self {
            field_name: feature.field_name.clone(),
            cells,
        }
    }
}

/// Build one output row per input row, in input order.
///
/// Every row carries every entity field in `entity_fields` (supplied ones as
/// PRESENT, absent ones as NOT_FOUND) followed by the feature columns in
/// order, so all rows share one field order.
pub fn assemble(
    rows: &[EntityRow],
    entity_fields: &[String],
    columns: Vec<FeatureColumn>,
) -> GetOnlineFeaturesResponse {
    let mut field_values: Vec<FieldValues> = rows
        .iter()
        .map(|row| {
            let mut out = FieldValues::default();
            for name in entity_fields {
                match row.fields.get(name) {
                    Some(value) => out.insert(name.clone(), value.clone(), FieldStatus::Present),
                    None => out.insert(name.clone(), Value::NULL, FieldStatus::NotFound),
                }
            }
            out
        })
        .collect();

    for column in columns {
        for (out, (value, status)) in field_values.iter_mut().zip(column.cells) {
            out.insert(column.field_name.clone(), value, status);
        }
    }

    GetOnlineFeaturesResponse { field_values }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_fields_lead_and_order_is_stable() {
        let rows = vec![
            EntityRow::default().with_field("driver_id", 1001i64),
            EntityRow::default()
                .with_field("driver_id", 1002i64)
                .with_field("customer_id", "c7"),
        ];
        let entity_fields = vec!["customer_id".to_string(), "driver_id".to_string()];
        let columns = vec![
            FeatureColumn {
                field_name: "conv_rate".into(),
                cells: vec![
                    (Value::DoubleVal(0.49), FieldStatus::Present),
                    (Value::NULL, FieldStatus::NotFound),
                ],
            },
            FeatureColumn {
                field_name: "acc_rate".into(),
                cells: vec![
                    (Value::NULL, FieldStatus::OutsideMaxAge),
                    (Value::DoubleVal(0.9), FieldStatus::Present),
                ],
            },
        ];

        let response = assemble(&rows, &entity_fields, columns);
        assert_eq!(response.field_values.len(), 2);
        for row in &response.field_values {
            let names: Vec<_> = row.fields.keys().map(String::as_str).collect();
            assert_eq!(names, vec!["customer_id", "driver_id", "conv_rate", "acc_rate"]);
            let status_names: Vec<_> = row.statuses.keys().map(String::as_str).collect();
            assert_eq!(status_names, names);
        }

        let first = &response.field_values[0];
        assert_eq!(first.get("customer_id"), Some((&Value::NULL, FieldStatus::NotFound)));
        assert_eq!(first.get("driver_id"), Some((&Value::Int64Val(1001), FieldStatus::Present)));
        assert_eq!(first.get("conv_rate"), Some((&Value::DoubleVal(0.49), FieldStatus::Present)));

        let second = &response.field_values[1];
        assert_eq!(
            second.get("customer_id"),
            Some((&Value::StringVal("c7".into()), FieldStatus::Present))
        );
        assert_eq!(second.get("acc_rate"), Some((&Value::DoubleVal(0.9), FieldStatus::Present)));
    }
}

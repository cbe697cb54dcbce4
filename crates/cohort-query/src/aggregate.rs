//! Count aggregation and field projection for compound query results.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// `field -> value -> count`.
pub type CountTable = BTreeMap<String, BTreeMap<String, u64>>;

/// Grouping key for a field value. Lists are sorted and comma-joined.
pub fn canonical_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().filter_map(canonical_value).collect();
            parts.sort();
            Some(parts.join(","))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Groups `records` by each of `fields`.
///
/// Records without a value for a field do not contribute to that field, and
/// a field no record carries is absent from the table.
pub fn count_fields<'a, I>(records: I, fields: &[String]) -> CountTable
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut table = CountTable::new();
    for record in records {
        for field in fields {
            let Some(key) = record.get(field).and_then(canonical_value) else {
                continue;
            };
            *table.entry(field.clone()).or_default().entry(key).or_insert(0) += 1;
        }
    }
    table
}

/// Keeps only `fields` on each record. Records left empty are dropped.
pub fn project_fields(records: Vec<Value>, fields: &[String]) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| {
            let Value::Object(map) = record else {
                return None;
            };
            let kept: Map<String, Value> = map
                .into_iter()
                .filter(|(k, _)| fields.iter().any(|f| f == k))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        })
        .collect()
}

/// Wire form of a count table: a one-element list holding the table, or an
/// empty list when nothing was counted.
pub fn counts_to_json(table: &CountTable) -> Value {
    if table.is_empty() {
        return Value::Array(Vec::new());
    }
    let object: Map<String, Value> = table
        .iter()
        .map(|(field, counts)| {
            let counts: Map<String, Value> = counts
                .iter()
                .map(|(value, n)| (value.clone(), Value::from(*n)))
                .collect();
            (field.clone(), Value::Object(counts))
        })
        .collect();
    Value::Array(vec![Value::Object(object)])
}

/// Reads a count table back from its wire form.
///
/// Every element of the list is merged, so concatenated peer bodies read
/// correctly. Non-integer cells are skipped.
pub fn counts_from_json(value: &Value) -> Option<CountTable> {
    let mut table = CountTable::new();
    for element in value.as_array()? {
        for (field, counts) in element.as_object()? {
            let entry = table.entry(field.clone()).or_default();
            for (key, n) in counts.as_object()? {
                if let Some(n) = n.as_u64() {
                    *entry.entry(key.clone()).or_insert(0) += n;
                }
            }
        }
    }
    Some(table)
}

/// Adds `other` into `into`, cell by cell.
pub fn merge_counts(into: &mut CountTable, other: &CountTable) {
    for (field, counts) in other {
        let entry = into.entry(field.clone()).or_default();
        for (key, n) in counts {
            *entry.entry(key.clone()).or_insert(0) += n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_count_groups_by_value() {
        let records = [
            json!({"tumorGrade": "I", "stage": "2"}),
            json!({"tumorGrade": "II"}),
            json!({"tumorGrade": "I", "stage": null}),
        ];
        let table = count_fields(&records, &fields(&["tumorGrade", "stage"]));
        assert_eq!(table["tumorGrade"]["I"], 2);
        assert_eq!(table["tumorGrade"]["II"], 1);
        assert_eq!(table["stage"].len(), 1);
        assert!(!table.contains_key("absent"));
    }

    #[test]
    fn test_list_values_are_canonicalized() {
        let records = [json!({"sites": ["lung", "brain"]}), json!({"sites": ["brain", "lung"]})];
        let table = count_fields(&records, &fields(&["sites"]));
        assert_eq!(table["sites"]["brain,lung"], 2);
    }

    #[test]
    fn test_projection_keeps_named_keys() {
        let projected = project_fields(
            vec![json!({"id": "a", "patientId": "p1"}), json!({"id": "b"})],
            &fields(&["patientId"]),
        );
        assert_eq!(projected, vec![json!({"patientId": "p1"})]);
    }

    #[test]
    fn test_json_shape() {
        let records = [json!({"g": "x"})];
        let table = count_fields(&records, &fields(&["g"]));
        let wire = counts_to_json(&table);
        assert_eq!(wire, json!([{"g": {"x": 1}}]));
        assert_eq!(counts_from_json(&wire), Some(table));
        assert_eq!(counts_from_json(&json!({"g": 1})), None);
        assert_eq!(counts_to_json(&CountTable::new()), json!([]));
    }

    fn arb_table() -> impl Strategy<Value = CountTable> {
        prop::collection::btree_map(
            "[a-c]",
            prop::collection::btree_map("[x-z]", 0u64..100, 0..3),
            0..3,
        )
    }

    proptest! {
        #[test]
        fn prop_merge_sums_every_cell(a in arb_table(), b in arb_table()) {
            let mut merged = a.clone();
            merge_counts(&mut merged, &b);
            for (field, counts) in &merged {
                for (key, n) in counts {
                    let left = a.get(field).and_then(|c| c.get(key)).copied().unwrap_or(0);
                    let right = b.get(field).and_then(|c| c.get(key)).copied().unwrap_or(0);
                    prop_assert_eq!(*n, left + right);
                }
            }
        }
    }
}

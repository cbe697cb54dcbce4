//! Filter evaluation.
//!
//! A filter is `{field, operator, value}` or `{field, operator: "in", values}`.
//! Filters are validated once into [`Filter`] and then applied to any
//! [`Filterable`] record; a record passes iff every filter holds.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use cohort_store::ClinicalRecord;
use cohort_types::{ClinicalKind, Tier};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueryError, Result};

/// A filter as received on the wire, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

impl RawFilter {
    /// `field <op> value`.
    pub fn compare(field: &str, operator: &str, value: impl Into<Value>) -> Self {
        Self {
            field: Some(field.to_string()),
            operator: Some(operator.to_string()),
            value: Some(value.into()),
            values: None,
        }
    }

    /// `field in values`.
    pub fn one_of<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            field: Some(field.to_string()),
            operator: Some("in".to_string()),
            value: None,
            values: Some(Value::Array(values.into_iter().map(Into::into).collect())),
        }
    }
}

/// Comparison operators. Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Contains,
    In,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "<" | "lt" => Some(Self::Lt),
            ">" | "gt" => Some(Self::Gt),
            "<=" | "le" => Some(Self::Le),
            ">=" | "ge" => Some(Self::Ge),
            "=" | "==" | "eq" => Some(Self::Eq),
            "!=" | "ne" => Some(Self::Ne),
            "contains" => Some(Self::Contains),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Contains => "contains",
            Self::In => "in",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    One(Value),
    Many(Vec<Value>),
}

/// A validated filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

/// Result of looking a field up on a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attribute<'a> {
    /// The record kind has no such field.
    Unknown,
    /// The field exists for the kind but this record has no value.
    Missing,
    Present(&'a Value),
}

/// Field access for filter evaluation.
pub trait Filterable {
    fn attribute(&self, field: &str) -> Attribute<'_>;
}

/// A clinical record seen at a caller tier.
///
/// Fields above the tier read as [`Attribute::Missing`] so that filters
/// cannot probe values the caller is not allowed to see.
#[derive(Debug, Clone, Copy)]
pub struct TieredView<'a> {
    pub record: &'a ClinicalRecord,
    pub tier: Tier,
}

impl Filterable for TieredView<'_> {
    fn attribute(&self, field: &str) -> Attribute<'_> {
        if !self.record.kind.has_field(field) {
            return Attribute::Unknown;
        }
        match self.record.field(field) {
            Some(f) if self.tier.permits(f.tier) => Attribute::Present(&f.value),
            _ => Attribute::Missing,
        }
    }
}

impl Filter {
    /// Applies the validation rules to a wire filter.
    pub fn validate(raw: &RawFilter) -> Result<Self> {
        let field = raw
            .field
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| QueryError::bad_request("filter requires 'field'"))?;
        let op_name = raw
            .operator
            .as_deref()
            .ok_or_else(|| QueryError::bad_request("filter requires 'operator'"))?;
        let operator = Operator::parse(op_name)
            .ok_or_else(|| QueryError::bad_request(format!("unknown operator '{op_name}'")))?;

        let operand = match (&raw.value, &raw.values) {
            (Some(_), Some(_)) => {
                return Err(QueryError::bad_request(
                    "filter may not have both 'value' and 'values'",
                ));
            }
            (None, None) => {
                return Err(QueryError::bad_request(
                    "filter requires one of 'value' or 'values'",
                ));
            }
            (Some(_), None) if operator == Operator::In => {
                return Err(QueryError::bad_request(
                    "operator 'in' requires 'values', not 'value'",
                ));
            }
            (None, Some(_)) if operator != Operator::In => {
                return Err(QueryError::bad_request("'values' requires operator 'in'"));
            }
            (Some(value), None) => Operand::One(value.clone()),
            (None, Some(Value::Array(values))) => Operand::Many(values.clone()),
            (None, Some(_)) => {
                return Err(QueryError::bad_request("'values' must be a list"));
            }
        };

        Ok(Self {
            field: field.to_string(),
            operator,
            operand,
        })
    }

    /// Validates a list of wire filters.
    pub fn validate_all(raw: &[RawFilter]) -> Result<Vec<Self>> {
        raw.iter().map(Self::validate).collect()
    }

    /// Rejects filters naming fields that `kind` does not have.
    pub fn check_field(&self, kind: ClinicalKind) -> Result<()> {
        if kind.has_field(&self.field) {
            Ok(())
        } else {
            Err(QueryError::BadFilterKey(format!(
                "{} has no field '{}'",
                kind, self.field
            )))
        }
    }

    /// Evaluates this filter against `record`.
    pub fn matches<T: Filterable + ?Sized>(&self, record: &T) -> Result<bool> {
        let actual = match record.attribute(&self.field) {
            Attribute::Unknown => {
                return Err(QueryError::BadFilterKey(self.field.clone()));
            }
            Attribute::Missing => None,
            Attribute::Present(value) if value.is_null() => None,
            Attribute::Present(value) => Some(value),
        };

        match (&self.operand, self.operator) {
            (Operand::Many(values), Operator::In) => match actual {
                None => Ok(false),
                Some(a @ (Value::Array(_) | Value::Object(_))) => Err(self.type_error(a)),
                Some(a) => Ok(values.iter().any(|v| loosely_equal(a, v))),
            },
            (Operand::One(expected), Operator::Eq) => {
                Ok(actual.is_some_and(|a| loosely_equal(a, expected)))
            }
            (Operand::One(expected), Operator::Ne) => {
                Ok(!actual.is_some_and(|a| loosely_equal(a, expected)))
            }
            (Operand::One(expected), Operator::Contains) => match actual {
                None => Ok(false),
                Some(Value::String(s)) => match expected {
                    Value::String(needle) => Ok(s.contains(needle.as_str())),
                    other => Err(self.type_error(other)),
                },
                Some(Value::Array(items)) => Ok(items.iter().any(|i| loosely_equal(i, expected))),
                Some(other) => Err(self.type_error(other)),
            },
            (Operand::One(expected), op) => {
                let Some(a) = actual else {
                    return Ok(false);
                };
                let ordering = order(a, expected).ok_or_else(|| self.type_error(a))?;
                Ok(match op {
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Le => ordering != Ordering::Greater,
                    Operator::Ge => ordering != Ordering::Less,
                    _ => false,
                })
            }
            (Operand::Many(_), _) => Err(QueryError::bad_request("'values' requires operator 'in'")),
        }
    }

    fn type_error(&self, value: &Value) -> QueryError {
        let operand = match &self.operand {
            Operand::One(v) => type_name(v),
            Operand::Many(_) => "list",
        };
        QueryError::BadInputType(format!(
            "cannot apply '{}' to field '{}' ({}) with {} operand",
            self.operator,
            self.field,
            type_name(value),
            operand
        ))
    }
}

/// Evaluates every filter against `record`.
pub fn matches_all<T: Filterable + ?Sized>(filters: &[Filter], record: &T) -> Result<bool> {
    for filter in filters {
        if !filter.matches(record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use test_case::test_case;

    struct Row(Map<String, Value>);

    impl Filterable for Row {
        fn attribute(&self, field: &str) -> Attribute<'_> {
            match field {
                "absent" => Attribute::Missing,
                _ => self.0.get(field).map_or(Attribute::Unknown, Attribute::Present),
            }
        }
    }

    fn row() -> Row {
        let Value::Object(map) = json!({
            "grade": "II",
            "age": 54,
            "weight": 61.5,
            "sites": ["liver", "bone"],
            "smoker": false,
            "notes": "stage II ductal"
        }) else {
            unreachable!()
        };
        Row(map)
    }

    fn eval(raw: RawFilter) -> Result<bool> {
        Filter::validate(&raw)?.matches(&row())
    }

    #[test_case("=", json!("II"), true; "eq match")]
    #[test_case("==", json!("I"), false; "eq alias no match")]
    #[test_case("EQ", json!("II"), true; "eq word uppercase")]
    #[test_case("!=", json!("I"), true; "ne")]
    #[test_case("ne", json!("II"), false; "ne word")]
    #[test_case("<", json!("III"), true; "string lt")]
    #[test_case(">=", json!("II"), true; "string ge")]
    #[test_case("gt", json!("I"), true; "string gt word")]
    fn test_string_operators(op: &str, value: Value, expected: bool) {
        assert_eq!(eval(RawFilter::compare("grade", op, value)).unwrap(), expected);
    }

    #[test_case("<", json!(60), true; "lt")]
    #[test_case("<=", json!(54), true; "le equal")]
    #[test_case(">", json!(54), false; "gt equal")]
    #[test_case("ge", json!(54.0), true; "ge float")]
    #[test_case("=", json!(54.0), true; "int equals float")]
    #[test_case("lt", json!(54), false; "lt word")]
    fn test_numeric_operators(op: &str, value: Value, expected: bool) {
        assert_eq!(eval(RawFilter::compare("age", op, value)).unwrap(), expected);
    }

    #[test]
    fn test_contains_on_string_and_list() {
        assert!(eval(RawFilter::compare("notes", "contains", "ductal")).unwrap());
        assert!(!eval(RawFilter::compare("notes", "contains", "lobular")).unwrap());
        assert!(eval(RawFilter::compare("sites", "contains", "bone")).unwrap());
        assert!(!eval(RawFilter::compare("sites", "CONTAINS", "lung")).unwrap());
    }

    #[test]
    fn test_in_operator() {
        assert!(eval(RawFilter::one_of("grade", ["I", "II"])).unwrap());
        assert!(!eval(RawFilter::one_of("grade", ["III"])).unwrap());
        assert!(eval(RawFilter::one_of("age", [json!(54)])).unwrap());
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        assert!(!eval(RawFilter::one_of("grade", Vec::<Value>::new())).unwrap());
    }

    #[test]
    fn test_type_mismatch_is_bad_input_type() {
        let err = eval(RawFilter::compare("age", "<", "sixty")).unwrap_err();
        assert_eq!(err.code(), "BadInputType");
        let err = eval(RawFilter::compare("age", "contains", "5")).unwrap_err();
        assert_eq!(err.code(), "BadInputType");
        let err = eval(RawFilter::one_of("sites", ["bone"])).unwrap_err();
        assert_eq!(err.code(), "BadInputType");
    }

    #[test]
    fn test_unknown_field_is_bad_filter_key() {
        let err = eval(RawFilter::compare("shoeSize", "=", 9)).unwrap_err();
        assert_eq!(err.code(), "BadFilterKey");
    }

    #[test]
    fn test_missing_value_semantics() {
        assert!(!eval(RawFilter::compare("absent", "=", "x")).unwrap());
        assert!(eval(RawFilter::compare("absent", "!=", "x")).unwrap());
        assert!(!eval(RawFilter::compare("absent", "<", 3)).unwrap());
        assert!(!eval(RawFilter::one_of("absent", ["x"])).unwrap());
    }

    #[test]
    fn test_boolean_equality() {
        assert!(eval(RawFilter::compare("smoker", "=", false)).unwrap());
        assert!(!eval(RawFilter::compare("smoker", "=", "false")).unwrap());
    }

    #[test_case(RawFilter { field: None, operator: Some("=".into()), value: Some(json!(1)), values: None }; "no field")]
    #[test_case(RawFilter { field: Some("age".into()), operator: None, value: Some(json!(1)), values: None }; "no operator")]
    #[test_case(RawFilter { field: Some("age".into()), operator: Some("=".into()), value: Some(json!(1)), values: Some(json!([1])) }; "both value and values")]
    #[test_case(RawFilter { field: Some("age".into()), operator: Some("=".into()), value: None, values: None }; "neither")]
    #[test_case(RawFilter { field: Some("age".into()), operator: Some("in".into()), value: Some(json!(1)), values: None }; "value with in")]
    #[test_case(RawFilter { field: Some("age".into()), operator: Some("=".into()), value: None, values: Some(json!([1])) }; "values without in")]
    #[test_case(RawFilter { field: Some("age".into()), operator: Some("in".into()), value: None, values: Some(json!(1)) }; "values not a list")]
    #[test_case(RawFilter { field: Some("age".into()), operator: Some("~".into()), value: Some(json!(1)), values: None }; "unknown operator")]
    fn test_validation_rejects(raw: RawFilter) {
        assert_eq!(Filter::validate(&raw).unwrap_err().code(), "BadRequest");
    }

    #[test]
    fn test_matches_all_is_conjunction() {
        let filters = Filter::validate_all(&[
            RawFilter::compare("grade", "=", "II"),
            RawFilter::compare("age", ">", 50),
        ])
        .unwrap();
        assert!(matches_all(&filters, &row()).unwrap());

        let filters = Filter::validate_all(&[
            RawFilter::compare("grade", "=", "II"),
            RawFilter::compare("age", ">", 60),
        ])
        .unwrap();
        assert!(!matches_all(&filters, &row()).unwrap());
    }

    #[test]
    fn test_check_field_against_kind() {
        let filter = Filter::validate(&RawFilter::compare("cancerType", "=", "breast")).unwrap();
        assert!(filter.check_field(ClinicalKind::Diagnoses).is_ok());
        assert_eq!(
            filter.check_field(ClinicalKind::Patients).unwrap_err().code(),
            "BadFilterKey"
        );
    }
}

//! Feature records: one subject's named raw feature values.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Normalize a column or field name the same way for datasets, configs and requests.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A single raw feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl FeatureValue {
    /// Numeric view of the value, if it is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            Self::Categorical(_) => None,
        }
    }

    /// Categorical view of the value, if it is a string.
    #[must_use]
    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Numeric(_) => None,
            Self::Categorical(s) => Some(s.as_str()),
        }
    }

    /// Short kind name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "number",
            Self::Categorical(_) => "string",
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Categorical(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Numeric(v)
    }
}

impl From<u8> for FeatureValue {
    fn from(v: u8) -> Self {
        Self::Numeric(f64::from(v))
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Categorical(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        Self::Categorical(v)
    }
}

/// One row of named feature values representing a single prediction subject.
///
/// Keys are normalized on insertion, so `"totChol"` and `" totchol "` address
/// the same feature. Deserialization rejects an object naming one feature twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordFields", into = "BTreeMap<String, FeatureValue>")]
pub struct FeatureRecord {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value; returns the previous one.
    pub fn insert(&mut self, name: &str, value: impl Into<FeatureValue>) -> Option<FeatureValue> {
        self.values.insert(normalize_name(name), value.into())
    }

    /// Remove a value.
    pub fn remove(&mut self, name: &str) -> Option<FeatureValue> {
        self.values.remove(&normalize_name(name))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(&normalize_name(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&normalize_name(name))
    }

    /// Normalized field names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a `name=value` assignment, typing the value as numeric when it parses.
    ///
    /// # Errors
    /// Returns an error message if the assignment has no `=` or an empty name.
    pub fn parse_assignment(assignment: &str) -> Result<(String, FeatureValue), String> {
        let (name, raw) = assignment
            .split_once('=')
            .ok_or_else(|| format!("Expected name=value, got {assignment:?}"))?;
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(format!("Empty field name in {assignment:?}"));
        }
        let raw = raw.trim();
        let value = match raw.parse::<f64>() {
            Ok(v) => FeatureValue::Numeric(v),
            Err(_) => FeatureValue::Categorical(raw.to_string()),
        };
        Ok((name, value))
    }
}

/// Two request fields that name the same feature once normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Field {name:?} is given more than once")]
pub struct DuplicateField {
    /// Normalized name
    pub name: String,
}

/// Request fields in input order, before normalization.
///
/// Unlike a map, this keeps repeated keys so they can be rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFields(pub Vec<(String, FeatureValue)>);

impl<'de> Deserialize<'de> for RecordFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = RecordFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of feature values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RecordFields, A::Error> {
                let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, FeatureValue>()? {
                    fields.push(entry);
                }
                Ok(RecordFields(fields))
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

impl TryFrom<RecordFields> for FeatureRecord {
    type Error = DuplicateField;

    fn try_from(fields: RecordFields) -> Result<Self, DuplicateField> {
        let mut record = Self::new();
        for (name, value) in fields.0 {
            if record.insert(&name, value).is_some() {
                return Err(DuplicateField {
                    name: normalize_name(&name),
                });
            }
        }
        Ok(record)
    }
}

impl From<FeatureRecord> for BTreeMap<String, FeatureValue> {
    fn from(record: FeatureRecord) -> Self {
        record.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_normalized() {
        let record = FeatureRecord::new().with(" totChol ", 200.0).with("BMI", 25.0);
        assert!(record.contains("totchol"));
        assert!(record.contains("bmi"));
        assert_eq!(record.get("TOTCHOL"), Some(&FeatureValue::Numeric(200.0)));
        assert_eq!(record.names().collect::<Vec<_>>(), vec!["bmi", "totchol"]);
    }

    #[test]
    fn test_json_untagged_values() {
        let record: FeatureRecord =
            serde_json::from_str(r#"{"Gender": "Male", "age": 67}"#).expect("Should parse");
        assert_eq!(record.get("gender"), Some(&FeatureValue::Categorical("Male".into())));
        assert_eq!(record.get("age").and_then(FeatureValue::as_f64), Some(67.0));
    }

    #[test]
    fn test_names_colliding_after_normalization_are_rejected() {
        let json = r#"{"age": 60, "BMI": 25.0, "bmi": 49.0}"#;
        let err = serde_json::from_str::<FeatureRecord>(json).expect_err("Should reject");
        assert!(err.to_string().contains("\"bmi\" is given more than once"));

        let fields: RecordFields = serde_json::from_str(r#"{"sysBP": 120, "sysBP": 180}"#).expect("Should parse");
        assert_eq!(fields.0.len(), 2);
        assert_eq!(
            FeatureRecord::try_from(fields),
            Err(DuplicateField {
                name: "sysbp".to_string()
            })
        );
    }

    #[test]
    fn test_parse_assignment() {
        let (name, value) = FeatureRecord::parse_assignment("sysBP=120").expect("Should parse");
        assert_eq!(name, "sysbp");
        assert_eq!(value, FeatureValue::Numeric(120.0));

        let (_, value) =
            FeatureRecord::parse_assignment("smoking_status=Never smoked").expect("Should parse");
        assert_eq!(value.as_category(), Some("Never smoked"));

        assert!(FeatureRecord::parse_assignment("novalue").is_err());
        assert!(FeatureRecord::parse_assignment(" =3").is_err());
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::validate_field_name;
use crate::error::{ReportError, ReportResult};

/// Field-set update (`$set`): assigns each field, leaving the rest of the
/// document untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSetFields")]
pub struct SetFields {
    fields: Vec<(String, Value)>,
}

#[derive(Deserialize)]
struct RawSetFields {
    fields: Vec<(String, Value)>,
}

impl TryFrom<RawSetFields> for SetFields {
    type Error = ReportError;

    fn try_from(raw: RawSetFields) -> ReportResult<Self> {
        Self::new(raw.fields)
    }
}

impl SetFields {
    pub fn new<I, S>(fields: I) -> ReportResult<Self>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let fields: Vec<(String, Value)> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if fields.is_empty() {
            return Err(ReportError::invalid("update must set at least one field"));
        }
        for (i, (name, _)) in fields.iter().enumerate() {
            validate_field_name(name)?;
            if name == "_id" {
                return Err(ReportError::invalid("the identity key cannot be updated"));
            }
            if fields[..i].iter().any(|(other, _)| other == name) {
                return Err(ReportError::invalid(format!(
                    "field '{}' set twice",
                    name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn single(field: impl Into<String>, value: impl Into<Value>) -> ReportResult<Self> {
        Self::new([(field.into(), value.into())])
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_fields_validation() {
        assert!(SetFields::new(Vec::<(String, Value)>::new()).is_err());
        assert!(SetFields::single("_id", 1).is_err());
        assert!(SetFields::new([("price", json!(1)), ("price", json!(2))]).is_err());

        let set = SetFields::single("price", 25.0).unwrap();
        assert_eq!(set.fields(), &[("price".to_string(), json!(25.0))]);
    }

    #[test]
    fn test_deserialize_runs_validation() {
        assert!(serde_json::from_value::<SetFields>(json!({"fields": []})).is_err());
        assert!(serde_json::from_value::<SetFields>(json!({"fields": [["_id", 1]]})).is_err());

        let set: SetFields = serde_json::from_value(json!({"fields": [["price", 9.5]]})).unwrap();
        assert_eq!(set.fields(), &[("price".to_string(), json!(9.5))]);
    }
}

//! JSON request-body parsing for insert and update.
//!
//! A body is either a single object or an array of objects; both flatten
//! into a list of maps so the downstream SQL generation has one shape to
//! deal with.

use serde_json::Value;

use super::QueryError;
use crate::database::Object;

/// The VALUES part of a bulk insert.
///
/// For `INSERT INTO a (c1, c2) VALUES (?,?),(?,?)`: `next_index` is 5,
/// `columns` is `["c1", "c2"]`, `placeholders` is `["(?,?)", "(?,?)"]`, and
/// `args` holds the four values in column order.
#[derive(Debug)]
pub struct ValuesQuery {
    /// Placeholder index for the next SQL fragment; args count plus one.
    pub next_index: u32,
    pub columns: Vec<String>,
    pub placeholders: Vec<String>,
    pub args: Vec<Value>,
}

/// The SET part of an update: `a = ?, b = ?` plus its arguments.
#[derive(Debug)]
pub struct SetQuery {
    /// Placeholder index for the next SQL fragment.
    pub next_index: u32,
    pub query: String,
    pub args: Vec<Value>,
}

/// A decoded request body, flattened to a list of objects.
#[derive(Debug, Default)]
pub struct PostData {
    objects: Vec<Object>,
}

impl PostData {
    /// Decodes a body, guessing single-object vs array from the first
    /// non-whitespace byte and falling back to trying both.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, QueryError> {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::single(bytes),
            Some(b'[') => Self::many(bytes),
            _ => Self::many(bytes).or_else(|_| Self::single(bytes)),
        }
    }

    fn single(bytes: &[u8]) -> Result<Self, QueryError> {
        let object: Object =
            serde_json::from_slice(bytes).map_err(|err| QueryError::Json(err.to_string()))?;
        Ok(Self {
            objects: vec![object],
        })
    }

    fn many(bytes: &[u8]) -> Result<Self, QueryError> {
        let objects: Vec<Object> =
            serde_json::from_slice(bytes).map_err(|err| QueryError::Json(err.to_string()))?;
        Ok(Self { objects })
    }

    /// Number of objects in the body; one placeholder group per object.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Sets (or overwrites) a column on every object; used to scope writes
    /// to the authenticated user.
    pub fn set(&mut self, column: &str, value: Value) {
        for object in &mut self.objects {
            object.insert(column.to_string(), value.clone());
        }
    }

    /// Builds the VALUES clause for insertion.
    ///
    /// The first object's keys become the column list; every other object
    /// must have exactly the same key set.
    pub fn values_query(&self) -> Result<ValuesQuery, QueryError> {
        let first = self.objects.first().ok_or(QueryError::Empty)?;
        let columns: Vec<String> = first.keys().cloned().collect();

        let mut placeholders = Vec::with_capacity(self.objects.len());
        let mut args = Vec::with_capacity(columns.len() * self.objects.len());
        let mut index: u32 = 1;
        for (i, object) in self.objects.iter().enumerate() {
            if i > 0 && !ident_keys(object, &columns) {
                let rendered = serde_json::to_string(object).unwrap_or_default();
                return Err(QueryError::MixedColumns(rendered));
            }
            // argument order follows the first object's columns
            for column in &columns {
                args.push(object.get(column).cloned().unwrap_or(Value::Null));
                index += 1;
            }
            placeholders.push(format!("({})", vec!["?"; columns.len()].join(",")));
        }

        Ok(ValuesQuery {
            next_index: index,
            columns,
            placeholders,
            args,
        })
    }

    /// Builds the SET clause for an update; requires exactly one object.
    pub fn set_query(&self, start_index: u32) -> Result<SetQuery, QueryError> {
        let [object] = self.objects.as_slice() else {
            return Err(QueryError::BulkUpdate);
        };

        let mut assignments = Vec::with_capacity(object.len());
        let mut args = Vec::with_capacity(object.len());
        let mut index = start_index;
        for (column, value) in object {
            assignments.push(format!("{column} = ?"));
            args.push(value.clone());
            index += 1;
        }

        Ok(SetQuery {
            next_index: index,
            query: assignments.join(", "),
            args,
        })
    }
}

fn ident_keys(object: &Object, columns: &[String]) -> bool {
    object.len() == columns.len() && columns.iter().all(|column| object.contains_key(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_single_object() {
        let data = PostData::from_slice(br#"{"a": 1, "b": "x"}"#).unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_from_slice_array() {
        let data = PostData::from_slice(br#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_from_slice_leading_whitespace() {
        let data = PostData::from_slice(b"  \n [{\"a\": 1}]").unwrap();
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_from_slice_garbage() {
        assert!(PostData::from_slice(b"not json").is_err());
        assert!(PostData::from_slice(b"").is_err());
    }

    #[test]
    fn test_values_query() {
        let data = PostData::from_slice(br#"[{"a": 1, "b": "x"}, {"b": "y", "a": 2}]"#).unwrap();
        let values = data.values_query().unwrap();
        assert_eq!(values.next_index, 5);
        assert_eq!(values.columns, vec!["a", "b"]);
        assert_eq!(values.placeholders, vec!["(?,?)", "(?,?)"]);
        assert_eq!(
            values.args,
            vec![
                Value::from(1),
                Value::String("x".to_string()),
                Value::from(2),
                Value::String("y".to_string()),
            ]
        );
    }

    #[test]
    fn test_values_query_rejects_mixed_columns() {
        let data = PostData::from_slice(br#"[{"a": 1}, {"b": 2}]"#).unwrap();
        assert!(matches!(
            data.values_query(),
            Err(QueryError::MixedColumns(_))
        ));

        let data = PostData::from_slice(br#"[{"a": 1}, {"a": 2, "b": 3}]"#).unwrap();
        assert!(data.values_query().is_err());
    }

    #[test]
    fn test_values_query_empty_array() {
        let data = PostData::from_slice(b"[]").unwrap();
        assert!(matches!(data.values_query(), Err(QueryError::Empty)));
    }

    #[test]
    fn test_set_query() {
        let data = PostData::from_slice(br#"{"a": "a", "b": "b"}"#).unwrap();
        let set = data.set_query(1).unwrap();
        assert_eq!(set.next_index, 3);
        assert_eq!(set.query, "a = ?, b = ?");
        assert_eq!(
            set.args,
            vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_query_refuses_bulk() {
        let data = PostData::from_slice(br#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert!(matches!(data.set_query(1), Err(QueryError::BulkUpdate)));
    }

    #[test]
    fn test_set_overwrites_every_object() {
        let mut data = PostData::from_slice(br#"[{"a": 1, "user_id": 9}, {"a": 2}]"#).unwrap();
        data.set("user_id", Value::from(1));
        let values = data.values_query().unwrap();
        assert_eq!(values.columns, vec!["a", "user_id"]);
        assert_eq!(
            values.args,
            vec![
                Value::from(1),
                Value::from(1),
                Value::from(2),
                Value::from(1),
            ]
        );
    }
}

use bigquery_model_rs::ErrorProto;
use bigquery_model_rs::table_data::{InsertRow, TableDataInsertAllRequest, TableDataInsertAllResponse};
use serde_json::{Map, Value};

use crate::Error;

/// How the per-row `insertId` used for best effort de-duplication is filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InsertIds {
    /// A random v4 uuid per row.
    #[default]
    Generate,
    /// No insert ids at all.
    Skip,
    /// One caller supplied id per row, in order.
    Explicit(Vec<Box<str>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct InsertRowOptions {
    #[builder(default)]
    pub skip_invalid_rows: bool,
    #[builder(default)]
    pub ignore_unknown_values: bool,
    #[builder(default)]
    pub insert_ids: InsertIds,
}

/// Serializes `rows` and pairs each with its insert id.
pub(crate) fn build_request<R>(
    rows: R,
    options: &InsertRowOptions,
) -> crate::Result<TableDataInsertAllRequest>
where
    R: IntoIterator,
    R::Item: serde::Serialize,
{
    let rows = rows
        .into_iter()
        .map(|row| match serde_json::to_value(row)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::invalid_argument(format!(
                "rows must serialize to JSON objects, got '{other}'"
            ))),
        })
        .collect::<crate::Result<Vec<_>>>()?;

    if rows.is_empty() {
        return Err(Error::invalid_argument("no rows provided"));
    }

    let insert_ids: Vec<Option<Box<str>>> = match options.insert_ids {
        InsertIds::Generate => rows
            .iter()
            .map(|_| Some(uuid::Uuid::new_v4().to_string().into_boxed_str()))
            .collect(),
        InsertIds::Skip => vec![None; rows.len()],
        InsertIds::Explicit(ref ids) if ids.len() == rows.len() => {
            ids.iter().cloned().map(Some).collect()
        }
        InsertIds::Explicit(ref ids) => {
            return Err(Error::invalid_argument(format!(
                "insert ids must be the same size as rows ({} != {})",
                ids.len(),
                rows.len()
            )));
        }
    };

    Ok(TableDataInsertAllRequest {
        skip_invalid_rows: options.skip_invalid_rows,
        ignore_unknown_values: options.ignore_unknown_values,
        template_suffix: None,
        rows: rows
            .into_iter()
            .zip(insert_ids)
            .map(|(json, insert_id)| InsertRow { insert_id, json })
            .collect(),
    })
}

/// Result of a streaming insert, pairing per-row errors with the rows sent.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertResponse {
    rows: Vec<Map<String, Value>>,
    response: TableDataInsertAllResponse,
}

/// Errors reported for a single row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertError<'a> {
    pub index: usize,
    pub row: Option<&'a Map<String, Value>>,
    pub errors: &'a [ErrorProto],
}

impl InsertResponse {
    pub(crate) fn new(request: TableDataInsertAllRequest, response: TableDataInsertAllResponse) -> Self {
        Self {
            rows: request.rows.into_iter().map(|row| row.json).collect(),
            response,
        }
    }

    pub fn success(&self) -> bool {
        self.response.insert_errors.is_empty()
    }

    pub fn insert_count(&self) -> usize {
        self.rows.len().saturating_sub(self.error_count())
    }

    pub fn error_count(&self) -> usize {
        self.response.insert_errors.len()
    }

    pub fn insert_errors(&self) -> impl Iterator<Item = InsertError<'_>> + '_ {
        self.response.insert_errors.iter().map(|err| InsertError {
            index: err.index,
            row: self.rows.get(err.index),
            errors: &err.errors,
        })
    }

    pub fn error_rows(&self) -> impl Iterator<Item = &Map<String, Value>> + '_ {
        self.insert_errors().filter_map(|err| err.row)
    }

    /// The errors reported for the row at `index`, empty if it was inserted.
    pub fn errors_for(&self, index: usize) -> &[ErrorProto] {
        self.response
            .insert_errors
            .iter()
            .find(|err| err.index == index)
            .map(|err| err.errors.as_slice())
            .unwrap_or_default()
    }

    pub fn into_inner(self) -> TableDataInsertAllResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use bigquery_model_rs::table_data::InsertErrors;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_generated_ids_are_unique() -> crate::Result<()> {
        let rows = [json!({ "a": 1 }), json!({ "a": 2 })];
        let request = build_request(rows, &InsertRowOptions::default())?;

        let ids = request
            .rows
            .iter()
            .map(|row| row.insert_id.clone())
            .collect::<Vec<_>>();

        assert!(ids.iter().all(Option::is_some));
        assert_ne!(ids[0], ids[1]);
        Ok(())
    }

    #[test]
    fn test_skip_and_explicit_ids() -> crate::Result<()> {
        let skip = InsertRowOptions::builder().insert_ids(InsertIds::Skip).build();
        let request = build_request([json!({ "a": 1 })], &skip)?;
        assert_eq!(request.rows[0].insert_id, None);

        let explicit = InsertRowOptions::builder()
            .insert_ids(InsertIds::Explicit(vec!["x".into()]))
            .skip_invalid_rows(true)
            .build();
        let request = build_request([json!({ "a": 1 })], &explicit)?;
        assert_eq!(request.rows[0].insert_id.as_deref(), Some("x"));
        assert!(request.skip_invalid_rows);
        Ok(())
    }

    #[test]
    fn test_invalid_requests() {
        let err = build_request(Vec::<Value>::new(), &InsertRowOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = build_request([json!([1, 2])], &InsertRowOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let mismatched = InsertRowOptions::builder()
            .insert_ids(InsertIds::Explicit(vec!["x".into(), "y".into()]))
            .build();
        let err = build_request([json!({ "a": 1 })], &mismatched).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_response_maps_errors_to_rows() -> crate::Result<()> {
        let request = build_request(
            [json!({ "a": 1 }), json!({ "a": "bad" })],
            &InsertRowOptions::default(),
        )?;

        let response = InsertResponse::new(request, TableDataInsertAllResponse {
            kind: None,
            insert_errors: vec![InsertErrors {
                index: 1,
                errors: vec![ErrorProto::new("no such field").with_reason("invalid")],
            }],
        });

        assert!(!response.success());
        assert_eq!(response.insert_count(), 1);
        assert_eq!(response.error_count(), 1);
        assert_eq!(response.error_rows().next().unwrap()["a"], "bad");
        assert!(response.errors_for(0).is_empty());
        assert_eq!(response.errors_for(1)[0].reason.as_deref(), Some("invalid"));
        Ok(())
    }
}

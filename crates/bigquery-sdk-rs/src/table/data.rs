use bigquery_model_rs::TableReference;
use bigquery_model_rs::table::{FieldMode, FieldType, TableFieldSchema, TableSchema};
use bigquery_model_rs::table_data::{Row, TableDataList};
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::Client;
use crate::service::PageRequest;

/// One page of table rows, decoded against the table schema.
#[derive(Debug, Clone)]
pub struct Data {
    client: Client,
    table: TableReference,
    schema: TableSchema,
    rows: Vec<Map<String, Value>>,
    total: Option<u64>,
    token: Option<Box<str>>,
    max_results: Option<u32>,
}

impl Data {
    pub(crate) fn from_list(
        client: Client,
        table: TableReference,
        schema: TableSchema,
        list: TableDataList,
        max_results: Option<u32>,
    ) -> crate::Result<Self> {
        Ok(Self {
            rows: decode_rows(&schema.fields, &list.rows)?,
            total: list.total_rows,
            token: list.page_token,
            client,
            table,
            schema,
            max_results,
        })
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total row count of the table, not of this page.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> + '_ {
        self.schema.fields.iter().map(|field| &*field.name)
    }

    pub fn has_next(&self) -> bool {
        self.token.is_some()
    }

    /// Fetches the following page, reusing the schema of this one.
    pub async fn next(&self) -> crate::Result<Option<Data>> {
        let Some(ref token) = self.token else {
            return Ok(None);
        };

        let page = PageRequest {
            page_token: Some(token.clone()),
            max_results: self.max_results,
        };

        let list = self
            .client
            .service()
            .list_table_data(&self.table, page)
            .await?;

        Self::from_list(
            self.client.clone(),
            self.table.clone(),
            self.schema.clone(),
            list,
            self.max_results,
        )
        .map(Some)
    }
}

/// Converts rows in the `{"f": [{"v": ..}]}` encoding into JSON objects keyed
/// by field name.
///
/// `INTEGER`, `FLOAT` and `BOOLEAN` become JSON numbers and booleans,
/// `TIMESTAMP` (float seconds since the epoch) becomes an RFC 3339 string.
/// Every other scalar stays the string the service sent.
pub(crate) fn decode_rows(
    fields: &[TableFieldSchema],
    rows: &[Row],
) -> crate::Result<Vec<Map<String, Value>>> {
    rows.iter().map(|row| decode_row(fields, row)).collect()
}

fn decode_row(fields: &[TableFieldSchema], row: &Row) -> crate::Result<Map<String, Value>> {
    let mut map = Map::with_capacity(fields.len());

    for (index, field) in fields.iter().enumerate() {
        let value = match row.f.get(index) {
            Some(cell) => decode_value(field, &cell.v)?,
            None => Value::Null,
        };

        map.insert(field.name.to_string(), value);
    }

    Ok(map)
}

fn decode_value(field: &TableFieldSchema, value: &Value) -> crate::Result<Value> {
    if field.mode == FieldMode::Repeated {
        let Value::Array(items) = value else {
            return Ok(Value::Array(Vec::new()));
        };

        return items
            .iter()
            .map(|item| decode_scalar(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<crate::Result<Vec<_>>>()
            .map(Value::Array);
    }

    decode_scalar(field, value)
}

fn decode_scalar(field: &TableFieldSchema, value: &Value) -> crate::Result<Value> {
    if field.ty == FieldType::Record {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let row: Row = serde_json::from_value(value.clone())?;
        return decode_row(&field.fields, &row).map(Value::Object);
    }

    let Value::String(s) = value else {
        return Ok(value.clone());
    };

    let decoded = match field.ty {
        FieldType::Integer => s.parse::<i64>().ok().map(Value::from),
        FieldType::Float => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        FieldType::Boolean => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        FieldType::Timestamp => decode_timestamp(s).map(Value::String),
        _ => None,
    };

    Ok(decoded.unwrap_or_else(|| value.clone()))
}

fn decode_timestamp(s: &str) -> Option<String> {
    let secs = s.parse::<f64>().ok()?;
    let nanos = (secs * 1e9).round() as i128;

    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema() -> Vec<TableFieldSchema> {
        let mut address = TableFieldSchema::new("address", FieldType::Record, FieldMode::Nullable);
        address.fields = vec![
            TableFieldSchema::new("city", FieldType::String, FieldMode::Nullable),
            TableFieldSchema::new("zip", FieldType::Integer, FieldMode::Nullable),
        ];

        vec![
            TableFieldSchema::new("name", FieldType::String, FieldMode::Required),
            TableFieldSchema::new("age", FieldType::Integer, FieldMode::Nullable),
            TableFieldSchema::new("score", FieldType::Float, FieldMode::Nullable),
            TableFieldSchema::new("active", FieldType::Boolean, FieldMode::Nullable),
            TableFieldSchema::new("seen", FieldType::Timestamp, FieldMode::Nullable),
            TableFieldSchema::new("tags", FieldType::String, FieldMode::Repeated),
            address,
        ]
    }

    #[test]
    fn test_decode_rows() -> crate::Result<()> {
        let row: Row = serde_json::from_value(json!({
            "f": [
                { "v": "alice" },
                { "v": "42" },
                { "v": "1.5" },
                { "v": "true" },
                { "v": "1.7e9" },
                { "v": [{ "v": "a" }, { "v": "b" }] },
                { "v": { "f": [{ "v": "Seattle" }, { "v": null }] } }
            ]
        }))?;

        let rows = decode_rows(&schema(), &[row])?;
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({
                "name": "alice",
                "age": 42,
                "score": 1.5,
                "active": true,
                "seen": "2023-11-14T22:13:20Z",
                "tags": ["a", "b"],
                "address": { "city": "Seattle", "zip": null }
            })
        );
        Ok(())
    }

    #[test]
    fn test_short_rows_and_odd_floats() -> crate::Result<()> {
        let row: Row = serde_json::from_value(json!({
            "f": [{ "v": "bob" }, { "v": null }, { "v": "NaN" }]
        }))?;

        let rows = decode_rows(&schema(), &[row])?;
        assert_eq!(rows[0]["age"], Value::Null);
        assert_eq!(rows[0]["score"], "NaN");
        assert_eq!(rows[0]["tags"], Value::Null);
        assert_eq!(rows[0]["address"], Value::Null);
        Ok(())
    }
}

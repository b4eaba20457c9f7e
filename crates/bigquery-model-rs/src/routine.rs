use time::OffsetDateTime;

use crate::{RoutineReference, util};

/// A user-defined function or a stored procedure.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_reference: Option<RoutineReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_type: Option<RoutineType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<RoutineLanguage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<Argument>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<StandardSqlDataType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_libraries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_body: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub determinism_level: Option<DeterminismLevel>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::timestamp_ms::optional"
    )]
    pub creation_time: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::timestamp_ms::optional"
    )]
    pub last_modified_time: Option<OffsetDateTime>,
}

impl Routine {
    pub fn new(routine_reference: RoutineReference) -> Self {
        Self {
            routine_reference: Some(routine_reference),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutineType {
    ScalarFunction,
    Procedure,
    TableValuedFunction,
    #[serde(other)]
    RoutineTypeUnspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutineLanguage {
    Sql,
    Javascript,
    Python,
    Java,
    Scala,
    #[serde(other)]
    LanguageUnspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeterminismLevel {
    Deterministic,
    NotDeterministic,
    #[serde(other)]
    DeterminismLevelUnspecified,
}

/// An input/output argument of a routine.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument_kind: Option<ArgumentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ArgumentMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<StandardSqlDataType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentKind {
    FixedType,
    AnyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArgumentMode {
    In,
    Out,
    Inout,
}

/// The type of a variable, e.g. a function argument.
///
/// `INT64` is `{ typeKind: "INT64" }`, `ARRAY<STRING>` is
/// `{ typeKind: "ARRAY", arrayElementType: { typeKind: "STRING" } }`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardSqlDataType {
    pub type_kind: Box<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_element_type: Option<Box<StandardSqlDataType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub struct_type: Option<StandardSqlStructType>,
}

impl StandardSqlDataType {
    pub fn new(type_kind: impl Into<Box<str>>) -> Self {
        Self {
            type_kind: type_kind.into(),
            array_element_type: None,
            struct_type: None,
        }
    }

    pub fn array_of(element: StandardSqlDataType) -> Self {
        Self {
            type_kind: "ARRAY".into(),
            array_element_type: Some(Box::new(element)),
            struct_type: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardSqlStructType {
    #[serde(default)]
    pub fields: Vec<StandardSqlField>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardSqlField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Box<str>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<StandardSqlDataType>,
}

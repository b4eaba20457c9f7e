use bigquery_model_rs::table::{FieldMode, FieldType, TableFieldSchema, TableSchema};

use crate::resource::SubResource;

/// Mutable view of a table schema, handed out by table updaters.
///
/// ```
/// # use bigquery_sdk_rs::table::SchemaBuilder;
/// let mut schema = SchemaBuilder::new();
/// schema.string("name").required();
/// schema.integer("age");
/// schema.record("address", |address| {
///     address.string("street");
///     address.string("city").description("city name");
/// })
/// .repeated();
///
/// assert_eq!(schema.headers().collect::<Vec<_>>(), ["name", "age", "address"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaBuilder {
    fields: Vec<TableFieldSchema>,
    changed: bool,
}

macro_rules! impl_field_type_fns {
    ($($fn_name:ident($variant:ident)),* $(,)?) => {
        $(
            #[inline]
            pub fn $fn_name(&mut self, name: impl Into<Box<str>>) -> FieldBuilder<'_> {
                self.add_field(name, FieldType::$variant)
            }
        )*
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(schema: TableSchema) -> Self {
        Self {
            fields: schema.fields,
            changed: false,
        }
    }

    pub fn fields(&self) -> &[TableFieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&TableFieldSchema> {
        self.fields.iter().find(|field| &*field.name == name)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|field| &*field.name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Adds a field, replacing any existing field with the same name in place.
    pub fn add_field(&mut self, name: impl Into<Box<str>>, ty: FieldType) -> FieldBuilder<'_> {
        self.changed = true;

        let field = TableFieldSchema::new(name, ty, FieldMode::Nullable);
        let index = match self.fields.iter().position(|f| f.name == field.name) {
            Some(index) => {
                self.fields[index] = field;
                index
            }
            None => {
                self.fields.push(field);
                self.fields.len() - 1
            }
        };

        FieldBuilder {
            field: &mut self.fields[index],
        }
    }

    impl_field_type_fns! {
        string(String),
        bytes(Bytes),
        integer(Integer),
        float(Float),
        numeric(Numeric),
        big_numeric(BigNumeric),
        boolean(Boolean),
        timestamp(Timestamp),
        time(Time),
        datetime(DateTime),
        date(Date),
        geography(Geography),
        json(Json),
    }

    /// Adds a `RECORD` field whose nested fields are built by `configure`.
    pub fn record<F>(&mut self, name: impl Into<Box<str>>, configure: F) -> FieldBuilder<'_>
    where
        F: FnOnce(&mut SchemaBuilder),
    {
        let mut nested = SchemaBuilder::new();
        configure(&mut nested);

        let builder = self.add_field(name, FieldType::Record);
        builder.field.fields = nested.fields;
        builder
    }

    pub fn remove(&mut self, name: &str) -> Option<TableFieldSchema> {
        let index = self.fields.iter().position(|field| &*field.name == name)?;
        self.changed = true;
        Some(self.fields.remove(index))
    }

    /// Swaps out every field at once.
    pub fn replace(&mut self, schema: TableSchema) {
        self.changed = true;
        self.fields = schema.fields;
    }

    pub fn into_schema(self) -> TableSchema {
        TableSchema {
            fields: self.fields,
        }
    }
}

impl SubResource for SchemaBuilder {
    fn changed(&self) -> bool {
        self.changed
    }
}

pub struct FieldBuilder<'a> {
    field: &'a mut TableFieldSchema,
}

impl FieldBuilder<'_> {
    pub fn required(self) -> Self {
        self.mode(FieldMode::Required)
    }

    pub fn repeated(self) -> Self {
        self.mode(FieldMode::Repeated)
    }

    pub fn mode(self, mode: FieldMode) -> Self {
        self.field.mode = mode;
        self
    }

    pub fn description(self, description: impl Into<Box<str>>) -> Self {
        self.field.description = Some(description.into());
        self
    }

    /// Only meaningful for `STRING` and `BYTES` fields.
    pub fn max_length(self, max_length: u64) -> Self {
        self.field.max_length = Some(max_length);
        self
    }

    /// Only meaningful for `NUMERIC` and `BIGNUMERIC` fields.
    pub fn precision(self, precision: i64, scale: Option<i64>) -> Self {
        self.field.precision = Some(precision);
        self.field.scale = scale;
        self
    }

    pub fn default_value(self, expression: impl Into<Box<str>>) -> Self {
        self.field.default_value_expression = Some(expression.into());
        self
    }
}

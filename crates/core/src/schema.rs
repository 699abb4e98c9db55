//! Declarative object schemas.
//!
//! An [`ObjectSchema`] renders itself as a JSON Schema document, which is
//! compiled once with `jsonschema` and reused for every parse. All failures
//! are collected, one issue per field path. Unknown keys are stripped from
//! the output unless the schema is [`strict`](ObjectSchema::strict).
//! [`Typed`] deserializes the checked value into a concrete type.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use jsonschema::JSONSchema;
use jsonschema::error::ValidationErrorKind;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::validation::{FieldIssue, Schema};

const UUID_PATTERN: &str = "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Shape of a single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Email,
    Uuid,
    Integer {
        min: Option<f64>,
        max: Option<f64>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    OneOf(Vec<String>),
    Array(Box<FieldKind>),
    Object(ObjectSchema),
    Any,
}

impl FieldKind {
    pub fn string() -> Self {
        Self::String {
            min_len: None,
            max_len: None,
        }
    }
}

/// A named field of an [`ObjectSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    nullable: bool,
    description: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            nullable: false,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::string())
    }

    pub fn email(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Email)
    }

    pub fn uuid(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Uuid)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer { min: None, max: None })
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number { min: None, max: None })
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn one_of<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, FieldKind::OneOf(values.into_iter().map(Into::into).collect()))
    }

    pub fn array(name: impl Into<String>, items: FieldKind) -> Self {
        Self::new(name, FieldKind::Array(Box::new(items)))
    }

    pub fn object(name: impl Into<String>, schema: ObjectSchema) -> Self {
        Self::new(name, FieldKind::Object(schema))
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Any)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Minimum length; only meaningful for string fields.
    pub fn min_len(mut self, n: usize) -> Self {
        if let FieldKind::String { min_len, .. } = &mut self.kind {
            *min_len = Some(n);
        }
        self
    }

    /// Maximum length; only meaningful for string fields.
    pub fn max_len(mut self, n: usize) -> Self {
        if let FieldKind::String { max_len, .. } = &mut self.kind {
            *max_len = Some(n);
        }
        self
    }

    /// Inclusive lower bound; only meaningful for numeric fields.
    pub fn min(mut self, v: f64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { min, .. } | FieldKind::Number { min, .. } => *min = Some(v),
            _ => {}
        }
        self
    }

    /// Inclusive upper bound; only meaningful for numeric fields.
    pub fn max(mut self, v: f64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { max, .. } | FieldKind::Number { max, .. } => *max = Some(v),
            _ => {}
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Lazily compiled validator for a rendered schema. Cleared whenever the
/// owning schema changes.
#[derive(Default)]
struct Compiled(OnceLock<Result<Arc<JSONSchema>, String>>);

impl Clone for Compiled {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl PartialEq for Compiled {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl core::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(if self.0.get().is_some() { "Compiled" } else { "Pending" })
    }
}

/// Schema for a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    title: Option<String>,
    fields: Vec<Field>,
    strict: bool,
    compiled: Compiled,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.compiled = Compiled::default();
        self
    }

    /// Add a field. A later field with the same name replaces the earlier one.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self.compiled = Compiled::default();
        self
    }

    /// Reject unknown keys instead of stripping them.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self.compiled = Compiled::default();
        self
    }

    /// Copy of this schema with every field optional (partial updates).
    pub fn partial(&self) -> Self {
        let mut out = self.clone();
        for f in &mut out.fields {
            f.required = false;
        }
        out
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Drop unknown keys (unless strict) and nulls sent for optional,
    /// non-nullable fields. Values are left for the validator to judge.
    fn normalize(&self, obj: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, value) in obj {
            match self.field_named(key) {
                Some(field) if value.is_null() && !field.nullable && !field.required => {}
                Some(field) => {
                    out.insert(key.clone(), normalize_kind(&field.kind, value));
                }
                None if self.strict => {
                    out.insert(key.clone(), value.clone());
                }
                None => {}
            }
        }
        out
    }

    fn validator(&self) -> Result<Arc<JSONSchema>, FieldIssue> {
        self.compiled
            .0
            .get_or_init(|| {
                let rendered = self.render();
                JSONSchema::compile(&rendered)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(|e| FieldIssue::new("", format!("Invalid schema: {e}")))
    }

    /// Field kind at a dotted path, following nested objects and arrays.
    fn kind_at(&self, path: &str) -> Option<&FieldKind> {
        let mut segments = path.split('.');
        let mut kind = &self.field_named(segments.next()?)?.kind;
        for segment in segments {
            kind = match kind {
                FieldKind::Object(schema) => &schema.field_named(segment)?.kind,
                FieldKind::Array(item) => item,
                _ => return None,
            };
        }
        Some(kind)
    }

    fn issues_for(&self, value: &Value, validator: &JSONSchema) -> Vec<FieldIssue> {
        let Err(errors) = validator.validate(value) else {
            return Vec::new();
        };

        let mut issues = Vec::new();
        for error in errors {
            let at = pointer_to_path(&error.instance_path.to_string());
            match &error.kind {
                ValidationErrorKind::Required { property } => {
                    let name = property.as_str().map_or_else(|| property.to_string(), str::to_string);
                    issues.push(FieldIssue::new(join_path(&at, &name), "Required"));
                }
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    issues.extend(
                        unexpected
                            .iter()
                            .map(|key| FieldIssue::new(join_path(&at, key), "Unrecognized field")),
                    );
                }
                ValidationErrorKind::Pattern { .. } | ValidationErrorKind::Format { .. } => {
                    let message = match self.kind_at(&at) {
                        Some(FieldKind::Email) => "Invalid email".to_string(),
                        Some(FieldKind::Uuid) => "Invalid uuid".to_string(),
                        _ => error.to_string(),
                    };
                    issues.push(FieldIssue::new(at, message));
                }
                _ => issues.push(FieldIssue::new(at, error.to_string())),
            }
        }

        issues.sort_by(|a, b| a.path.cmp(&b.path));
        issues.dedup_by(|a, b| a.path == b.path);
        issues
    }

    fn render(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut schema = render_kind(&field.kind);
            if let (Some(desc), Value::Object(map)) = (&field.description, &mut schema) {
                map.insert("description".into(), Value::String(desc.clone()));
            }
            if field.nullable {
                schema = json!({ "anyOf": [schema, { "type": "null" }] });
            }
            properties.insert(field.name.clone(), schema);
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        let mut out = Map::new();
        if let Some(title) = &self.title {
            out.insert("title".into(), Value::String(title.clone()));
        }
        out.insert("type".into(), json!("object"));
        out.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            out.insert("required".into(), Value::Array(required));
        }
        if self.strict {
            out.insert("additionalProperties".into(), Value::Bool(false));
        }
        Value::Object(out)
    }
}

impl Schema for ObjectSchema {
    type Output = Value;

    fn safe_parse(&self, input: &Value) -> Result<Value, Vec<FieldIssue>> {
        let Some(obj) = input.as_object() else {
            return Err(vec![FieldIssue::new("", "Expected object")]);
        };
        let validator = self.validator().map_err(|issue| vec![issue])?;
        let value = Value::Object(self.normalize(obj));
        let issues = self.issues_for(&value, &validator);
        if issues.is_empty() { Ok(value) } else { Err(issues) }
    }

    fn json_schema(&self) -> Value {
        self.render()
    }
}

/// An [`ObjectSchema`] whose output is deserialized into `T`.
pub struct Typed<T> {
    schema: ObjectSchema,
    _output: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    pub fn new(schema: ObjectSchema) -> Self {
        Self {
            schema,
            _output: PhantomData,
        }
    }

    pub fn object(&self) -> &ObjectSchema {
        &self.schema
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        Self::new(self.schema.clone())
    }
}

impl<T> core::fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Typed")
            .field("schema", &self.schema)
            .field("output", &core::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned + Send + 'static> Schema for Typed<T> {
    type Output = T;

    fn safe_parse(&self, input: &Value) -> Result<T, Vec<FieldIssue>> {
        let value = self.schema.safe_parse(input)?;
        serde_json::from_value(value).map_err(|e| vec![FieldIssue::new("", e.to_string())])
    }

    fn json_schema(&self) -> Value {
        self.schema.json_schema()
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn normalize_kind(kind: &FieldKind, value: &Value) -> Value {
    match (kind, value) {
        (FieldKind::Object(schema), Value::Object(obj)) => Value::Object(schema.normalize(obj)),
        (FieldKind::Array(item), Value::Array(items)) => {
            Value::Array(items.iter().map(|v| normalize_kind(item, v)).collect())
        }
        _ => value.clone(),
    }
}

/// `/dimensions/width` becomes `dimensions.width`.
fn pointer_to_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

fn render_kind(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::String { min_len, max_len } => {
            let mut m = Map::new();
            m.insert("type".into(), json!("string"));
            if let Some(n) = min_len {
                m.insert("minLength".into(), json!(n));
            }
            if let Some(n) = max_len {
                m.insert("maxLength".into(), json!(n));
            }
            Value::Object(m)
        }
        FieldKind::Email => json!({ "type": "string", "format": "email", "pattern": EMAIL_PATTERN }),
        FieldKind::Uuid => json!({ "type": "string", "format": "uuid", "pattern": UUID_PATTERN }),
        FieldKind::Integer { min, max } => numeric("integer", *min, *max),
        FieldKind::Number { min, max } => numeric("number", *min, *max),
        FieldKind::Boolean => json!({ "type": "boolean" }),
        FieldKind::OneOf(values) => json!({ "type": "string", "enum": values }),
        FieldKind::Array(item) => json!({ "type": "array", "items": render_kind(item) }),
        FieldKind::Object(schema) => schema.render(),
        FieldKind::Any => json!({}),
    }
}

fn numeric(ty: &str, min: Option<f64>, max: Option<f64>) -> Value {
    let mut m = Map::new();
    m.insert("type".into(), json!(ty));
    if let Some(v) = min {
        m.insert("minimum".into(), json!(v));
    }
    if let Some(v) = max {
        m.insert("maximum".into(), json!(v));
    }
    Value::Object(m)
}

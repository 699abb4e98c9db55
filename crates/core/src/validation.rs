//! Schema validation helpers with uniform error formatting.
//!
//! A [`Schema`] is anything that can turn an untyped JSON value into a typed
//! output or a list of per-field issues. [`validate`] fails with a
//! [`ValidationError`]; [`safe_validate`] returns a [`SafeParse`] instead so
//! call sites can branch on validity.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// One failed field: a dotted path and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl core::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Input rejected by a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldIssue::new(path, message)])
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Something that can parse untyped JSON into a typed value.
pub trait Schema: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Parse `input`, reporting every failing field.
    fn safe_parse(&self, input: &Value) -> Result<Self::Output, Vec<FieldIssue>>;

    /// JSON-schema rendering of this schema, used for API documentation.
    fn json_schema(&self) -> Value;
}

impl<S: Schema + ?Sized> Schema for Arc<S> {
    type Output = S::Output;

    fn safe_parse(&self, input: &Value) -> Result<Self::Output, Vec<FieldIssue>> {
        (**self).safe_parse(input)
    }

    fn json_schema(&self) -> Value {
        (**self).json_schema()
    }
}

/// Outcome of [`safe_validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum SafeParse<T> {
    Success(T),
    Failure(Vec<FieldIssue>),
}

impl<T> SafeParse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            Self::Success(_) => &[],
            Self::Failure(issues) => issues,
        }
    }

    pub fn into_result(self) -> Result<T, ValidationError> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failure(issues) => Err(ValidationError::new(issues)),
        }
    }
}

// {success:true, data} | {success:false, errors}
impl<T: Serialize> Serialize for SafeParse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("SafeParse", 2)?;
        match self {
            Self::Success(data) => {
                st.serialize_field("success", &true)?;
                st.serialize_field("data", data)?;
            }
            Self::Failure(errors) => {
                st.serialize_field("success", &false)?;
                st.serialize_field("errors", errors)?;
            }
        }
        st.end()
    }
}

/// Parse `data`, failing with one issue per rejected field.
pub fn validate<S: Schema + ?Sized>(data: &Value, schema: &S) -> Result<S::Output, ValidationError> {
    schema.safe_parse(data).map_err(ValidationError::new)
}

/// Non-failing variant of [`validate`].
pub fn safe_validate<S: Schema + ?Sized>(data: &Value, schema: &S) -> SafeParse<S::Output> {
    match schema.safe_parse(data) {
        Ok(v) => SafeParse::Success(v),
        Err(issues) => SafeParse::Failure(issues),
    }
}

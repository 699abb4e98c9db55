//! `routekit-core`: framework-agnostic building blocks.
//!
//! Pagination arithmetic, schema validation and the bootstrap error model.
//! Nothing in this crate knows about HTTP.

pub mod error;
pub mod id;
pub mod pagination;
pub mod schema;
pub mod validation;

pub use error::{ConfigResult, ConfigurationError};
pub use id::{InvalidId, RequestId, ResourceId, UserId};
pub use pagination::{
    PageLinks, PageRequest, Page, PaginationConfig, PaginationMeta, RawPageQuery, build_links,
    compute_meta,
};
pub use schema::{Field, FieldKind, ObjectSchema, Typed};
pub use validation::{FieldIssue, SafeParse, Schema, ValidationError, safe_validate, validate};

//! Request -> SQL translation: parameter validation, field resolution and
//! statement assembly.

pub mod build;
pub mod request;
pub mod resolve;
pub mod time;

pub use build::{BuiltQuery, DroppedField, FieldRole, QueryBuilder, BUCKET_ALIAS};
pub use request::QueryRequest;
pub use resolve::{FieldKind, FieldResolver, ResolvedField};

use chrono::FixedOffset;

use crate::catalog::Catalog;
use crate::error::ValidationError;

/// Validate raw URL parameters and build the statement in one step.
pub fn build_from_params(
    catalog: &Catalog,
    database: &str,
    params: &[(String, String)],
    offset: &FixedOffset,
) -> Result<BuiltQuery, ValidationError> {
    let req = QueryRequest::from_params(params, offset)?;
    Ok(QueryBuilder::new(catalog, database).build(&req))
}

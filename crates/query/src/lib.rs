//! Field matching for wordvec records.
//!
//! Caller filters arrive as a [`FilterSet`] (field name to [`FilterValue`]) and are
//! compiled against a record [`Schema`] into a [`Query`]:
//!
//! | value                          | predicate             |
//! |--------------------------------|-----------------------|
//! | scalar                         | equality              |
//! | 2-element list, numeric field  | inclusive range       |
//! | any other list                 | set membership        |
//! | text containing `%`            | wildcard pattern      |
//! | null or empty list             | no constraint         |
//!
//! A pair on a numeric field is always a range, even if two exact values were meant.

mod error;
mod filter;
mod options;
mod schema;

pub use error::{QueryError, Result};
pub use filter::{
    word_predicate, FieldPredicate, FilterSet, FilterValue, Pattern, Predicate, Query, Scalar,
};
pub use options::{ListOptions, Page, SortKey, SortSpec};
pub use schema::{FieldKind, FieldSource, FieldValue, Schema, MODEL_SCHEMA, VECTOR_SCHEMA};

//! Local tag catalog: an in-memory inverted index over known tag records,
//! plus the text normalization and field scoring the resolver shares.

pub mod error;
pub mod index;
pub mod record;
pub mod scoring;
pub mod text;

pub use error::CatalogError;
pub use index::TagCatalogIndex;
pub use record::CatalogRecord;
pub use scoring::{name_bonus, FieldTerms};
pub use text::{normalize_query, Keyword};

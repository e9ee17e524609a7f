//! Leadership index for researchers
//!
//! Resolves an author's PubMed records, keeps the ones where they are first
//! or last author, matches citation counts from OpenAlex by DOI and computes
//! the index. Results are cached in SQLite for a week by default.

pub mod cache;
pub mod error;
pub mod index;
pub mod papers;
pub mod pipeline;
pub mod report;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::Cache;
pub use error::{CacheError, PipelineError, RetrievalError};
pub use index::compute_index;
pub use pipeline::{AggregatedResult, CacheMode, Pipeline};
pub use settings::Settings;

//! Log search
//!
//! - [`filter`]: raw request parameters and their validated form
//! - [`query`]: the typed store query and the single builder producing it
//! - [`service`]: executes built queries for search, export and facets
//!
//! ```text
//! FilterParams ──normalize──▶ FilterCriteria ──QueryBuilder──▶ Query ──LogStore──▶ SearchPage
//! ```

pub mod filter;
pub mod query;
pub mod service;

pub use filter::{FilterCriteria, FilterParams, Pagination, Sort, SortField, SortOrder};
pub use query::{LogField, Predicate, Query, QueryBuilder};
pub use service::{LevelCount, SearchPage, SearchService};

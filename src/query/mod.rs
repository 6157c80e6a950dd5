//! Query model: validated query text, filters and the request shape accepted
//! at the service boundary.

pub mod dates;
pub mod types;

pub use dates::{parse_date_expr, PublishDateRange};
pub use types::{normalize_text, Query, QueryFilters, SearchRequest};

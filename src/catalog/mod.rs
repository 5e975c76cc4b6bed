//! Catalog module: the state → district → constituency → language → part hierarchy
//!
//! # Components
//!
//! - `types`: Serde views of the portal listings and the crawl's work units
//! - `CatalogCache`: Listings fetched once and cached under the data directory
//! - `order_states`: Priority-file and `--states` ordering of the traversal

mod cache;
mod priority;
mod types;

pub use cache::{cached_groups, read_cached, CatalogCache};
pub use priority::{load_priority_file, order_states};
pub use types::{
    ConstituencyInfo, DistrictInfo, DocumentVariant, Jurisdiction, LanguageGroup, PartInfo,
    StateInfo, WorkItem,
};

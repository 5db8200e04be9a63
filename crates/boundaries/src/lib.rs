//! Country / region attribution against public GeoJSON boundary datasets.

pub mod attribute;
pub mod cache;
pub mod dataset;
pub mod fetch;

pub use attribute::*;
pub use cache::*;
pub use dataset::*;
pub use fetch::*;

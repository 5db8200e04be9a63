//! Memory records and everything derived from them: normalized map features,
//! compound filters and collection statistics.

pub mod collection;
pub mod filter;
pub mod normalize;
pub mod record;
pub mod stats;

pub use collection::*;
pub use filter::*;
pub use normalize::*;
pub use record::*;
pub use stats::*;

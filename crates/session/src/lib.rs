//! The explicit session object: owns the record collection and every cache
//! derived from it, and wires the normalizer, filter engine, reconciler,
//! timeline player and persistence together on one cooperative event loop.

pub mod config;
pub mod error;
pub mod session;

pub use config::*;
pub use error::*;
pub use session::*;

pub mod cluster;
pub mod config;
pub mod engine;
pub mod marker;
pub mod memory;
pub mod reconciler;

pub use config::*;
pub use engine::*;
pub use marker::*;
pub use memory::InMemoryMapEngine;
pub use reconciler::*;

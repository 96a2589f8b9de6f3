pub mod base_table;
pub mod joiner;
pub mod loader;

pub use joiner::join_opportunities;
pub use loader::load_sources;

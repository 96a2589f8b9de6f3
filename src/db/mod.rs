pub mod models;
pub mod writer;

pub use writer::SegmentStore;

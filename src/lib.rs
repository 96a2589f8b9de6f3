pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod etl;
pub mod features;
pub mod pipeline;
pub mod query;
pub mod scorer;
pub mod segment;
pub mod snapshot;
pub mod types;

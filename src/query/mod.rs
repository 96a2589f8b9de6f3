pub mod aggregates;

pub use aggregates::{aggregate_table, query_aggregates, AggregateFilter, AggregateResponse};

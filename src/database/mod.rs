pub mod connection;
pub mod operations;

pub use operations::store_metrics;

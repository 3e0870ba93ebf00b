pub mod collector;

pub use collector::{GraphQueryRecord, MetricsCollector, QueryAggregate, QueryType};

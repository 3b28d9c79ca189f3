// Application layer - Use cases of the refresh pipeline
pub mod aggregator;
pub mod builder;
pub mod render_sink;
pub mod reshape;
pub mod scheduler;
pub mod telemetry_source;

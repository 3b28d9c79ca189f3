// Presentation layer - Concrete render sinks
pub mod json_sink;

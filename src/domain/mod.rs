// Domain layer - Core data models, no I/O
pub mod render;
pub mod telemetry;
pub mod track;

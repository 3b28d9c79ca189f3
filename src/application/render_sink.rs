// Render sink seam - whatever draws the models lives behind this trait
use crate::domain::render::{ChartModel, MapModel};
use async_trait::async_trait;
use thiserror::Error;

/// The sink rejected a model, e.g. a shape mismatch. The cycle that produced
/// the model counts as failed; the previously rendered view stays up.
#[derive(Debug, Error)]
#[error("render sink rejected {view} update: {reason}")]
pub struct SinkError {
    pub view: &'static str,
    pub reason: String,
}

impl SinkError {
    pub fn map(reason: impl Into<String>) -> Self {
        Self {
            view: "map",
            reason: reason.into(),
        }
    }

    pub fn chart(reason: impl Into<String>) -> Self {
        Self {
            view: "chart",
            reason: reason.into(),
        }
    }
}

/// Consumes render models. The sink owns all view-local state (user pan and
/// zoom); updates replace data layers only and must never reset the view
/// transform.
#[async_trait]
pub trait RenderSink: Send + Sync {
    async fn update_map(&self, model: &MapModel) -> Result<(), SinkError>;

    async fn update_chart(&self, model: &ChartModel) -> Result<(), SinkError>;
}

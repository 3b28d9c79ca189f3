// NDJSON render sink - one line per update for a frontend to consume
use crate::application::render_sink::{RenderSink, SinkError};
use crate::domain::render::{ChartModel, MapModel, Viewport};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Serialize)]
struct MapUpdate<'a> {
    view: &'static str,
    /// Always set: the consumer must keep the user's pan/zoom and only swap
    /// the data layers.
    preserve_view_state: bool,
    /// Present on the first update only; later renders never touch the view
    /// transform.
    #[serde(skip_serializing_if = "Option::is_none")]
    viewport: Option<Viewport>,
    map: &'a MapModel,
}

#[derive(Serialize)]
struct ChartUpdate<'a> {
    view: &'static str,
    chart: &'a ChartModel,
}

/// Writes each render model as one JSON line. The sink, not the pipeline,
/// decides when the initial viewport applies.
pub struct JsonRenderSink<W> {
    writer: Mutex<W>,
    viewport: Viewport,
    map_rendered: AtomicBool,
}

impl JsonRenderSink<tokio::io::Stdout> {
    pub fn stdout(viewport: Viewport) -> Self {
        Self::new(tokio::io::stdout(), viewport)
    }
}

impl<W: AsyncWrite + Send + Unpin> JsonRenderSink<W> {
    pub fn new(writer: W, viewport: Viewport) -> Self {
        Self {
            writer: Mutex::new(writer),
            viewport,
            map_rendered: AtomicBool::new(false),
        }
    }

    async fn write_line(&self, line: Vec<u8>, view: &'static str) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(&line).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        write.await.map_err(|e| SinkError {
            view,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin> RenderSink for JsonRenderSink<W> {
    async fn update_map(&self, model: &MapModel) -> Result<(), SinkError> {
        let first = !self.map_rendered.swap(true, Ordering::SeqCst);
        let update = MapUpdate {
            view: "map",
            preserve_view_state: true,
            viewport: first.then_some(self.viewport),
            map: model,
        };
        let line = serde_json::to_vec(&update).map_err(|e| SinkError::map(e.to_string()))?;
        self.write_line(line, "map").await
    }

    async fn update_chart(&self, model: &ChartModel) -> Result<(), SinkError> {
        let update = ChartUpdate {
            view: "chart",
            chart: model,
        };
        let line = serde_json::to_vec(&update).map_err(|e| SinkError::chart(e.to_string()))?;
        self.write_line(line, "chart").await
    }
}

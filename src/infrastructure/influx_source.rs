// InfluxDB 2.x source adapter - Flux over HTTP, annotated CSV back
use crate::application::telemetry_source::{
    FillPolicy, QueryMode, QuerySpec, SourceError, TelemetrySource, TimeWindow,
};
use crate::domain::telemetry::{EntityKey, Field, Sample};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone)]
pub struct InfluxSource {
    url: String,
    token: String,
    org: String,
    bucket: String,
    client: reqwest::Client,
}

impl InfluxSource {
    pub fn new(url: String, token: String, org: String, bucket: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            token,
            org,
            bucket,
            client: reqwest::Client::new(),
        }
    }

    /// Render a `QuerySpec` as Flux. Snapshot mode keeps only the last
    /// aggregated sample per entity and pivots on time + line + run;
    /// trajectory mode keeps the whole window and pivots on time alone.
    fn build_flux(&self, spec: &QuerySpec) -> String {
        let mut flux = format!("from(bucket: \"{}\")", self.bucket);

        match spec.window {
            TimeWindow::Last(duration) => {
                flux.push_str(&format!(" |> range(start: -{}s)", duration.num_seconds()));
            }
            TimeWindow::Range { start, stop } => {
                flux.push_str(&format!(
                    " |> range(start: {}, stop: {})",
                    start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    stop.to_rfc3339_opts(SecondsFormat::Secs, true)
                ));
            }
        }

        let measurements = spec
            .measurements
            .iter()
            .map(|m| format!("r[\"_measurement\"] == \"{}\"", m))
            .collect::<Vec<_>>()
            .join(" or ");
        flux.push_str(&format!(" |> filter(fn: (r) => {})", measurements));

        let fields = spec
            .fields
            .iter()
            .map(|f| format!("r[\"_field\"] == \"{}\"", f.as_str()))
            .collect::<Vec<_>>()
            .join(" or ");
        flux.push_str(&format!(" |> filter(fn: (r) => {})", fields));

        if let Some(line) = &spec.line {
            flux.push_str(&format!(" |> filter(fn: (r) => r.line == \"{}\")", line));
        }

        if spec.mode == QueryMode::Trajectory {
            flux.push_str(" |> keep(columns: [\"_value\", \"_field\", \"_time\"])");
        }

        flux.push_str(&format!(
            " |> aggregateWindow(every: {}s, fn: mean)",
            spec.every.num_seconds()
        ));
        match spec.fill {
            FillPolicy::UsePrevious => flux.push_str(" |> fill(usePrevious: true)"),
        }
        if spec.mode == QueryMode::Snapshot {
            flux.push_str(" |> last()");
        }
        flux.push_str(" |> group()");

        let row_key = match spec.mode {
            QueryMode::Snapshot => "[\"_time\", \"line\", \"run\"]",
            QueryMode::Trajectory => "[\"_time\"]",
        };
        flux.push_str(&format!(
            " |> pivot(rowKey: {}, columnKey: [\"_field\"], valueColumn: \"_value\")",
            row_key
        ));

        flux
    }

    async fn execute_query(&self, flux: &str) -> Result<String, SourceError> {
        let url = format!("{}/api/v2/query", self.url);
        let body = serde_json::json!({ "query": flux, "type": "flux" });

        let response = self
            .client
            .post(&url)
            .query(&[("org", self.org.as_str())])
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/csv")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Refused { status, body });
        }

        Ok(response.text().await?)
    }

    /// Decode the pivoted annotated-CSV response into samples.
    ///
    /// Annotation lines start with `#` and are skipped; a record containing
    /// `_time` refreshes the column layout (the stream restarts headers per
    /// table). Rows the view cannot use (unparseable time, no entity) are
    /// dropped with a warning, never aborting the batch.
    fn parse_samples(text: &str, spec: &QuerySpec) -> Vec<Sample> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(text.as_bytes());

        let mut columns: Vec<String> = Vec::new();
        let mut samples = Vec::new();

        for record in reader.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("malformed CSV record dropped: {e}");
                    continue;
                }
            };
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            if record.iter().any(|cell| cell == "_time") {
                columns = record.iter().map(|c| c.to_string()).collect();
                continue;
            }
            if columns.is_empty() {
                tracing::warn!("data record before any header dropped");
                continue;
            }

            let cell = |name: &str| -> Option<&str> {
                columns
                    .iter()
                    .position(|c| c == name)
                    .and_then(|idx| record.get(idx))
                    .filter(|v| !v.is_empty())
            };

            let Some(time) = cell("_time").and_then(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .ok()
            }) else {
                tracing::warn!("row without a parseable _time dropped");
                continue;
            };

            // Trajectory queries strip tags; the entity is then the one the
            // query was restricted to.
            let line = cell("line").map(str::to_string).or_else(|| spec.line.clone());
            let Some(line) = line else {
                tracing::warn!("row without an entity tag dropped");
                continue;
            };
            let entity = match cell("run") {
                Some(run) => EntityKey::with_run(line, run),
                None => EntityKey::new(line),
            };

            for field in &spec.fields {
                let Some(raw) = cell(field.as_str()) else {
                    continue;
                };
                match raw.parse::<f64>() {
                    Ok(value) => samples.push(Sample::new(entity.clone(), time, *field, value)),
                    Err(_) => {
                        tracing::warn!("non-numeric {} value {:?} dropped", field, raw);
                    }
                }
            }
        }

        samples.sort_by(|a, b| (&a.entity, a.time).cmp(&(&b.entity, b.time)));
        samples
    }
}

#[async_trait]
impl TelemetrySource for InfluxSource {
    async fn fetch_window(&self, spec: &QuerySpec) -> Result<Vec<Sample>, SourceError> {
        let flux = self.build_flux(spec);
        tracing::debug!("executing flux query: {flux}");

        let text = self.execute_query(&flux).await?;
        let samples = Self::parse_samples(&text, spec);
        tracing::debug!("query returned {} samples", samples.len());
        Ok(samples)
    }
}

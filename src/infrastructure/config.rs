use crate::application::aggregator::RetentionPolicy;
use crate::domain::render::Viewport;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub influx: InfluxSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub map: MapViewSettings,
    #[serde(default)]
    pub chart: ChartViewSettings,
    #[serde(default)]
    pub measurements: Measurements,
    #[serde(default)]
    pub tracks: TrackSettings,
    #[serde(default)]
    pub viewport: ViewportSettings,
}

impl DashboardConfig {
    /// Reject second counts that cannot be represented as signed durations
    /// downstream. Runs once at load; cycles never re-validate.
    pub fn validate(&self) -> anyhow::Result<()> {
        duration_secs(self.map.window_secs, "map.window_secs")?;
        duration_secs(self.map.every_secs, "map.every_secs")?;
        duration_secs(self.chart.window_secs, "chart.window_secs")?;
        duration_secs(self.chart.every_secs, "chart.every_secs")?;
        self.tracks.retention()?;
        Ok(())
    }
}

fn duration_secs(value: u64, key: &str) -> anyhow::Result<chrono::Duration> {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| anyhow::anyhow!("{key} out of range: {value}"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapViewSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_every_secs")]
    pub every_secs: u64,
}

impl Default for MapViewSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            window_secs: default_window_secs(),
            every_secs: default_every_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartViewSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_every_secs")]
    pub every_secs: u64,
    /// The single line the brake/speed chart plots.
    #[serde(default = "default_chart_line")]
    pub line: String,
}

impl Default for ChartViewSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            window_secs: default_window_secs(),
            every_secs: default_every_secs(),
            line: default_chart_line(),
        }
    }
}

/// Measurement names as stored in the bucket.
#[derive(Debug, Deserialize, Clone)]
pub struct Measurements {
    #[serde(default = "default_position_measurement")]
    pub position: String,
    #[serde(default = "default_speed_measurement")]
    pub speed: String,
    #[serde(default = "default_control_measurement")]
    pub control: String,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            position: default_position_measurement(),
            speed: default_speed_measurement(),
            control: default_control_measurement(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackSettings {
    /// Per-entity colors, cycled in first-seen order. Empty means the
    /// built-in palette.
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Seconds behind the newest sample before an entity is evicted.
    /// Absent means entities are kept forever.
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            palette: Vec::new(),
            max_positions: default_max_positions(),
            stale_after_secs: None,
        }
    }
}

impl TrackSettings {
    pub fn retention(&self) -> anyhow::Result<RetentionPolicy> {
        let stale_after = match self.stale_after_secs {
            Some(secs) => Some(duration_secs(secs, "tracks.stale_after_secs")?),
            None => None,
        };
        Ok(RetentionPolicy {
            max_positions: self.max_positions,
            stale_after,
        })
    }
}

/// Initial map viewport; applied only on first load, then the user's pan and
/// zoom win.
#[derive(Debug, Deserialize, Clone)]
pub struct ViewportSettings {
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,
    #[serde(default = "default_center_lon")]
    pub center_lon: f64,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            center_lat: default_center_lat(),
            center_lon: default_center_lon(),
            zoom: default_zoom(),
        }
    }
}

impl ViewportSettings {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            center_lat: self.center_lat,
            center_lon: self.center_lon,
            zoom: self.zoom,
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_window_secs() -> u64 {
    180
}

fn default_every_secs() -> u64 {
    1
}

fn default_chart_line() -> String {
    "lineA".to_string()
}

fn default_position_measurement() -> String {
    "position".to_string()
}

fn default_speed_measurement() -> String {
    "speed".to_string()
}

fn default_control_measurement() -> String {
    "control".to_string()
}

fn default_max_positions() -> usize {
    1024
}

fn default_center_lat() -> f64 {
    52.4
}

fn default_center_lon() -> f64 {
    -1.5
}

fn default_zoom() -> f64 {
    10.0
}

pub fn load_source_config() -> anyhow::Result<SourceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/source"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard"))
        .build()?;

    let dashboard_config: DashboardConfig = settings.try_deserialize()?;
    dashboard_config.validate()?;
    Ok(dashboard_config)
}

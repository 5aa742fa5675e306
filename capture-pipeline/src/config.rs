use crate::controller::LoopConfig;
use crate::types::{PipelineError, Result};
use clap::{Args, Parser};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SUMMARY_INTERVAL: u64 = 5;
pub const DEFAULT_UI_PORT: u16 = 5050;

/// Capture a running game, describe each frame with a vision model and stream
/// the results.
#[derive(Debug, Parser)]
#[command(name = "capture-pipeline", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: PipelineConfig,

    /// Run the streaming web UI instead of the console logger
    #[arg(long)]
    pub web: bool,

    /// Use the scripted model and a still image instead of the real
    /// collaborators
    #[arg(long)]
    pub mock: bool,

    /// Keep captures left over from a previous run
    #[arg(long)]
    pub keep_captures: bool,
}

/// Raw settings as read from flags and the environment.
#[derive(Debug, Clone, Args)]
pub struct PipelineConfig {
    /// Seconds to sleep between captures
    #[arg(long, env = "SCREENSHOT_INTERVAL_SECONDS", default_value_t = 2.0)]
    pub interval: f64,

    /// Summarize every N successfully analyzed captures (also SUMMARY_EVERY)
    #[arg(long, env = "SUMMARY_INTERVAL")]
    pub summary_interval: Option<u64>,

    /// Application whose window is captured
    #[arg(long, env = "CAPTURE_SOURCE", default_value = "RetroArch")]
    pub source: String,

    /// Directory for captured frames
    #[arg(long, env = "SCREENSHOTS_DIR", default_value = "static/images")]
    pub out_dir: PathBuf,

    #[arg(long, env = "MODEL", default_value = "gpt-5")]
    pub model: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub base_url: String,

    #[arg(long, env = "POKEAPI_BASE_URL", default_value = "https://pokeapi.co/api/v2")]
    pub lookup_base_url: String,

    /// Host for the web UI (also WEB_APP_HOST)
    #[arg(long = "ui-host", env = "STREAM_UI_HOST")]
    pub ui_host: Option<String>,

    /// Port for the web UI (also WEB_APP_PORT)
    #[arg(long = "ui-port", env = "STREAM_UI_PORT")]
    pub ui_port: Option<u16>,

    /// Idle seconds before a stream sends a keep-alive
    #[arg(long, env = "STREAM_KEEPALIVE_SECONDS", default_value_t = 10)]
    pub keep_alive: u64,
}

/// Validated settings. Built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub interval: Duration,
    pub summary_interval: u64,
    pub source: String,
    pub out_dir: PathBuf,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Url,
    pub lookup_base_url: Url,
    pub ui_host: String,
    pub ui_port: u16,
    pub keep_alive: Duration,
}

impl PipelineConfig {
    /// Apply fallbacks and validate. `require_api_key` is false in mock mode.
    pub fn resolve(self, require_api_key: bool) -> Result<Settings> {
        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(PipelineError::Config(format!(
                "SCREENSHOT_INTERVAL_SECONDS must be a positive number, got {}",
                self.interval
            )));
        }

        let summary_interval = match self.summary_interval {
            Some(value) => value,
            None => alias_var("SUMMARY_EVERY")?.unwrap_or(DEFAULT_SUMMARY_INTERVAL),
        };
        if summary_interval == 0 {
            return Err(PipelineError::Config("SUMMARY_INTERVAL must be >= 1".to_string()));
        }

        if self.source.trim().is_empty() {
            return Err(PipelineError::Config("CAPTURE_SOURCE must not be empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::Config("MODEL must not be empty".to_string()));
        }

        let api_key = self.api_key.filter(|key| !key.trim().is_empty());
        if require_api_key && api_key.is_none() {
            return Err(PipelineError::Config("Missing required env var(s): OPENAI_API_KEY".to_string()));
        }

        if self.keep_alive == 0 {
            return Err(PipelineError::Config("STREAM_KEEPALIVE_SECONDS must be >= 1".to_string()));
        }

        let ui_port = match self.ui_port {
            Some(port) => port,
            None => alias_var("WEB_APP_PORT")?.unwrap_or(DEFAULT_UI_PORT),
        };
        let ui_host = match self.ui_host {
            Some(host) => host,
            None => env::var("WEB_APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
        };

        Ok(Settings {
            interval: Duration::from_secs_f64(self.interval),
            summary_interval,
            source: self.source,
            out_dir: self.out_dir,
            model: self.model,
            api_key,
            base_url: http_url("OPENAI_BASE_URL", &self.base_url)?,
            lookup_base_url: http_url("POKEAPI_BASE_URL", &self.lookup_base_url)?,
            ui_host,
            ui_port,
            keep_alive: Duration::from_secs(self.keep_alive),
        })
    }
}

impl Settings {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            interval: self.interval,
            summary_interval: self.summary_interval,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.ui_host, self.ui_port)
    }
}

/// Read a numeric fallback variable; a set but unparsable value is an error.
fn alias_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} must be an integer, got {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}

fn http_url(name: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PipelineError::Config(format!("{} must be an http(s) URL, got {}", name, raw)));
    }
    Ok(url)
}

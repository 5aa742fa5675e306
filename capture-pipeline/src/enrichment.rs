use crate::traits::LookupService;
use crate::types::{CallLogEntry, PipelineError, Result};
use crate::verify::normalize_name;
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Moves kept per profile after de-duplication.
pub const MAX_MOVES: usize = 40;

#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            user_agent: "capture-pipeline/0.1".to_string(),
            timeout_seconds: 10,
            max_retries: 2,
            retry_delay_ms: 250,
        }
    }
}

/// Pokémon profile lookup against a PokeAPI-compatible endpoint.
///
/// Results are memoized by normalized name for the life of the process and
/// shared between the capture loop and chat. Every tracked lookup, cached or
/// not, lands in the call log until the next drain.
pub struct PokeApiLookup {
    client: Client,
    base_url: String,
    config: LookupConfig,
    cache: RwLock<HashMap<String, Value>>,
    call_log: Mutex<Vec<CallLogEntry>>,
}

impl PokeApiLookup {
    pub fn new(base_url: impl Into<String>, config: LookupConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
            cache: RwLock::new(HashMap::new()),
            call_log: Mutex::new(Vec::new()),
        })
    }

    /// Seed the cache, e.g. from a previous run or a test fixture.
    pub fn prime(&self, key: &str, payload: Value) {
        self.store(normalize_name(key), payload);
    }

    pub fn cached(&self, key: &str) -> Option<Value> {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(&normalize_name(key)).cloned()
    }

    fn store(&self, key: String, payload: Value) {
        // Last writer wins; a key always maps to the same profile.
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, payload);
    }

    fn record_call(&self, key: &str, payload: &Value) {
        let mut log = self.call_log.lock().unwrap_or_else(|e| e.into_inner());
        log.push(CallLogEntry::new(vec![key.to_string()], payload.clone()));
    }

    async fn resolve(&self, key: &str) -> Value {
        if key.is_empty() {
            return json!({ "error": "empty name" });
        }

        if let Some(cached) = self.cached(key) {
            debug!("Profile cache hit: {}", key);
            return cached;
        }

        match self.fetch_profile(key).await {
            Ok(Some(data)) => {
                let trimmed = trim_profile(&data);
                // Extraction errors are not cached so a later call can retry.
                if trimmed.get("error").is_none() {
                    self.store(key.to_string(), trimmed.clone());
                }
                trimmed
            }
            Ok(None) => json!({ "error": "unknown_error" }),
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", key, e);
                json!({ "error": e.to_string() })
            }
        }
    }

    /// GET the raw profile, retrying transport errors with exponential backoff.
    async fn fetch_profile(&self, key: &str) -> Result<Option<Value>> {
        let url = format!("{}/pokemon/{}/", self.base_url, key);
        let delay = Duration::from_millis(self.config.retry_delay_ms);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: delay,
            initial_interval: delay,
            max_interval: delay * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(delay * 32),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status != StatusCode::OK {
                        return Err(PipelineError::Lookup(format!("http_{}", status.as_u16())));
                    }
                    return response
                        .json::<Value>()
                        .await
                        .map(Some)
                        .map_err(|e| PipelineError::Lookup(format!("parse_error: {}", e)));
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        if let Some(wait) = backoff.next_backoff() {
                            attempt += 1;
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt, url, wait);
                            tokio::time::sleep(wait).await;
                            continue;
                        }
                    }
                    return Err(PipelineError::Lookup(format!("request_error: {}", e)));
                }
            }
        }
    }
}

#[async_trait]
impl LookupService for PokeApiLookup {
    async fn lookup(&self, key: &str) -> Value {
        let key = normalize_name(key);
        let payload = self.resolve(&key).await;
        if !key.is_empty() {
            self.record_call(&key, &payload);
        }
        payload
    }

    async fn lookup_untracked(&self, key: &str) -> Value {
        self.resolve(&normalize_name(key)).await
    }

    fn drain_call_log(&self) -> Vec<CallLogEntry> {
        let mut log = self.call_log.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *log)
    }
}

/// Reduce a raw `/pokemon/{name}` payload to what the model needs.
pub fn trim_profile(data: &Value) -> Value {
    let Some(object) = data.as_object() else {
        return json!({ "error": "extract_error: profile is not an object" });
    };

    let types: Vec<&str> = named_entries(object, "types", "type");
    let abilities: Vec<&str> = named_entries(object, "abilities", "ability");

    let mut base_stats = Map::new();
    for stat in array(object, "stats") {
        let Some(value) = stat.get("base_stat").and_then(Value::as_i64) else {
            continue;
        };
        let name = stat
            .get("stat")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        base_stats.insert(name.to_string(), json!(value));
    }

    let mut moves: Vec<&str> = Vec::new();
    for name in named_entries(object, "moves", "move") {
        if !moves.contains(&name) {
            moves.push(name);
        }
    }
    let truncated = moves.len() > MAX_MOVES;
    moves.truncate(MAX_MOVES);

    json!({
        "id": object.get("id").cloned().unwrap_or(Value::Null),
        "name": object.get("name").cloned().unwrap_or(Value::Null),
        "types": types,
        "abilities": abilities,
        "base_stats": base_stats,
        "moves": moves,
        "moves_truncated": truncated,
    })
}

fn array<'a>(object: &'a Map<String, Value>, field: &str) -> &'a [Value] {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// `[{inner: {name: ..}}, ..]` -> names, skipping malformed entries.
fn named_entries<'a>(object: &'a Map<String, Value>, field: &str, inner: &str) -> Vec<&'a str> {
    array(object, field)
        .iter()
        .filter_map(|entry| entry.get(inner)?.get("name")?.as_str())
        .collect()
}

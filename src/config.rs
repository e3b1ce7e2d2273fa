use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::http_cache::app_cache_dir;

pub const DEFAULT_NFLVERSE_BASE_URL: &str =
    "https://github.com/nflverse/nflverse-data/releases/download";
pub const DEFAULT_SCHEDULE_URL: &str =
    "https://raw.githubusercontent.com/nflverse/nfldata/master/data/games.csv";
pub const DEFAULT_PFR_BOXSCORE_BASE: &str = "https://www.pro-football-reference.com/boxscores";
pub const DEFAULT_API_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: PathBuf,
    pub parallelism: usize,
    pub http_timeout: Duration,
    pub bulk_timeout: Duration,
    pub fetch_retries: u32,
    pub store_write_retries: u32,
    pub nflverse_base_url: String,
    pub schedule_url: String,
    pub pfr_boxscore_base: String,
    pub api_bind: String,
    pub api_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            parallelism: 6,
            http_timeout: Duration::from_secs(10),
            bulk_timeout: Duration::from_secs(180),
            fetch_retries: 4,
            store_write_retries: 3,
            nflverse_base_url: DEFAULT_NFLVERSE_BASE_URL.to_string(),
            schedule_url: DEFAULT_SCHEDULE_URL.to_string(),
            pfr_boxscore_base: DEFAULT_PFR_BOXSCORE_BASE.to_string(),
            api_bind: DEFAULT_API_BIND.to_string(),
            api_threads: 4,
        }
    }
}

impl PipelineConfig {
    /// Reads overrides from the process environment on top of the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let text = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };
        let num = |key: &str, fallback: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(fallback)
        };

        Self {
            db_path: lookup("GRIDIRON_DB_PATH")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(d.db_path),
            parallelism: (num("FETCH_PARALLELISM", d.parallelism as u64) as usize).clamp(1, 32),
            http_timeout: Duration::from_secs(num("HTTP_TIMEOUT_SECS", 10).clamp(1, 120)),
            bulk_timeout: Duration::from_secs(num("BULK_TIMEOUT_SECS", 180).clamp(10, 1800)),
            fetch_retries: num("FETCH_RETRIES", d.fetch_retries as u64).clamp(1, 10) as u32,
            store_write_retries: num("STORE_WRITE_RETRIES", d.store_write_retries as u64)
                .clamp(1, 10) as u32,
            nflverse_base_url: text("NFLVERSE_BASE_URL", d.nflverse_base_url),
            schedule_url: text("NFLVERSE_SCHEDULE_URL", d.schedule_url),
            pfr_boxscore_base: text("PFR_BOXSCORE_BASE", d.pfr_boxscore_base),
            api_bind: text("API_BIND", d.api_bind),
            api_threads: (num("API_THREADS", d.api_threads as u64) as usize).clamp(1, 64),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    app_cache_dir()
        .map(|dir| dir.join("gridiron.sqlite"))
        .unwrap_or_else(|| PathBuf::from("gridiron.sqlite"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn env_overrides_and_clamps() {
        let vars = HashMap::from([
            ("GRIDIRON_DB_PATH", "/tmp/x.sqlite"),
            ("FETCH_PARALLELISM", "500"),
            ("FETCH_RETRIES", "0"),
            ("API_BIND", "  "),
        ]);
        let cfg = PipelineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(cfg.parallelism, 32);
        assert_eq!(cfg.fetch_retries, 1);
        assert_eq!(cfg.api_bind, DEFAULT_API_BIND);
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let cfg = PipelineConfig::from_lookup(|k| (k == "API_THREADS").then(|| "many".into()));
        assert_eq!(cfg.api_threads, 4);
    }
}

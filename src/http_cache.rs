use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};

const CACHE_VERSION: u32 = 1;
const CACHE_DIR: &str = "gridiron_data";
const DOWNLOADS_DIR: &str = "downloads";
const INDEX_FILE: &str = "download_index.json";

static INDEX_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DownloadIndex {
    version: u32,
    entries: HashMap<String, IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: u64,
}

/// Root of the per-user cache directory (`$XDG_CACHE_HOME/gridiron_data` or `~/.cache/...`).
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

/// Downloads `url` into the cache directory, revalidating a previous copy with
/// ETag/Last-Modified. Returns the on-disk path of the current body.
pub fn fetch_file_cached(client: &Client, url: &str) -> Result<PathBuf> {
    let dir = app_cache_dir()
        .map(|d| d.join(DOWNLOADS_DIR))
        .ok_or_else(|| anyhow!("no cache directory available"))?;
    fetch_file_cached_in(client, url, &dir)
}

pub fn fetch_file_cached_in(client: &Client, url: &str, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let file_name = cache_file_name(url);
    let target = dir.join(&file_name);

    let cached = {
        let _guard = INDEX_LOCK.lock().map_err(|_| anyhow!("download index lock poisoned"))?;
        load_index(dir).entries.get(url).cloned()
    }
    .filter(|_| target.exists());

    let mut req = client.get(url);
    if let Some(entry) = cached.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().with_context(|| format!("request {url}"))?;
    let status = resp.status();
    if status == StatusCode::NOT_MODIFIED {
        if cached.is_some() {
            tracing::debug!(%url, "download cache revalidated");
            return Ok(target);
        }
        return Err(anyhow!("received 304 without cached body for {url}"));
    }
    if !status.is_success() {
        return Err(anyhow!("http {status} for {url}"));
    }

    let headers = resp.headers().clone();
    let bytes = resp.bytes().with_context(|| format!("read body {url}"))?;
    let tmp = target.with_extension("part");
    fs::write(&tmp, &bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &target).with_context(|| format!("swap {}", target.display()))?;

    let entry = IndexEntry {
        file: file_name,
        etag: header_string(&headers, ETAG),
        last_modified: header_string(&headers, LAST_MODIFIED),
        fetched_at: system_time_to_secs(SystemTime::now()).unwrap_or_default(),
    };
    {
        let _guard = INDEX_LOCK.lock().map_err(|_| anyhow!("download index lock poisoned"))?;
        let mut index = load_index(dir);
        index.version = CACHE_VERSION;
        index.entries.insert(url.to_string(), entry);
        save_index(dir, &index)?;
    }
    tracing::info!(%url, bytes = bytes.len(), "downloaded");
    Ok(target)
}

fn header_string(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn load_index(dir: &Path) -> DownloadIndex {
    let Ok(raw) = fs::read_to_string(dir.join(INDEX_FILE)) else {
        return DownloadIndex::default();
    };
    let index = serde_json::from_str::<DownloadIndex>(&raw).unwrap_or_default();
    if index.version != CACHE_VERSION {
        return DownloadIndex::default();
    }
    index
}

fn save_index(dir: &Path, index: &DownloadIndex) -> Result<()> {
    let path = dir.join(INDEX_FILE);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(index).context("serialize download index")?;
    fs::write(&tmp, json).context("write download index")?;
    fs::rename(&tmp, &path).context("swap download index")?;
    Ok(())
}

/// Last path segment of the URL, with anything outside `[A-Za-z0-9._-]` replaced.
fn cache_file_name(url: &str) -> String {
    let tail = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or("download");
    tail.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn system_time_to_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::cache_file_name;

    #[test]
    fn file_names_come_from_last_segment() {
        assert_eq!(
            cache_file_name("https://x.test/pbp/play_by_play_2024.parquet"),
            "play_by_play_2024.parquet"
        );
        assert_eq!(cache_file_name("https://x.test/data/games.csv?raw=1"), "games.csv");
        assert_eq!(cache_file_name("https://x.test/a b/"), "a_b");
    }
}

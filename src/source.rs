//! Connector seams. Connectors only return data; normalization decides what is stored.

use anyhow::Result;

use crate::raw::RawRecord;

/// Result of an optional data source: either rows, or an explicit "nothing here".
#[derive(Debug, Clone, PartialEq)]
pub enum Supplement<T> {
    Present(T),
    Absent { reason: String },
}

impl<T> Supplement<T> {
    pub fn absent(reason: impl Into<String>) -> Self {
        Supplement::Absent {
            reason: reason.into(),
        }
    }
}

/// Primary bulk provider. Errors are fatal to the season being ingested, except the
/// schedule which only feeds boxscore references.
pub trait BulkSource: Send + Sync {
    fn fetch_play_by_play(&self, season: u16) -> Result<Vec<RawRecord>>;
    fn fetch_roster(&self, season: u16) -> Result<Vec<RawRecord>>;
    fn fetch_schedule(&self, season: u16) -> Result<Vec<RawRecord>>;
}

/// Best-effort per-game boxscore provider. Never errors: failures come back as `Absent`.
pub trait BoxscoreSource: Send + Sync {
    fn fetch_boxscore(&self, url: &str) -> Supplement<Vec<RawRecord>>;
}

/// Stand-in used when scraping is switched off for a run.
pub struct NoBoxscores;

impl BoxscoreSource for NoBoxscores {
    fn fetch_boxscore(&self, _url: &str) -> Supplement<Vec<RawRecord>> {
        Supplement::absent("boxscore scraping disabled")
    }
}

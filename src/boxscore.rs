//! Best-effort Pro-Football-Reference boxscore scraper.
//!
//! PFR ships most secondary tables inside HTML comments, so comment markers are stripped
//! before parsing. Every failure mode (network, 404, missing tables) degrades to
//! `Supplement::Absent`; nothing here ever produces a value the page did not contain.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::http_client::{http_client, with_retries};
use crate::raw::{RawRecord, RawValue};
use crate::source::{BoxscoreSource, Supplement};

pub const OFFENSE_TABLE: &str = "player_offense";
pub const HOME_SNAPS_TABLE: &str = "home_snap_counts";
pub const AWAY_SNAPS_TABLE: &str = "vis_snap_counts";

/// Key added to each scraped row naming the table it came from.
pub const TABLE_KEY: &str = "_table";
pub const HREF_KEY: &str = "_player_href";

const TABLES: [&str; 3] = [OFFENSE_TABLE, HOME_SNAPS_TABLE, AWAY_SNAPS_TABLE];

pub struct PfrBoxscoreSource {
    timeout: Duration,
    attempts: u32,
}

impl PfrBoxscoreSource {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            timeout: config.http_timeout,
            attempts: config.fetch_retries,
        }
    }
}

impl BoxscoreSource for PfrBoxscoreSource {
    fn fetch_boxscore(&self, url: &str) -> Supplement<Vec<RawRecord>> {
        let client = match http_client(self.timeout) {
            Ok(client) => client,
            Err(err) => return Supplement::absent(format!("client unavailable: {err}")),
        };
        let page = with_retries(url, self.attempts, |_| fetch_page(client, url));
        let html = match page {
            Ok(Some(html)) => html,
            Ok(None) => {
                warn!(%url, "boxscore not found");
                return Supplement::absent("http 404");
            }
            Err(err) => {
                warn!(%url, error = %err, "boxscore fetch failed");
                return Supplement::absent(format!("fetch failed: {err}"));
            }
        };
        match parse_boxscore_html(&html) {
            Ok(rows) => {
                debug!(%url, rows = rows.len(), "boxscore parsed");
                Supplement::Present(rows)
            }
            Err(err) => {
                warn!(%url, error = %err, "boxscore layout not recognised");
                Supplement::absent(format!("parse failed: {err}"))
            }
        }
    }
}

/// `Ok(None)` for 404 so the retry loop does not hammer a page that does not exist.
fn fetch_page(client: &reqwest::blocking::Client, url: &str) -> Result<Option<String>> {
    let resp = client.get(url).send().context("request failed")?;
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(anyhow!("http {status}"));
    }
    resp.text().context("failed reading body").map(Some)
}

/// Extracts the offense and snap-count tables as flat records keyed by `data-stat`.
pub fn parse_boxscore_html(html: &str) -> Result<Vec<RawRecord>> {
    let uncommented = html.replace("<!--", "").replace("-->", "");
    let document = Html::parse_document(&uncommented);
    let row_sel = selector("tbody > tr")?;
    let cell_sel = selector("th[data-stat], td[data-stat]")?;
    let link_sel = selector("a[href]")?;

    let mut out = Vec::new();
    let mut tables_seen = 0usize;
    for table_id in TABLES {
        let table_sel = selector(&format!("table#{table_id}"))?;
        let Some(table) = document.select(&table_sel).next() else {
            continue;
        };
        tables_seen += 1;
        for row in table.select(&row_sel) {
            if is_header_row(&row) {
                continue;
            }
            if let Some(record) = parse_row(&row, table_id, &cell_sel, &link_sel) {
                out.push(record);
            }
        }
    }

    if tables_seen == 0 {
        return Err(anyhow!("none of {TABLES:?} present"));
    }
    Ok(out)
}

fn parse_row(
    row: &ElementRef<'_>,
    table_id: &str,
    cell_sel: &Selector,
    link_sel: &Selector,
) -> Option<RawRecord> {
    let mut record = RawRecord::new().with(TABLE_KEY, RawValue::Text(table_id.to_string()));
    for cell in row.select(cell_sel) {
        let Some(stat) = cell.value().attr("data-stat") else {
            continue;
        };
        let text = cell.text().collect::<String>();
        let text = text.trim();
        if stat == "player"
            && let Some(href) = cell
                .select(link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
        {
            record.insert(HREF_KEY, RawValue::Text(href.to_string()));
        }
        let value = if text.is_empty() {
            RawValue::Null
        } else {
            RawValue::Text(text.to_string())
        };
        record.insert(stat, value);
    }
    record.text("player").map(|_| record)
}

fn is_header_row(row: &ElementRef<'_>) -> bool {
    row.value()
        .attr("class")
        .is_some_and(|c| c.split_whitespace().any(|k| k == "thead" || k == "over_header"))
}

fn selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow!("bad selector {raw}: {e}"))
}

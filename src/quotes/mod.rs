//! Current-price lookup and price-delta reporting for held positions.
//!
//! The price fetch is an opaque collaborator behind [`QuoteSource`]; a
//! fetch that fails for any reason degrades to zero (logged, never
//! raised) and leaves the cached price untouched.

mod browser;

pub use browser::BrowserQuoteSource;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, error};

use crate::records::TradeRecord;

/// A way to fetch the current market price for a ticker.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, ticker: &str) -> Result<Decimal>;

    fn name(&self) -> &str;
}

/// Fetch the current price for a ticker, degrading to zero on failure.
pub async fn current_price(source: &dyn QuoteSource, ticker: &str) -> Decimal {
    debug!(ticker, source = source.name(), "Fetching current price");
    match source.fetch_quote(ticker).await {
        Ok(price) => {
            debug!(ticker, %price, "Got current price");
            price
        }
        Err(err) => {
            error!(ticker, error = %err, "Failed to fetch current price");
            Decimal::ZERO
        }
    }
}

/// Last-observed market price per ticker, persisted as a JSON object file
/// between runs.
#[derive(Debug)]
pub struct PriceCache {
    path: PathBuf,
    prices: HashMap<String, Decimal>,
}

impl PriceCache {
    /// Load the cache from `path`. An absent file yields an empty cache;
    /// an unreadable one is logged and replaced on the next save.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let prices = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(prices) => prices,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "Ignoring malformed price cache");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Starting new price cache");
                HashMap::new()
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "Failed to read price cache");
                HashMap::new()
            }
        };

        Self { path, prices }
    }

    pub fn get(&self, ticker: &str) -> Option<Decimal> {
        self.prices.get(ticker).copied()
    }

    pub fn insert(&mut self, ticker: impl Into<String>, price: Decimal) {
        self.prices.insert(ticker.into(), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Persist the cache back to its file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(&self.prices).context("Failed to serialize price cache")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write price cache: {}", self.path.display()))?;

        Ok(())
    }
}

/// Price movement of one held ticker since the previous run.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDelta {
    pub ticker: String,
    pub current: Decimal,
    /// `None` on the first observation of a ticker.
    pub delta: Option<Decimal>,
}

/// Compute price deltas for every currently-held position.
///
/// Each held ticker is looked up once, in record order. A zero price
/// (fetch failure) skips the ticker and leaves its cache entry alone;
/// otherwise the delta against the previous cached price is reported and
/// the cache is updated. The caller persists the cache.
pub async fn compute_deltas(
    records: &[TradeRecord],
    source: &dyn QuoteSource,
    cache: &mut PriceCache,
) -> Vec<PriceDelta> {
    let mut seen = HashSet::new();
    let mut deltas = Vec::new();

    for record in records.iter().filter(|r| r.position.is_held()) {
        if !seen.insert(record.code.clone()) {
            continue;
        }

        let current = current_price(source, &record.code).await;
        if current.is_zero() {
            continue;
        }

        let delta = cache.get(&record.code).map(|previous| current - previous);
        cache.insert(record.code.clone(), current);
        deltas.push(PriceDelta {
            ticker: record.code.clone(),
            current,
            delta,
        });
    }

    deltas
}

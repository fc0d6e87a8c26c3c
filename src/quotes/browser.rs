//! TradingView quote source driven over the Chrome DevTools Protocol.
//!
//! Loads the symbol page in a headless browser and waits for the price
//! element to render; client-side rendering means a plain HTTP fetch
//! would only see an empty shell.

use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::QuotesConfig;

use super::QuoteSource;

/// Element carrying the last price on a TradingView symbol page.
const PRICE_SELECTOR: &str = ".js-symbol-last";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct BrowserQuoteSource {
    browser: Browser,
    handler_task: JoinHandle<()>,
    base_url: String,
    render_timeout: Duration,
}

impl BrowserQuoteSource {
    /// Launch a headless browser for quote fetching.
    pub async fn launch(config: &QuotesConfig) -> Result<Self> {
        let chrome_path = find_chrome()
            .context("Chrome/Chromium not found. Install one to enable quote fetching.")?;

        let browser_config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        Ok(Self {
            browser,
            handler_task,
            base_url: config.base_url.clone(),
            render_timeout: config.render_timeout,
        })
    }

    /// Shut the browser down.
    pub fn close(self) {
        drop(self.browser);
        self.handler_task.abort();
    }

    fn symbol_url(&self, ticker: &str) -> String {
        self.base_url.replace("{code}", ticker)
    }
}

#[async_trait]
impl QuoteSource for BrowserQuoteSource {
    async fn fetch_quote(&self, ticker: &str) -> Result<Decimal> {
        let url = self.symbol_url(ticker);
        debug!(ticker, url = %url, "Loading symbol page");

        let page = self
            .browser
            .new_page(url)
            .await
            .context("Failed to open symbol page")?;

        // Poll until the price element renders with non-empty text.
        let deadline = Instant::now() + self.render_timeout;
        let text = loop {
            if let Ok(element) = page.find_element(PRICE_SELECTOR).await {
                if let Ok(Some(text)) = element.inner_text().await {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        break text;
                    }
                }
            }

            if Instant::now() >= deadline {
                anyhow::bail!(
                    "Price for {ticker} did not render within {:?}",
                    self.render_timeout
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        parse_rendered_price(&text)
            .with_context(|| format!("Unparseable rendered price for {ticker}: {text:?}"))
    }

    fn name(&self) -> &str {
        "tradingview"
    }
}

/// The page renders prices with a locale-dependent decimal separator.
fn parse_rendered_price(text: &str) -> Result<Decimal> {
    let normalized = text.trim().replace(',', ".");
    Decimal::from_str(&normalized).map_err(Into::into)
}

/// Find a Chrome/Chromium executable: `which` first, then known paths.
fn find_chrome() -> Option<String> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(|candidate| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rendered_price_point_separator() {
        assert_eq!(parse_rendered_price("32.10").unwrap(), Decimal::new(3210, 2));
    }

    #[test]
    fn test_parse_rendered_price_comma_separator() {
        assert_eq!(parse_rendered_price("32,10").unwrap(), Decimal::new(3210, 2));
    }

    #[test]
    fn test_parse_rendered_price_rejects_garbage() {
        assert!(parse_rendered_price("--").is_err());
        assert!(parse_rendered_price("").is_err());
    }
}

//! Brokerage fee schedule, loaded once from a local CSV reference file.
//!
//! The schedule is an explicitly constructed, read-only lookup passed to
//! whoever needs it. A missing file yields an empty schedule, and an
//! absent agent key means "no fee data" - neither is an error.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Fee terms for one brokerage agent.
///
/// CSV columns: `agent,name,broker_fee,iss_rate,settlement_fee,exchange_fee`.
/// `broker_fee` is a fixed amount per order; the three rates are fractions
/// applied as below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeeEntry {
    /// Agent code this entry applies to.
    pub agent: String,
    /// Display name of the brokerage.
    pub name: String,
    /// Fixed brokerage fee per order.
    pub broker_fee: Decimal,
    /// ISS municipal tax, as a fraction of the brokerage fee.
    pub iss_rate: Decimal,
    /// Settlement fee, as a fraction of the traded volume.
    pub settlement_fee: Decimal,
    /// Exchange fee, as a fraction of the traded volume.
    pub exchange_fee: Decimal,
}

impl FeeEntry {
    /// Estimated total cost of one order of the given volume.
    pub fn order_cost(&self, volume: Decimal) -> Decimal {
        self.broker_fee * (Decimal::ONE + self.iss_rate)
            + volume * (self.settlement_fee + self.exchange_fee)
    }
}

/// Read-only fee lookup keyed by agent code.
#[derive(Debug, Default)]
pub struct FeeSchedule {
    entries: HashMap<String, FeeEntry>,
}

impl FeeSchedule {
    /// Load the schedule from a CSV file. A missing file yields an empty
    /// schedule; a present-but-malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open fee schedule: {}", path.display()))?;

        let mut entries = HashMap::new();
        for result in reader.deserialize() {
            let entry: FeeEntry = result
                .with_context(|| format!("Malformed fee schedule row in {}", path.display()))?;
            entries.insert(entry.agent.clone(), entry);
        }

        Ok(Self { entries })
    }

    /// Load from an optional path; `None` yields an empty schedule.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Fee terms for an agent, or `None` when there is no fee data.
    pub fn get(&self, agent: &str) -> Option<&FeeEntry> {
        self.entries.get(agent)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

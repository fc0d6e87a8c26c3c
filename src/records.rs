//! Typed trade records parsed from the portal's trading-history table.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Date format used throughout the portal ("31/12/2023").
const PORTAL_DATE_FORMAT: &str = "%d/%m/%Y";

/// Separator between buy and sell dates in the period cell.
const PERIOD_SEPARATOR: &str = " a ";

/// Fixed column positions in a result-table row.
const COL_CODE: usize = 0;
const COL_PERIOD: usize = 1;
const COL_BUY_AMOUNT: usize = 2;
const COL_SELL_AMOUNT: usize = 3;
const COL_BUY_PRICE: usize = 4;
const COL_SELL_PRICE: usize = 5;
const COL_POSITION: usize = 7;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowParseError {
    #[error("row has {got} cells, expected at least {expected}")]
    TooFewCells { got: usize, expected: usize },

    #[error("invalid quantity {value:?} in column {column}")]
    InvalidQuantity { column: usize, value: String },

    #[error("invalid price {value:?} in column {column}")]
    InvalidPrice { column: usize, value: String },

    #[error("invalid date {value:?} in period cell")]
    InvalidDate { value: String },

    #[error("ticker code cell is empty")]
    EmptyCode,
}

/// Position label assigned by the portal to a ticker's lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// "COMPRADA" - the lot is still held.
    Bought,
    /// "ZERADA" - the lot was fully sold.
    Closed,
    /// Any label the portal uses that we don't recognise.
    Other(String),
}

impl PositionStatus {
    pub fn from_label(label: &str) -> Self {
        match label {
            "COMPRADA" => Self::Bought,
            "ZERADA" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Bought => "COMPRADA",
            Self::Closed => "ZERADA",
            Self::Other(label) => label,
        }
    }

    /// True when the lot is still held (sell side absent).
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Bought)
    }
}

/// One row of trading history, fully parsed.
///
/// A record is either fully parsed or parsing fails for the whole row;
/// no partially-populated record is ever constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub code: String,
    pub buy_date: NaiveDate,
    /// Absent means the position is still open.
    pub sell_date: Option<NaiveDate>,
    pub buy_amount: u32,
    pub sell_amount: u32,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub position: PositionStatus,
    /// Code of the brokerage agent this trade was settled through.
    /// Empty when the portal listed none.
    pub agent: String,
}

impl TradeRecord {
    /// Gross profit of a closed lot: `sell_amount * (sell_price - buy_price)`.
    ///
    /// Only meaningful for [`PositionStatus::Closed`] records.
    pub fn profit(&self) -> Decimal {
        Decimal::from(self.sell_amount) * (self.sell_price - self.buy_price)
    }

    /// Total amount paid on the buy side.
    pub fn buy_volume(&self) -> Decimal {
        Decimal::from(self.buy_amount) * self.buy_price
    }

    /// Total amount received on the sell side.
    pub fn sell_volume(&self) -> Decimal {
        Decimal::from(self.sell_amount) * self.sell_price
    }
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            PositionStatus::Bought => write!(
                f,
                "{}: {} bought on {} at R${}",
                self.code, self.buy_amount, self.buy_date, self.buy_price
            ),
            PositionStatus::Closed => write!(
                f,
                "{}: {} traded, profit R${}",
                self.code,
                self.sell_amount,
                self.profit().round_dp(2)
            ),
            PositionStatus::Other(ref label) => {
                write!(f, "{}: unrecognised position {:?}", self.code, label)
            }
        }
    }
}

/// Parse one result-table row into a [`TradeRecord`] tagged with `agent`.
///
/// Strict by design: better to fail loudly than emit wrong financial data.
pub fn parse_row(cells: &[String], agent: &str) -> Result<TradeRecord, RowParseError> {
    let expected = COL_POSITION + 1;
    if cells.len() < expected {
        return Err(RowParseError::TooFewCells {
            got: cells.len(),
            expected,
        });
    }

    let code = cells[COL_CODE].trim().to_string();
    if code.is_empty() {
        return Err(RowParseError::EmptyCode);
    }

    let (buy_date, sell_date) = parse_period(cells[COL_PERIOD].trim())?;
    let buy_amount = parse_quantity(&cells[COL_BUY_AMOUNT], COL_BUY_AMOUNT)?;
    let sell_amount = parse_quantity(&cells[COL_SELL_AMOUNT], COL_SELL_AMOUNT)?;
    let buy_price = parse_price(&cells[COL_BUY_PRICE], COL_BUY_PRICE)?;
    let sell_price = parse_price(&cells[COL_SELL_PRICE], COL_SELL_PRICE)?;
    let position = PositionStatus::from_label(cells[COL_POSITION].trim());

    Ok(TradeRecord {
        code,
        buy_date,
        sell_date,
        buy_amount,
        sell_amount,
        buy_price,
        sell_price,
        position,
        agent: agent.to_string(),
    })
}

/// Split the period cell into buy and sell dates.
///
/// "01/01/2023" is an open position; "01/01/2023 a 15/02/2023" is closed.
/// No ordering between the two dates is assumed.
fn parse_period(period: &str) -> Result<(NaiveDate, Option<NaiveDate>), RowParseError> {
    match period.split_once(PERIOD_SEPARATOR) {
        Some((buy, sell)) => Ok((parse_date(buy)?, Some(parse_date(sell)?))),
        None => Ok((parse_date(period)?, None)),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, RowParseError> {
    NaiveDate::parse_from_str(value.trim(), PORTAL_DATE_FORMAT).map_err(|_| {
        RowParseError::InvalidDate {
            value: value.trim().to_string(),
        }
    })
}

fn parse_quantity(value: &str, column: usize) -> Result<u32, RowParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| RowParseError::InvalidQuantity {
            column,
            value: value.trim().to_string(),
        })
}

/// Prices arrive locale-formatted with a comma decimal separator ("12,34").
fn parse_price(value: &str, column: usize) -> Result<Decimal, RowParseError> {
    let normalized = value.trim().replace(',', ".");
    Decimal::from_str(&normalized).map_err(|_| RowParseError::InvalidPrice {
        column,
        value: value.trim().to_string(),
    })
}

//! Type definitions for the GreenGrocer pipeline
//!
//! Raw records mirror the bronze CSV exports: every cell is untyped text and
//! any column may be absent. Cleaned records carry fixed semantic types and
//! are unique by natural key. Enriched records add the product dimension name.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Natural key identifier (transaction_id, delivery_id, product_id)
pub type NaturalKey = String;

/// Raw input collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Point-of-sale transactions
    Sales,
    /// Store delivery manifests
    Inventory,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Sales => "sales",
            Dataset::Inventory => "inventory",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a raw record came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Source file path
    pub file: String,
    /// 1-based line number in the source file
    pub line: u64,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u64) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A raw bronze record read from a CSV export
pub trait RawRecord: DeserializeOwned + Send + 'static {
    /// Collection this record belongs to
    const DATASET: Dataset;

    /// Attach the file/line the record was read from
    fn set_source(&mut self, source: SourceLocation);

    /// File/line the record was read from, if known
    fn source(&self) -> Option<&SourceLocation>;

    /// Natural key value as read (untrimmed)
    fn natural_key(&self) -> Option<&str>;
}

/// Raw sales transaction (all fields untyped)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSale {
    pub transaction_id: Option<String>,
    pub store_id: Option<String>,
    pub transaction_timestamp: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub total_amount: Option<String>,
    #[serde(skip)]
    pub source: Option<SourceLocation>,
}

impl RawRecord for RawSale {
    const DATASET: Dataset = Dataset::Sales;

    fn set_source(&mut self, source: SourceLocation) {
        self.source = Some(source);
    }

    fn source(&self) -> Option<&SourceLocation> {
        self.source.as_ref()
    }

    fn natural_key(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }
}

/// Raw inventory delivery event (all fields untyped)
///
/// The exports also carry a redundant `product_name`; it is ignored since the
/// dimension supplies the display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDelivery {
    pub delivery_id: Option<String>,
    pub delivery_date: Option<String>,
    pub store_id: Option<String>,
    pub product_id: Option<String>,
    pub quantity_delivered: Option<String>,
    pub delivery_status: Option<String>,
    #[serde(skip)]
    pub source: Option<SourceLocation>,
}

impl RawRecord for RawDelivery {
    const DATASET: Dataset = Dataset::Inventory;

    fn set_source(&mut self, source: SourceLocation) {
        self.source = Some(source);
    }

    fn source(&self) -> Option<&SourceLocation> {
        self.source.as_ref()
    }

    fn natural_key(&self) -> Option<&str> {
        self.delivery_id.as_deref()
    }
}

/// Cleaned sale: one row per `transaction_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedSale {
    pub transaction_id: NaturalKey,
    pub store_id: Option<String>,
    pub transaction_timestamp: NaiveDateTime,
    pub product_id: String,
    /// Name as printed on the transaction (may contain typos)
    pub product_name: Option<String>,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
}

/// Cleaned delivery: one row per `delivery_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedDelivery {
    pub delivery_id: NaturalKey,
    pub delivery_date: NaiveDate,
    pub store_id: String,
    pub product_id: String,
    pub quantity_delivered: i64,
    pub delivery_status: Option<String>,
}

/// Product dimension row: one per `product_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDimension {
    pub product_id: NaturalKey,
    pub product_name: Option<String>,
    pub current_price: Decimal,
    /// Timestamp of the sale the name and price were taken from
    pub price_observed_at: NaiveDateTime,
}

/// Cleaned sale joined with the product dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedSale {
    pub sale: CleanedSale,
    /// Dimension name; `None` when the product has no dimension row
    pub product_name: Option<String>,
}

/// Cleaned delivery joined with the product dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedDelivery {
    pub delivery: CleanedDelivery,
    /// Dimension name; `None` when the product has no dimension row
    pub product_name: Option<String>,
}

/// Which duplicate survives when several records share a natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyPolicy {
    /// Greatest tie-break value wins; on equal values the later input row wins
    LatestWins,
    /// Smallest tie-break value wins; on equal values the earlier input row wins
    EarliestWins,
}

/// Recency rule used by both staging dedup and the product dimension
pub const DEFAULT_RECENCY_POLICY: RecencyPolicy = RecencyPolicy::LatestWins;

impl RecencyPolicy {
    /// Whether `candidate` (seen after `current` in input order) replaces it
    pub fn prefers<O: Ord>(&self, candidate: &O, current: &O) -> bool {
        match self {
            RecencyPolicy::LatestWins => candidate >= current,
            RecencyPolicy::EarliestWins => candidate < current,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecencyPolicy::LatestWins => "latest",
            RecencyPolicy::EarliestWins => "earliest",
        }
    }
}

impl Default for RecencyPolicy {
    fn default() -> Self {
        DEFAULT_RECENCY_POLICY
    }
}

impl fmt::Display for RecencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" | "latest_wins" | "last" => Ok(RecencyPolicy::LatestWins),
            "earliest" | "earliest_wins" | "first" => Ok(RecencyPolicy::EarliestWins),
            other => Err(format!("unknown recency policy: {}", other)),
        }
    }
}

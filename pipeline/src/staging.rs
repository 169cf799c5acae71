//! Staging: deduplicate and type the raw collections
//!
//! Each raw record is typed first; records that fail coercion are rejected
//! with a [`RecordError`]. Well-formed records are then grouped by natural key
//! and each group is reduced to one record by the recency policy applied to
//! the tie-break column (sale timestamp or delivery date).

use greengrocer_common::{
    CleanedDelivery, CleanedSale, Dataset, RawDelivery, RawRecord, RawSale, RecencyPolicy,
    RecordError, RecordErrorKind,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::coerce;

/// Result of a group-and-reduce pass
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced<T> {
    /// One row per key, sorted by key
    pub rows: Vec<T>,
    /// Rows that lost to another row with the same key
    pub dropped: usize,
}

/// Keep one row per key according to `policy`
///
/// `rows` must be in input order: on equal ordering values the later row wins
/// under `LatestWins` and the earlier one under `EarliestWins`. The output is
/// sorted by key, which makes snapshots reproducible.
pub fn reduce_by_key<T, K, O>(
    rows: impl IntoIterator<Item = T>,
    policy: RecencyPolicy,
    key: impl Fn(&T) -> K,
    order: impl Fn(&T) -> O,
) -> Reduced<T>
where
    K: Ord,
    O: Ord,
{
    let mut winners: BTreeMap<K, (O, T)> = BTreeMap::new();
    let mut dropped = 0usize;

    for row in rows {
        let row_order = order(&row);
        match winners.entry(key(&row)) {
            Entry::Vacant(slot) => {
                slot.insert((row_order, row));
            }
            Entry::Occupied(mut slot) => {
                dropped += 1;
                if policy.prefers(&row_order, &slot.get().0) {
                    slot.insert((row_order, row));
                }
            }
        }
    }

    Reduced {
        rows: winners.into_values().map(|(_, row)| row).collect(),
        dropped,
    }
}

/// Typed records plus the rejects
#[derive(Debug, Clone, PartialEq)]
pub struct Typed<T> {
    /// Well-formed records in input order (duplicates included)
    pub rows: Vec<T>,
    pub errors: Vec<RecordError>,
}

/// Output of a staging pass
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    /// One row per natural key, sorted by key
    pub rows: Vec<T>,
    pub errors: Vec<RecordError>,
    pub duplicates_dropped: usize,
}

fn reject<R: RawRecord>(raw: &R, kind: RecordErrorKind) -> RecordError {
    RecordError::new(R::DATASET, kind)
        .with_natural_key(raw.natural_key().map(str::trim))
        .with_source(raw.source())
}

/// Type a raw sale
pub fn type_sale(raw: &RawSale) -> Result<CleanedSale, RecordError> {
    let transaction_id = coerce::text(raw.transaction_id.as_deref())
        .ok_or_else(|| reject(raw, RecordErrorKind::missing_key("transaction_id")))?;
    if coerce::text(raw.transaction_timestamp.as_deref()).is_none() {
        return Err(reject(
            raw,
            RecordErrorKind::missing_key("transaction_timestamp"),
        ));
    }

    let typed = || -> Result<CleanedSale, RecordErrorKind> {
        Ok(CleanedSale {
            transaction_timestamp: coerce::timestamp(
                "transaction_timestamp",
                raw.transaction_timestamp.as_deref(),
            )?,
            store_id: coerce::text(raw.store_id.as_deref()),
            product_id: coerce::required_text("product_id", raw.product_id.as_deref())?,
            product_name: coerce::text(raw.product_name.as_deref()),
            quantity: coerce::quantity("quantity", raw.quantity.as_deref())?,
            unit_price: coerce::money("unit_price", raw.unit_price.as_deref())?,
            total_amount: coerce::money("total_amount", raw.total_amount.as_deref())?,
            transaction_id: transaction_id.clone(),
        })
    };

    typed().map_err(|kind| reject(raw, kind))
}

/// Type a raw delivery
pub fn type_delivery(raw: &RawDelivery) -> Result<CleanedDelivery, RecordError> {
    let delivery_id = coerce::text(raw.delivery_id.as_deref())
        .ok_or_else(|| reject(raw, RecordErrorKind::missing_key("delivery_id")))?;
    if coerce::text(raw.delivery_date.as_deref()).is_none() {
        return Err(reject(raw, RecordErrorKind::missing_key("delivery_date")));
    }

    let typed = || -> Result<CleanedDelivery, RecordErrorKind> {
        Ok(CleanedDelivery {
            delivery_date: coerce::date("delivery_date", raw.delivery_date.as_deref())?,
            store_id: coerce::required_text("store_id", raw.store_id.as_deref())?,
            product_id: coerce::required_text("product_id", raw.product_id.as_deref())?,
            quantity_delivered: coerce::quantity(
                "quantity_delivered",
                raw.quantity_delivered.as_deref(),
            )?,
            delivery_status: coerce::text(raw.delivery_status.as_deref()),
            delivery_id: delivery_id.clone(),
        })
    };

    typed().map_err(|kind| reject(raw, kind))
}

fn type_all<R, T>(raw: &[R], type_one: impl Fn(&R) -> Result<T, RecordError>) -> Typed<T>
where
    R: RawRecord,
{
    let mut typed = Typed {
        rows: Vec::with_capacity(raw.len()),
        errors: Vec::new(),
    };

    for record in raw {
        match type_one(record) {
            Ok(row) => typed.rows.push(row),
            Err(error) => {
                warn!(
                    dataset = %R::DATASET,
                    source = ?error.source,
                    "Rejected record: {}",
                    error.kind
                );
                typed.errors.push(error);
            }
        }
    }

    debug!(
        "Typed {} of {} {} records",
        typed.rows.len(),
        raw.len(),
        R::DATASET
    );
    typed
}

/// Type every raw sale, keeping duplicates
pub fn type_sales(raw: &[RawSale]) -> Typed<CleanedSale> {
    type_all(raw, type_sale)
}

/// Type every raw delivery, keeping duplicates
pub fn type_deliveries(raw: &[RawDelivery]) -> Typed<CleanedDelivery> {
    type_all(raw, type_delivery)
}

/// One sale per transaction_id, by sale timestamp
pub fn deduplicate_sales(rows: Vec<CleanedSale>, policy: RecencyPolicy) -> Reduced<CleanedSale> {
    reduce_by_key(
        rows,
        policy,
        |sale| sale.transaction_id.clone(),
        |sale| sale.transaction_timestamp,
    )
}

/// One delivery per delivery_id, by delivery date
pub fn deduplicate_deliveries(
    rows: Vec<CleanedDelivery>,
    policy: RecencyPolicy,
) -> Reduced<CleanedDelivery> {
    reduce_by_key(
        rows,
        policy,
        |delivery| delivery.delivery_id.clone(),
        |delivery| delivery.delivery_date,
    )
}

fn stage<T>(
    dataset: Dataset,
    typed: Typed<T>,
    dedup: impl FnOnce(Vec<T>) -> Reduced<T>,
) -> Staged<T> {
    let Typed { rows, errors } = typed;
    let reduced = dedup(rows);
    info!(
        "Staged {} {} rows ({} duplicates dropped, {} rejected)",
        reduced.rows.len(),
        dataset,
        reduced.dropped,
        errors.len()
    );
    Staged {
        rows: reduced.rows,
        errors,
        duplicates_dropped: reduced.dropped,
    }
}

/// Deduplicate typed sales, carrying their rejections along
pub fn stage_sales(typed: Typed<CleanedSale>, policy: RecencyPolicy) -> Staged<CleanedSale> {
    stage(Dataset::Sales, typed, |rows| deduplicate_sales(rows, policy))
}

/// Deduplicate typed deliveries, carrying their rejections along
pub fn stage_deliveries(
    typed: Typed<CleanedDelivery>,
    policy: RecencyPolicy,
) -> Staged<CleanedDelivery> {
    stage(Dataset::Inventory, typed, |rows| {
        deduplicate_deliveries(rows, policy)
    })
}

/// Clean the raw sales collection
#[instrument(skip(raw), fields(records = raw.len()))]
pub fn clean_sales(raw: &[RawSale], policy: RecencyPolicy) -> Staged<CleanedSale> {
    stage_sales(type_sales(raw), policy)
}

/// Clean the raw inventory collection
#[instrument(skip(raw), fields(records = raw.len()))]
pub fn clean_deliveries(raw: &[RawDelivery], policy: RecencyPolicy) -> Staged<CleanedDelivery> {
    stage_deliveries(type_deliveries(raw), policy)
}

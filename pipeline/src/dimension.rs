//! Product dimension derived from the sales stream
//!
//! The dimension is not master data: each product's name and current price
//! come from a single sale chosen by the recency policy. It is built from every
//! well-formed sale (before transaction dedup) so a resubmitted duplicate can
//! still carry the newest price.

use greengrocer_common::{CleanedSale, ProductDimension, RecencyPolicy};
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::staging::reduce_by_key;

/// Derive one dimension row per product_id, sorted by product_id
#[instrument(skip(sales), fields(sales = sales.len()))]
pub fn derive_products(sales: &[CleanedSale], policy: RecencyPolicy) -> Vec<ProductDimension> {
    let reduced = reduce_by_key(
        sales.iter(),
        policy,
        |sale| sale.product_id.clone(),
        |sale| sale.transaction_timestamp,
    );

    let products: Vec<ProductDimension> = reduced
        .rows
        .into_iter()
        .map(|sale| ProductDimension {
            product_id: sale.product_id.clone(),
            product_name: sale.product_name.clone(),
            current_price: sale.unit_price,
            price_observed_at: sale.transaction_timestamp,
        })
        .collect();

    info!(
        "Derived {} products from {} sales",
        products.len(),
        sales.len()
    );
    products
}

/// Lookup table used by the enrichment joins, unique by product_id
#[derive(Debug, Clone, Default)]
pub struct ProductReference {
    by_id: HashMap<String, ProductDimension>,
}

impl ProductReference {
    /// Build from dimension rows; a later row for the same id replaces an earlier one
    pub fn new(products: &[ProductDimension]) -> Self {
        let by_id = products
            .iter()
            .map(|product| (product.product_id.clone(), product.clone()))
            .collect();
        Self { by_id }
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductDimension> {
        self.by_id.get(product_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

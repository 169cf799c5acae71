//! Marts: cleaned records left-joined with the product reference
//!
//! Every input row appears exactly once in the output. A product without a
//! dimension row is a reference miss, not an error: the name is left null.

use greengrocer_common::{CleanedDelivery, CleanedSale, EnrichedDelivery, EnrichedSale};
use tracing::{debug, info, instrument};

use crate::dimension::ProductReference;

/// Joined rows plus the number of reference misses
#[derive(Debug, Clone, PartialEq)]
pub struct Enriched<T> {
    pub rows: Vec<T>,
    pub reference_misses: usize,
}

fn left_join<C, E>(
    cleaned: Vec<C>,
    reference: &ProductReference,
    product_id: impl Fn(&C) -> &str,
    build: impl Fn(C, Option<String>) -> E,
) -> Enriched<E> {
    let mut reference_misses = 0usize;

    let rows = cleaned
        .into_iter()
        .map(|row| {
            let name = match reference.get(product_id(&row)) {
                Some(product) => product.product_name.clone(),
                None => {
                    debug!("No product dimension row for {}", product_id(&row));
                    reference_misses += 1;
                    None
                }
            };
            build(row, name)
        })
        .collect();

    Enriched {
        rows,
        reference_misses,
    }
}

/// Attach dimension names to cleaned sales
#[instrument(skip_all, fields(rows = sales.len(), products = reference.len()))]
pub fn enrich_sales(
    sales: Vec<CleanedSale>,
    reference: &ProductReference,
) -> Enriched<EnrichedSale> {
    let enriched = left_join(
        sales,
        reference,
        |sale| sale.product_id.as_str(),
        |sale, product_name| EnrichedSale { sale, product_name },
    );
    info!(
        "Enriched {} sales ({} reference misses)",
        enriched.rows.len(),
        enriched.reference_misses
    );
    enriched
}

/// Attach dimension names to cleaned deliveries
#[instrument(skip_all, fields(rows = deliveries.len(), products = reference.len()))]
pub fn enrich_deliveries(
    deliveries: Vec<CleanedDelivery>,
    reference: &ProductReference,
) -> Enriched<EnrichedDelivery> {
    let enriched = left_join(
        deliveries,
        reference,
        |delivery| delivery.product_id.as_str(),
        |delivery, product_name| EnrichedDelivery {
            delivery,
            product_name,
        },
    );
    info!(
        "Enriched {} deliveries ({} reference misses)",
        enriched.rows.len(),
        enriched.reference_misses
    );
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use greengrocer_common::ProductDimension;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn reference() -> ProductReference {
        ProductReference::new(&[ProductDimension {
            product_id: "P1".to_string(),
            product_name: Some("Lait Entier".to_string()),
            current_price: Decimal::from_str("1.20").unwrap(),
            price_observed_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }])
    }

    fn sale(id: &str, product: &str) -> CleanedSale {
        CleanedSale {
            transaction_id: id.to_string(),
            store_id: Some("STORE_001".to_string()),
            transaction_timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            product_id: product.to_string(),
            product_name: Some("Mlk".to_string()),
            quantity: 3,
            unit_price: Decimal::from_str("1.20").unwrap(),
            total_amount: Decimal::from_str("3.60").unwrap(),
        }
    }

    fn delivery(id: &str, product: &str) -> CleanedDelivery {
        CleanedDelivery {
            delivery_id: id.to_string(),
            delivery_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            store_id: "STORE_001".to_string(),
            product_id: product.to_string(),
            quantity_delivered: 40,
            delivery_status: Some("Received".to_string()),
        }
    }

    #[test]
    fn test_enrich_sales_match_and_miss() {
        let sales = vec![sale("T1", "P1"), sale("T2", "P9")];

        let enriched = enrich_sales(sales.clone(), &reference());

        assert_eq!(enriched.rows.len(), sales.len());
        assert_eq!(enriched.reference_misses, 1);
        assert_eq!(enriched.rows[0].product_name.as_deref(), Some("Lait Entier"));
        assert_eq!(enriched.rows[0].sale.product_name.as_deref(), Some("Mlk"));
        assert_eq!(enriched.rows[1].product_name, None);
        assert_eq!(enriched.rows[1].sale, sales[1]);
    }

    #[test]
    fn test_enrich_deliveries_preserves_cardinality() {
        let deliveries = vec![
            delivery("D1", "P1"),
            delivery("D2", "P1"),
            delivery("D3", "P2"),
        ];

        let enriched = enrich_deliveries(deliveries, &reference());

        assert_eq!(enriched.rows.len(), 3);
        assert_eq!(enriched.reference_misses, 1);
        let names: Vec<_> = enriched
            .rows
            .iter()
            .map(|r| r.product_name.as_deref())
            .collect();
        assert_eq!(names, vec![Some("Lait Entier"), Some("Lait Entier"), None]);
    }

    #[test]
    fn test_empty_reference_yields_all_misses() {
        let enriched = enrich_sales(vec![sale("T1", "P1")], &ProductReference::default());
        assert_eq!(enriched.rows.len(), 1);
        assert_eq!(enriched.reference_misses, 1);
        assert_eq!(enriched.rows[0].product_name, None);
    }
}

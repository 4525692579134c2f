//! # Line-Item Reconciliation
//!
//! Pure planning step of the stock reconciliation engine: given the line items
//! a sale currently has and the set it should have, work out which rows to
//! insert, update and delete, and the net stock change per product.
//!
//! ## Delta Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Change                          Net delta (+ = units leave stock)      │
//! │  ──────────────────────────────  ─────────────────────────────────────  │
//! │  new line (qty n)                +n on its product                      │
//! │  existing line n₀ → n            +(n - n₀)                              │
//! │  existing line moved P → Q       -n₀ on P, +n on Q                      │
//! │  removed line (qty n₀)           -n₀ (stock returned)                   │
//! │                                                                         │
//! │  Deltas are summed per product. Every product with a positive net      │
//! │  delta must have quantity_on_hand >= delta, checked for ALL products   │
//! │  before the first write.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sale whose stock was never taken (`stock_reconciled == false`) plans as if
//! every original quantity were zero: targets deduct their full quantity and
//! removals return nothing.
//!
//! The storage layer applies a plan inside one transaction; nothing here
//! touches I/O.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Product, SaleItem};
use crate::validation::{validate_price_cents, validate_quantity};

// =============================================================================
// Input
// =============================================================================

/// A line item as it should exist after the edit.
///
/// `id: None` means a new line. An existing line that is neither listed in the
/// target set nor in the removed set is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TargetLine {
    #[serde(default)]
    pub id: Option<i64>,
    pub product_id: i64,
    pub quantity: i64,
    /// Explicit price. When absent, new lines (and lines moved to another
    /// product) take the product's current price; untouched lines keep theirs.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
}

impl TargetLine {
    /// A new line at the product's current price.
    pub fn new_line(product_id: i64, quantity: i64) -> Self {
        TargetLine {
            id: None,
            product_id,
            quantity,
            unit_price_cents: None,
        }
    }

    /// An existing line with a new quantity.
    pub fn existing(id: i64, product_id: i64, quantity: i64) -> Self {
        TargetLine {
            id: Some(id),
            product_id,
            quantity,
            unit_price_cents: None,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// A line to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInsert {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// An existing line whose product, quantity or price changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub line_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Everything the storage layer must do to move a sale to its target lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub inserts: Vec<PlannedInsert>,
    pub updates: Vec<PlannedUpdate>,
    pub deletes: Vec<i64>,
    /// Net units leaving stock, per product. Negative values return stock.
    deltas: BTreeMap<i64, i64>,
    /// Σ quantity × unit price over the target lines.
    total: Money,
}

impl ReconcilePlan {
    /// Net delta per product, zero entries skipped, in product id order.
    pub fn stock_deltas(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.deltas
            .iter()
            .filter(|(_, delta)| **delta != 0)
            .map(|(id, delta)| (*id, *delta))
    }

    /// Net delta for one product.
    pub fn delta_for(&self, product_id: i64) -> i64 {
        self.deltas.get(&product_id).copied().unwrap_or(0)
    }

    /// Sale total once the plan is applied.
    pub fn total(&self) -> Money {
        self.total
    }

    /// True when applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.stock_deltas().next().is_none()
    }

    fn add_delta(&mut self, product_id: i64, delta: i64) -> CoreResult<()> {
        let net = self.deltas.entry(product_id).or_insert(0);
        *net = net.checked_add(delta).ok_or_else(|| {
            ValidationError::invalid_format("quantity", "total for one product is too large")
        })?;
        Ok(())
    }

    fn add_line(&mut self, quantity: i64, unit_price_cents: i64) -> CoreResult<()> {
        let line = Money::from_cents(unit_price_cents).checked_multiply_quantity(quantity)?;
        self.total = self.total.checked_add(line)?;
        Ok(())
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Diffs `existing` against `target` and `removed`.
///
/// ## Arguments
/// * `existing` - line items currently persisted for the sale
/// * `target` - line items the sale should have
/// * `removed` - ids of existing lines explicitly removed
/// * `products` - every product referenced by `existing` or `target`
/// * `stock_applied` - whether `existing` quantities were already taken from stock
///
/// ## Errors
/// * `UnknownLineItem` - a target or removed id is not on this sale
/// * `UnknownProduct` - a target references a product not in `products`
/// * `Validation` - quantity or price out of range, a sum that overflows, a line
///   listed twice or both kept and removed
pub fn plan_reconciliation(
    existing: &[SaleItem],
    target: &[TargetLine],
    removed: &[i64],
    products: &HashMap<i64, Product>,
    stock_applied: bool,
) -> CoreResult<ReconcilePlan> {
    let by_id: HashMap<i64, &SaleItem> = existing.iter().map(|line| (line.id, line)).collect();
    let original = |line: &SaleItem| if stock_applied { line.quantity } else { 0 };

    let mut removed_set = HashSet::new();
    for id in removed {
        if !by_id.contains_key(id) {
            return Err(CoreError::UnknownLineItem(*id));
        }
        removed_set.insert(*id);
    }

    let mut plan = ReconcilePlan::default();
    let mut kept = HashSet::new();

    for line in target {
        validate_quantity(line.quantity)?;
        if let Some(price) = line.unit_price_cents {
            validate_price_cents(price)?;
        }
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| CoreError::UnknownProduct(line.product_id.to_string()))?;

        match line.id {
            None => {
                let unit_price_cents = line.unit_price_cents.unwrap_or(product.price_cents);
                plan.add_delta(product.id, line.quantity)?;
                plan.add_line(line.quantity, unit_price_cents)?;
                plan.inserts.push(PlannedInsert {
                    product_id: product.id,
                    quantity: line.quantity,
                    unit_price_cents,
                });
            }
            Some(id) => {
                let current = *by_id.get(&id).ok_or(CoreError::UnknownLineItem(id))?;
                if removed_set.contains(&id) {
                    return Err(ValidationError::invalid_format(
                        "line items",
                        format!("line {} is both kept and removed", id),
                    )
                    .into());
                }
                if !kept.insert(id) {
                    return Err(ValidationError::Duplicate {
                        field: "line item".to_string(),
                        value: id.to_string(),
                    }
                    .into());
                }

                let moved = current.product_id != product.id;
                if moved {
                    plan.add_delta(current.product_id, -original(current))?;
                    plan.add_delta(product.id, line.quantity)?;
                } else {
                    plan.add_delta(product.id, line.quantity - original(current))?;
                }

                let unit_price_cents = match line.unit_price_cents {
                    Some(price) => price,
                    None if moved => product.price_cents,
                    None => current.unit_price_cents,
                };
                plan.add_line(line.quantity, unit_price_cents)?;

                if moved
                    || line.quantity != current.quantity
                    || unit_price_cents != current.unit_price_cents
                {
                    plan.updates.push(PlannedUpdate {
                        line_id: id,
                        product_id: product.id,
                        quantity: line.quantity,
                        unit_price_cents,
                    });
                }
            }
        }
    }

    // Explicitly removed lines and existing lines missing from the target.
    for line in existing {
        if !kept.contains(&line.id) {
            plan.add_delta(line.product_id, -original(line))?;
            plan.deletes.push(line.id);
        }
    }

    Ok(plan)
}

/// Verifies every product with a positive net delta has enough stock.
///
/// Runs over the whole plan before anything is written; the first shortfall
/// (in product id order) is reported.
pub fn check_availability(plan: &ReconcilePlan, products: &HashMap<i64, Product>) -> CoreResult<()> {
    for (product_id, delta) in plan.stock_deltas() {
        if delta <= 0 {
            continue;
        }
        let product = products
            .get(&product_id)
            .ok_or_else(|| CoreError::UnknownProduct(product_id.to_string()))?;
        if !product.can_sell(delta) {
            return Err(CoreError::InsufficientStock {
                product: product.name.clone(),
                available: product.quantity,
                requested: delta,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: i64, quantity: i64, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id,
            name: format!("Product {}", id),
            code: format!("P-{}", id),
            quantity,
            price_cents,
            category_id: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(id: i64, product_id: i64, quantity: i64, unit_price_cents: i64) -> SaleItem {
        SaleItem {
            id,
            sale_id: 1,
            product_id,
            quantity,
            unit_price_cents,
        }
    }

    fn catalog(products: Vec<Product>) -> HashMap<i64, Product> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    #[test]
    fn test_new_lines_take_current_price_and_positive_delta() {
        let products = catalog(vec![product(1, 10, 250)]);
        let target = vec![TargetLine::new_line(1, 4)];

        let plan = plan_reconciliation(&[], &target, &[], &products, true).unwrap();

        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].unit_price_cents, 250);
        assert_eq!(plan.delta_for(1), 4);
        check_availability(&plan, &products).unwrap();
    }

    #[test]
    fn test_quantity_increase_uses_difference() {
        // stock 8 after an existing line of 2; editing to 5 needs 3 more
        let products = catalog(vec![product(1, 8, 100)]);
        let existing = vec![line(7, 1, 2, 100)];
        let target = vec![TargetLine::existing(7, 1, 5)];

        let plan = plan_reconciliation(&existing, &target, &[], &products, true).unwrap();

        assert_eq!(plan.delta_for(1), 3);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].quantity, 5);
        check_availability(&plan, &products).unwrap();
    }

    #[test]
    fn test_explicit_removal_returns_stock() {
        let products = catalog(vec![product(1, 0, 100)]);
        let existing = vec![line(7, 1, 4, 100)];

        let plan = plan_reconciliation(&existing, &[], &[7], &products, true).unwrap();

        assert_eq!(plan.deletes, vec![7]);
        assert_eq!(plan.delta_for(1), -4);
        check_availability(&plan, &products).unwrap();
    }

    #[test]
    fn test_line_missing_from_target_is_deleted() {
        let products = catalog(vec![product(1, 5, 100), product(2, 5, 100)]);
        let existing = vec![line(7, 1, 1, 100), line(8, 2, 2, 100)];
        let target = vec![TargetLine::existing(7, 1, 1)];

        let plan = plan_reconciliation(&existing, &target, &[], &products, true).unwrap();

        assert_eq!(plan.deletes, vec![8]);
        assert_eq!(plan.delta_for(2), -2);
        assert!(plan.updates.is_empty(), "untouched line must not be rewritten");
    }

    #[test]
    fn test_untouched_line_keeps_its_snapshot_price() {
        // catalog price moved from 100 to 150 since the sale
        let products = catalog(vec![product(1, 5, 150)]);
        let existing = vec![line(7, 1, 2, 100)];
        let target = vec![TargetLine::existing(7, 1, 3)];

        let plan = plan_reconciliation(&existing, &target, &[], &products, true).unwrap();

        assert_eq!(plan.updates[0].unit_price_cents, 100);
    }

    #[test]
    fn test_moving_a_line_to_another_product() {
        let products = catalog(vec![product(1, 0, 100), product(2, 10, 300)]);
        let existing = vec![line(7, 1, 2, 100)];
        let target = vec![TargetLine::existing(7, 2, 3)];

        let plan = plan_reconciliation(&existing, &target, &[], &products, true).unwrap();

        assert_eq!(plan.delta_for(1), -2);
        assert_eq!(plan.delta_for(2), 3);
        assert_eq!(plan.updates[0].unit_price_cents, 300);
    }

    #[test]
    fn test_deltas_are_netted_per_product() {
        // return 4 from one line and take 5 on a new one: net +1
        let products = catalog(vec![product(1, 1, 100)]);
        let existing = vec![line(7, 1, 4, 100)];
        let target = vec![TargetLine::new_line(1, 5)];

        let plan = plan_reconciliation(&existing, &target, &[7], &products, true).unwrap();

        assert_eq!(plan.delta_for(1), 1);
        check_availability(&plan, &products).unwrap();
    }

    #[test]
    fn test_shortfall_reports_available_and_requested() {
        let products = catalog(vec![product(1, 10, 100), product(2, 3, 100)]);
        let target = vec![TargetLine::new_line(1, 2), TargetLine::new_line(2, 5)];

        let plan = plan_reconciliation(&[], &target, &[], &products, true).unwrap();
        let err = check_availability(&plan, &products).unwrap_err();

        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product: "Product 2".to_string(),
                available: 3,
                requested: 5,
            }
        );
    }

    #[test]
    fn test_unreconciled_sale_deducts_full_quantities() {
        let products = catalog(vec![product(1, 10, 100), product(2, 10, 100)]);
        let existing = vec![line(7, 1, 2, 100), line(8, 2, 6, 100)];
        let target = vec![TargetLine::existing(7, 1, 3)];

        let plan = plan_reconciliation(&existing, &target, &[8], &products, false).unwrap();

        assert_eq!(plan.delta_for(1), 3);
        assert_eq!(plan.delta_for(2), 0, "never deducted, nothing to return");
    }

    #[test]
    fn test_unknown_ids_are_rejected() {
        let products = catalog(vec![product(1, 10, 100)]);
        let existing = vec![line(7, 1, 2, 100)];

        let err = plan_reconciliation(&existing, &[], &[99], &products, true).unwrap_err();
        assert_eq!(err, CoreError::UnknownLineItem(99));

        let target = vec![TargetLine::existing(42, 1, 1)];
        let err = plan_reconciliation(&existing, &target, &[], &products, true).unwrap_err();
        assert_eq!(err, CoreError::UnknownLineItem(42));

        let target = vec![TargetLine::new_line(5, 1)];
        let err = plan_reconciliation(&existing, &target, &[], &products, true).unwrap_err();
        assert_eq!(err, CoreError::UnknownProduct("5".to_string()));
    }

    #[test]
    fn test_invalid_target_shapes_are_rejected() {
        let products = catalog(vec![product(1, 10, 100)]);
        let existing = vec![line(7, 1, 2, 100)];

        let zero = vec![TargetLine::new_line(1, 0)];
        assert!(matches!(
            plan_reconciliation(&existing, &zero, &[], &products, true),
            Err(CoreError::Validation(_))
        ));

        let twice = vec![TargetLine::existing(7, 1, 1), TargetLine::existing(7, 1, 2)];
        assert!(matches!(
            plan_reconciliation(&existing, &twice, &[], &products, true),
            Err(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));

        let kept_and_removed = vec![TargetLine::existing(7, 1, 1)];
        assert!(matches!(
            plan_reconciliation(&existing, &kept_and_removed, &[7], &products, true),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_plan_total_covers_kept_and_new_lines() {
        let products = catalog(vec![product(1, 10, 150), product(2, 10, 300)]);
        let existing = vec![line(7, 1, 2, 100), line(8, 2, 1, 300)];
        let target = vec![TargetLine::existing(7, 1, 3), TargetLine::new_line(2, 2)];

        let plan = plan_reconciliation(&existing, &target, &[8], &products, true).unwrap();

        // line 7 keeps its 100 snapshot, the new line takes 300
        assert_eq!(plan.total().cents(), 3 * 100 + 2 * 300);
    }

    #[test]
    fn test_oversized_requests_are_rejected_before_any_delta() {
        let products = catalog(vec![product(1, 10, 100)]);

        let huge = vec![TargetLine::new_line(1, i64::MAX), TargetLine::new_line(1, i64::MAX)];
        assert!(matches!(
            plan_reconciliation(&[], &huge, &[], &products, true),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let pricey = vec![TargetLine {
            unit_price_cents: Some(i64::MAX),
            ..TargetLine::new_line(1, 2)
        }];
        assert!(matches!(
            plan_reconciliation(&[], &pricey, &[], &products, true),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_persisted_values_that_overflow_are_rejected() {
        // rows written before the bounds existed; only the arithmetic guards them
        let products = catalog(vec![product(1, 10, i64::MAX)]);
        let existing = vec![line(7, 1, 1, i64::MAX)];
        let target = vec![TargetLine::existing(7, 1, 2)];

        let err = plan_reconciliation(&existing, &target, &[], &products, true).unwrap_err();
        assert_eq!(err, ValidationError::invalid_format("total", "amount too large").into());

        let existing = vec![line(7, 1, i64::MIN + 1, 100)];
        let target = vec![TargetLine::new_line(1, 1)];
        let err = plan_reconciliation(&existing, &target, &[7], &products, true).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::InvalidFormat { .. })));
    }

    #[test]
    fn test_identical_target_is_noop() {
        let products = catalog(vec![product(1, 10, 100)]);
        let existing = vec![line(7, 1, 2, 100)];
        let target = vec![TargetLine::existing(7, 1, 2)];

        let plan = plan_reconciliation(&existing, &target, &[], &products, true).unwrap();
        assert!(plan.is_noop());
    }
}

//! Accounts, stores, products and recyclable object types.
//!
//! These are the rows the ledger reads and locks. Balances and stock
//! are only ever changed through the point and inventory operators in
//! [`crate::service`]; the structs here are snapshots as read inside a
//! transaction.

use serde::{Deserialize, Serialize};

use super::{ObjectTypeId, ProductId, StoreId, UserId};
use crate::error::LedgerError;

/// End-user account holding a points balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Current points balance (never negative).
    pub points_balance: i64,
    /// Soft-deactivation flag; inactive accounts are invisible to the core.
    pub active: bool,
}

/// Partner store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Store identifier.
    pub id: StoreId,
    /// Display name.
    pub name: String,
    /// Soft-deactivation flag.
    pub active: bool,
}

/// Redeemable product, read together with its owning store's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Store that owns the product.
    pub store_id: StoreId,
    /// Name of the owning store.
    pub store_name: String,
    /// Display name.
    pub name: String,
    /// Points charged per unit.
    pub unit_point_cost: i64,
    /// Units in stock (never negative).
    pub stock: i64,
    /// Soft-deactivation flag.
    pub active: bool,
    /// Whether the owning store is active.
    pub store_active: bool,
}

impl Product {
    /// Returns `true` if both the product and its store are active.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.active && self.store_active
    }

    /// Total points for `quantity` units at the current unit cost.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] if the product overflows
    /// `i64`.
    pub fn cost_for(&self, quantity: i64) -> Result<i64, LedgerError> {
        self.unit_point_cost.checked_mul(quantity).ok_or_else(|| {
            LedgerError::ValidationFailed(format!("quantity {quantity} is too large"))
        })
    }
}

/// Recyclable object type with its reward rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectType {
    /// Object type identifier.
    pub id: ObjectTypeId,
    /// Display name.
    pub name: String,
    /// Points awarded per unit of weight.
    pub points_per_unit_weight: f64,
    /// Soft-deactivation flag.
    pub active: bool,
}

impl ObjectType {
    /// Points earned for recycling `weight` units: `floor(weight * rate)`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] if the weight is not a
    /// finite positive number or the product does not fit in `i64`.
    pub fn points_for(&self, weight: f64) -> Result<i64, LedgerError> {
        validate_weight(weight)?;
        let raw = (weight * self.points_per_unit_weight).floor();
        #[allow(clippy::cast_precision_loss)]
        let in_range = raw.is_finite() && raw >= 0.0 && raw <= i64::MAX as f64;
        if !in_range {
            return Err(LedgerError::ValidationFailed(format!(
                "weight {weight} yields an unrepresentable reward"
            )));
        }
        #[allow(clippy::cast_possible_truncation)]
        let points = raw as i64;
        Ok(points)
    }
}

/// Checks that a measured weight is a finite, strictly positive number.
///
/// # Errors
///
/// Returns [`LedgerError::ValidationFailed`] otherwise.
pub fn validate_weight(weight: f64) -> Result<(), LedgerError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(LedgerError::ValidationFailed(format!(
            "weight must be a positive number, got {weight}"
        )))
    }
}

/// Normalizes a requested quantity: anything below one counts as one.
#[must_use]
pub fn normalize_quantity(requested: Option<i64>) -> i64 {
    requested.unwrap_or(1).max(1)
}

/// Sparse product update: only the fields that are `Some` change.
///
/// Stock is deliberately absent; it moves only through the inventory
/// operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New points cost per unit.
    #[serde(default)]
    pub unit_point_cost: Option<i64>,
    /// New active flag.
    #[serde(default)]
    pub active: Option<bool>,
}

impl ProductPatch {
    /// Returns `true` if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.unit_point_cost.is_none() && self.active.is_none()
    }

    /// Validates the provided fields.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] for an empty patch, a
    /// blank name or a negative cost.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.is_empty() {
            return Err(LedgerError::ValidationFailed(
                "no fields to update".to_string(),
            ));
        }
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(LedgerError::ValidationFailed(
                "name must not be blank".to_string(),
            ));
        }
        if let Some(cost) = self.unit_point_cost
            && cost < 0
        {
            return Err(LedgerError::ValidationFailed(format!(
                "unit point cost must not be negative, got {cost}"
            )));
        }
        Ok(())
    }

    /// Applies the patch to an in-memory product snapshot.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name.clone_from(name);
        }
        if let Some(cost) = self.unit_point_cost {
            product.unit_point_cost = cost;
        }
        if let Some(active) = self.active {
            product.active = active;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn object_type(rate: f64) -> ObjectType {
        ObjectType {
            id: ObjectTypeId::new(1),
            name: "PET bottles".to_string(),
            points_per_unit_weight: rate,
            active: true,
        }
    }

    #[test]
    fn recycling_reward_is_floored() {
        let Ok(points) = object_type(10.0).points_for(3.7) else {
            panic!("valid weight");
        };
        assert_eq!(points, 37);

        let Ok(points) = object_type(2.5).points_for(1.5) else {
            panic!("valid weight");
        };
        assert_eq!(points, 3);
    }

    #[test]
    fn non_positive_or_nan_weight_is_rejected() {
        let ty = object_type(10.0);
        assert!(ty.points_for(0.0).is_err());
        assert!(ty.points_for(-1.0).is_err());
        assert!(ty.points_for(f64::NAN).is_err());
        assert!(ty.points_for(f64::INFINITY).is_err());
    }

    #[test]
    fn quantity_defaults_and_clamps_to_one() {
        assert_eq!(normalize_quantity(None), 1);
        assert_eq!(normalize_quantity(Some(0)), 1);
        assert_eq!(normalize_quantity(Some(-4)), 1);
        assert_eq!(normalize_quantity(Some(3)), 3);
    }

    #[test]
    fn product_cost_overflow_is_a_validation_failure() {
        let product = Product {
            id: ProductId::new(1),
            store_id: StoreId::new(1),
            store_name: "Eco Market".to_string(),
            name: "Tote bag".to_string(),
            unit_point_cost: i64::MAX / 2,
            stock: 10,
            active: true,
            store_active: true,
        };
        assert!(product.cost_for(3).is_err());
        assert!(matches!(product.cost_for(1), Ok(c) if c == i64::MAX / 2));
    }

    #[test]
    fn empty_or_negative_patch_is_invalid() {
        assert!(ProductPatch::default().validate().is_err());
        let negative = ProductPatch {
            unit_point_cost: Some(-1),
            ..ProductPatch::default()
        };
        assert!(negative.validate().is_err());
        let blank = ProductPatch {
            name: Some("  ".to_string()),
            ..ProductPatch::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn patch_only_touches_provided_fields() {
        let mut product = Product {
            id: ProductId::new(1),
            store_id: StoreId::new(1),
            store_name: "Eco Market".to_string(),
            name: "Tote bag".to_string(),
            unit_point_cost: 150,
            stock: 5,
            active: true,
            store_active: false,
        };
        let patch = ProductPatch {
            unit_point_cost: Some(175),
            ..ProductPatch::default()
        };
        patch.apply_to(&mut product);
        assert_eq!(product.unit_point_cost, 175);
        assert_eq!(product.name, "Tote bag");
        assert_eq!(product.stock, 5);
        assert!(product.active);
        assert!(!product.is_available());
    }
}

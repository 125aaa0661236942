//! Rewards service: direct redemption and recycling, product upkeep and
//! points-history reconciliation.

use std::sync::Arc;

use crate::domain::{
    Clock, EventBus, LedgerEvent, ObjectTypeId, PointsHistorySnapshot, Product, ProductId,
    ProductPatch, StoreId, UserId, catalog::normalize_quantity,
};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTx, ReadMode};

use super::finish;
use super::inventory::{self, StockMode};
use super::recycling::{self, DropOff, RecyclingReceipt};
use super::redemption::{self, RedemptionAvailability, RedemptionReceipt};

/// Direct (non-QR) recycling request recorded by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecyclingRequest {
    /// User to credit.
    pub user_id: UserId,
    /// Store receiving the material.
    pub store_id: StoreId,
    /// Material.
    pub object_type_id: ObjectTypeId,
    /// Measured weight.
    pub weight: f64,
    /// Optional external code printed on the drop-off.
    pub qr_code: Option<String>,
}

/// Orchestrates the direct ledger flows.
///
/// Every mutation opens one transaction, runs the flow, commits or rolls
/// back as a unit, and only then publishes events.
#[derive(Debug, Clone)]
pub struct RewardsService {
    store: Arc<dyn LedgerStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl RewardsService {
    /// Creates a new `RewardsService`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, event_bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            event_bus,
            clock,
        }
    }

    /// Redeems `quantity` units (minimum one) of a product for points.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for a missing or inactive product,
    ///   store or user.
    /// - [`LedgerError::OutOfStock`] / [`LedgerError::InsufficientPoints`]
    ///   when stock or balance fall short, including when a concurrent
    ///   transaction got there first.
    pub async fn redeem(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Option<i64>,
    ) -> Result<RedemptionReceipt, LedgerError> {
        let quantity = normalize_quantity(quantity);
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = redeem_in(tx.as_mut(), user_id, product_id, quantity, now).await;
        let receipt = finish(tx, result).await?;

        let _ = self.event_bus.publish(LedgerEvent::PointsRedeemed {
            redemption_id: receipt.redemption.id,
            user_id,
            store_id: receipt.redemption.store_id,
            product_id,
            quantity,
            points_spent: receipt.redemption.points_spent,
            new_balance: receipt.new_balance,
            remaining_stock: receipt.remaining_stock,
            timestamp: now,
        });
        tracing::info!(
            %user_id,
            %product_id,
            quantity,
            points_spent = receipt.redemption.points_spent,
            "redemption committed"
        );
        Ok(receipt)
    }

    /// Reports whether a redemption would currently succeed, without
    /// changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for a missing or inactive product
    /// or user.
    pub async fn check_redemption(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Option<i64>,
    ) -> Result<RedemptionAvailability, LedgerError> {
        let quantity = normalize_quantity(quantity);
        let mut tx = self.store.begin().await?;
        let result = async {
            let product =
                redemption::load_available_product(tx.as_mut(), product_id, ReadMode::Plain)
                    .await?;
            let account =
                redemption::load_active_user(tx.as_mut(), user_id, ReadMode::Plain).await?;
            redemption::availability(&product, &account, quantity)
        }
        .await;
        if let Err(err) = tx.rollback().await {
            tracing::warn!(error = %err, "read-only transaction rollback failed");
        }
        result
    }

    /// Records a drop-off, credits the user and appends a history
    /// snapshot with the user's approximate rank.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for a missing or inactive object type,
    ///   store or user.
    /// - [`LedgerError::ValidationFailed`] for a non-positive weight.
    pub async fn recycle(
        &self,
        request: RecyclingRequest,
    ) -> Result<RecyclingReceipt, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = recycle_in(tx.as_mut(), &request, now).await;
        let receipt = finish(tx, result).await?;

        let _ = self.event_bus.publish(LedgerEvent::PointsEarned {
            recycling_id: receipt.recycling.id,
            user_id: request.user_id,
            store_id: request.store_id,
            points_awarded: receipt.recycling.points_awarded,
            new_balance: receipt.new_balance,
            timestamp: now,
        });
        tracing::info!(
            user_id = %request.user_id,
            store_id = %request.store_id,
            points = receipt.recycling.points_awarded,
            "recycling committed"
        );
        Ok(receipt)
    }

    /// Applies a sparse update to a product owned by `store_id`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ValidationFailed`] for an empty or invalid patch.
    /// - [`LedgerError::NotFound`] if the product does not exist.
    /// - [`LedgerError::Forbidden`] if another store owns the product.
    pub async fn update_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, LedgerError> {
        patch.validate()?;
        let mut tx = self.store.begin().await?;
        let result = async {
            owned_product(tx.as_mut(), store_id, product_id).await?;
            tx.update_product(product_id, &patch)
                .await?
                .ok_or_else(|| LedgerError::not_found("product", product_id))
        }
        .await;
        let product = finish(tx, result).await?;
        tracing::info!(%store_id, %product_id, "product updated");
        Ok(product)
    }

    /// Adds `quantity` units to a product owned by `store_id`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ValidationFailed`] unless `quantity > 0`.
    /// - [`LedgerError::NotFound`] if the product does not exist.
    /// - [`LedgerError::Forbidden`] if another store owns the product.
    pub async fn restock(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<i64, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            owned_product(tx.as_mut(), store_id, product_id).await?;
            inventory::adjust_stock(tx.as_mut(), product_id, quantity, StockMode::Restock).await
        }
        .await;
        let new_stock = finish(tx, result).await?;

        let _ = self.event_bus.publish(LedgerEvent::StockReplenished {
            product_id,
            quantity,
            new_stock,
            timestamp: now,
        });
        tracing::info!(%store_id, %product_id, quantity, new_stock, "product restocked");
        Ok(new_stock)
    }

    /// Sets the user's latest history snapshot to the sum of their active
    /// recycling points, inserting a snapshot without rank if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for a missing or inactive user.
    pub async fn reconcile_history(
        &self,
        user_id: UserId,
    ) -> Result<PointsHistorySnapshot, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            redemption::load_active_user(tx.as_mut(), user_id, ReadMode::Plain).await?;
            reconcile_in(tx.as_mut(), user_id, now).await
        }
        .await;
        let snapshot = finish(tx, result).await?;
        tracing::debug!(%user_id, total = snapshot.total_points, "history reconciled");
        Ok(snapshot)
    }

    /// Reconciles every active user, one transaction each. Failures are
    /// logged and skipped. Returns the number of users reconciled.
    ///
    /// # Errors
    ///
    /// Returns an error only if the user list cannot be read.
    pub async fn reconcile_all(&self) -> Result<usize, LedgerError> {
        let mut tx = self.store.begin().await?;
        let result = tx.list_active_user_ids().await;
        let users = finish(tx, result).await?;

        let mut reconciled = 0_usize;
        for user_id in users {
            match self.reconcile_history(user_id).await {
                Ok(_) => reconciled += 1,
                Err(err) => tracing::warn!(%user_id, error = %err, "history reconciliation failed"),
            }
        }
        tracing::info!(reconciled, "history reconciliation pass finished");
        Ok(reconciled)
    }
}

async fn redeem_in(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    product_id: ProductId,
    quantity: i64,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<RedemptionReceipt, LedgerError> {
    let product = redemption::load_available_product(tx, product_id, ReadMode::Plain).await?;
    redemption::ensure_stock(&product, quantity)?;
    let account = redemption::load_active_user(tx, user_id, ReadMode::Plain).await?;
    redemption::ensure_balance(&account, product.cost_for(quantity)?)?;
    redemption::record_redemption(tx, user_id, &product, quantity, now).await
}

async fn recycle_in(
    tx: &mut dyn LedgerTx,
    request: &RecyclingRequest,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<RecyclingReceipt, LedgerError> {
    let object_type =
        recycling::load_active_object_type(tx, request.object_type_id, ReadMode::Plain).await?;
    recycling::load_active_store(tx, request.store_id).await?;
    recycling::record_recycling(
        tx,
        DropOff {
            user_id: request.user_id,
            store_id: request.store_id,
            object_type: &object_type,
            weight: request.weight,
            qr_code: request.qr_code.clone(),
        },
        now,
    )
    .await
}

async fn owned_product(
    tx: &mut dyn LedgerTx,
    store_id: StoreId,
    product_id: ProductId,
) -> Result<Product, LedgerError> {
    let product = tx
        .find_product(product_id, ReadMode::ForUpdate)
        .await?
        .ok_or_else(|| LedgerError::not_found("product", product_id))?;
    if product.store_id != store_id {
        return Err(LedgerError::Forbidden(format!(
            "product {product_id} belongs to another store"
        )));
    }
    Ok(product)
}

async fn reconcile_in(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<PointsHistorySnapshot, LedgerError> {
    let total = tx.recycled_points_total(user_id).await?;
    match tx.latest_history(user_id).await? {
        Some(mut latest) => {
            tx.overwrite_history_total(latest.id, total, now).await?;
            latest.total_points = total;
            latest.updated_at = now;
            Ok(latest)
        }
        None => {
            tx.append_history(crate::domain::NewHistorySnapshot {
                user_id,
                total_points: total,
                rank: None,
                created_at: now,
            })
            .await
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ManualClock;
    use crate::persistence::InMemoryLedgerStore;
    use crate::service::redemption::AvailabilityReason;

    struct Fixture {
        store: InMemoryLedgerStore,
        service: RewardsService,
        bus: EventBus,
    }

    fn fixture() -> Fixture {
        let store = InMemoryLedgerStore::new();
        let bus = EventBus::new(64);
        let service = RewardsService::new(
            Arc::new(store.clone()),
            bus.clone(),
            Arc::new(ManualClock::default()),
        );
        Fixture {
            store,
            service,
            bus,
        }
    }

    async fn balance(store: &InMemoryLedgerStore, user: UserId) -> i64 {
        let Some(account) = store.user(user).await else {
            panic!("user exists");
        };
        account.points_balance
    }

    async fn stock(store: &InMemoryLedgerStore, product: ProductId) -> i64 {
        let Some(product) = store.product(product).await else {
            panic!("product exists");
        };
        product.stock
    }

    #[tokio::test]
    async fn redemption_happy_path() {
        let f = fixture();
        let mut events = f.bus.subscribe();
        let user = f.store.seed_user("ana", 500).await;
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 5).await;

        let Ok(receipt) = f.service.redeem(user, product, Some(2)).await else {
            panic!("redemption should succeed");
        };
        assert_eq!(receipt.new_balance, 200);
        assert_eq!(receipt.remaining_stock, 3);
        assert_eq!(receipt.redemption.points_spent, 300);
        assert_eq!(receipt.store_name, "Eco Market");

        assert_eq!(balance(&f.store, user).await, 200);
        assert_eq!(stock(&f.store, product).await, 3);
        let redemptions = f.store.redemptions().await;
        assert_eq!(redemptions.len(), 1);
        assert!(redemptions.iter().all(|r| r.points_spent == 300));

        let Ok(event) = events.recv().await else {
            panic!("event expected");
        };
        assert_eq!(event.event_type_str(), "points_redeemed");
    }

    #[tokio::test]
    async fn insufficient_points_leaves_everything_unchanged() {
        let f = fixture();
        let mut events = f.bus.subscribe();
        let user = f.store.seed_user("ana", 100).await;
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 5).await;

        let result = f.service.redeem(user, product, None).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientPoints {
                required: 150,
                available: 100
            })
        ));
        assert_eq!(balance(&f.store, user).await, 100);
        assert_eq!(stock(&f.store, product).await, 5);
        assert!(f.store.redemptions().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn out_of_stock_is_checked_before_the_user() {
        let f = fixture();
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 1).await;

        let result = f.service.redeem(UserId::new(404), product, Some(2)).await;
        assert!(matches!(result, Err(LedgerError::OutOfStock { .. })));
    }

    #[tokio::test]
    async fn inactive_store_hides_its_products() {
        let f = fixture();
        let user = f.store.seed_user("ana", 500).await;
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 5).await;
        f.store.set_store_active(shop, false).await;

        let result = f.service.redeem(user, product, Some(1)).await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_redemption_can_be_retried_with_corrected_input() {
        let f = fixture();
        let user = f.store.seed_user("ana", 500).await;
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 5).await;

        assert!(f.service.redeem(user, product, Some(4)).await.is_err());
        assert_eq!(balance(&f.store, user).await, 500);
        assert_eq!(stock(&f.store, product).await, 5);

        tokio_test::assert_ok!(f.service.redeem(user, product, Some(3)).await);
        assert_eq!(balance(&f.store, user).await, 50);
        assert_eq!(stock(&f.store, product).await, 2);
    }

    #[tokio::test]
    async fn availability_report_does_not_mutate() {
        let f = fixture();
        let user = f.store.seed_user("ana", 100).await;
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 5).await;

        let Ok(report) = f.service.check_redemption(user, product, Some(1)).await else {
            panic!("check should succeed");
        };
        assert!(!report.can_redeem);
        assert_eq!(report.reason, AvailabilityReason::InsufficientPoints);
        assert_eq!(report.points_required, 150);

        let Ok(report) = f.service.check_redemption(user, product, Some(9)).await else {
            panic!("check should succeed");
        };
        assert_eq!(report.reason, AvailabilityReason::OutOfStock);
        assert_eq!(balance(&f.store, user).await, 100);
    }

    #[tokio::test]
    async fn recycling_reward_is_floored_and_ranked() {
        let f = fixture();
        let user = f.store.seed_user("ana", 0).await;
        let rival = f.store.seed_user("luis", 1000).await;
        let shop = f.store.seed_store("Eco Market").await;
        let pet = f.store.seed_object_type("PET", 10.0).await;

        let request = RecyclingRequest {
            user_id: user,
            store_id: shop,
            object_type_id: pet,
            weight: 3.7,
            qr_code: None,
        };
        let Ok(receipt) = f.service.recycle(request).await else {
            panic!("recycling should succeed");
        };
        assert_eq!(receipt.recycling.points_awarded, 37);
        assert_eq!(receipt.new_balance, 37);
        assert_eq!(receipt.snapshot.rank, Some(2));
        assert_eq!(receipt.snapshot.total_points, 37);
        assert_eq!(balance(&f.store, user).await, 37);
        assert_eq!(balance(&f.store, rival).await, 1000);
        assert_eq!(f.store.history(user).await.len(), 1);
    }

    #[tokio::test]
    async fn recycling_for_unknown_user_rolls_back_the_entry() {
        let f = fixture();
        let shop = f.store.seed_store("Eco Market").await;
        let pet = f.store.seed_object_type("PET", 10.0).await;

        let request = RecyclingRequest {
            user_id: UserId::new(404),
            store_id: shop,
            object_type_id: pet,
            weight: 1.0,
            qr_code: None,
        };
        assert!(matches!(
            f.service.recycle(request).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(f.store.recyclings().await.is_empty());
    }

    #[tokio::test]
    async fn restock_and_patch_require_ownership() {
        let f = fixture();
        let shop = f.store.seed_store("Eco Market").await;
        let other = f.store.seed_store("Green Corner").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, 5).await;

        assert!(matches!(
            f.service.restock(other, product, 3).await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(f.service.restock(shop, product, 3).await, Ok(8)));

        let patch = ProductPatch {
            unit_point_cost: Some(175),
            ..ProductPatch::default()
        };
        let Ok(updated) = f.service.update_product(shop, product, patch).await else {
            panic!("patch should succeed");
        };
        assert_eq!(updated.unit_point_cost, 175);
        assert_eq!(updated.stock, 8);
        assert_eq!(updated.name, "Tote bag");
    }

    #[tokio::test]
    async fn reconciliation_sums_active_recyclings() {
        let f = fixture();
        let user = f.store.seed_user("ana", 0).await;
        let shop = f.store.seed_store("Eco Market").await;
        let pet = f.store.seed_object_type("PET", 10.0).await;

        let Ok(snapshot) = f.service.reconcile_history(user).await else {
            panic!("reconcile should succeed");
        };
        assert_eq!(snapshot.total_points, 0);
        assert_eq!(snapshot.rank, None);

        for weight in [1.0, 2.0] {
            let request = RecyclingRequest {
                user_id: user,
                store_id: shop,
                object_type_id: pet,
                weight,
                qr_code: None,
            };
            tokio_test::assert_ok!(f.service.recycle(request).await);
        }
        let recyclings = f.store.recyclings().await;
        let Some(first) = recyclings.first() else {
            panic!("recycling recorded");
        };
        f.store.set_recycling_active(first.id, false).await;

        let Ok(snapshot) = f.service.reconcile_history(user).await else {
            panic!("reconcile should succeed");
        };
        assert_eq!(snapshot.total_points, 20);
        assert!(matches!(f.service.reconcile_all().await, Ok(1)));
    }
}

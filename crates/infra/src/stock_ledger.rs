//! Stock Ledger: linearizable reserve/release over product streams.
//!
//! "Check stock ≥ quantity, then decrement" must be indivisible with respect
//! to concurrent reservations of the same product. The ledger gets that from
//! the store's per-stream optimistic concurrency: read the stream, decide
//! against the rehydrated state, append with the exact expected version. A
//! concurrent writer invalidates the version and the loop retries from a
//! fresh read: compare-and-decrement, per product, with no global lock.

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use depot_catalog::{Product, ProductCommand, ProductId, ReleaseStock, ReserveStock};
use depot_core::{Aggregate, ExpectedVersion, TenantId};
use depot_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{apply_history, stream_version};
use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};

/// Retry budget for the compare-and-decrement loop. Contention on a single
/// product stream is short-lived; exhausting this means something is wrong.
const DEFAULT_MAX_ATTEMPTS: u32 = 16;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("product {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    #[error("product {product_id} cannot be sold")]
    ProductNotSellable { product_id: ProductId },

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("reservation contention on product {product_id} exhausted after {attempts} attempts")]
    Contention { product_id: ProductId, attempts: u32 },

    #[error("event store failure: {0}")]
    Store(String),
}

/// The stock ledger service.
///
/// A pure counter with compare-and-decrement semantics: it knows nothing
/// about orders. Cheap to clone (the store and bus handles are shared), which
/// is what lets reservation guards carry their own handle for rollback.
#[derive(Debug, Clone)]
pub struct StockLedger<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> StockLedger<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>> + Clone,
{
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Atomically reserve `quantity` units of a product.
    ///
    /// Returns a guard that releases the reservation when dropped, unless
    /// [`StockReservation::commit`] disarms it first. Holding the guard across
    /// the rest of the order transaction means every abort path, including
    /// cancellation of the surrounding task, runs the compensating release.
    pub fn reserve(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<StockReservation<S, B>, LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        for _attempt in 0..self.max_attempts {
            let (product, expected) = self.load_product(tenant_id, product_id)?;

            if !product.can_be_sold() {
                return Err(LedgerError::ProductNotSellable { product_id });
            }
            if product.stock() < quantity {
                return Err(LedgerError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: product.stock(),
                });
            }

            let command = ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity,
                occurred_at: Utc::now(),
            });

            match self.try_append(tenant_id, &product, expected, &command)? {
                AppendOutcome::Committed => {
                    if product.stock() - quantity <= product.reorder_threshold() {
                        warn!(
                            product_id = %product_id,
                            remaining = product.stock() - quantity,
                            threshold = product.reorder_threshold(),
                            "stock at or below reorder threshold"
                        );
                    }
                    return Ok(StockReservation {
                        ledger: self.clone(),
                        tenant_id,
                        product_id,
                        quantity,
                        committed: false,
                    });
                }
                AppendOutcome::Conflicted => continue,
            }
        }

        Err(LedgerError::Contention {
            product_id,
            attempts: self.max_attempts,
        })
    }

    /// Restore `quantity` previously reserved units (compensating action).
    ///
    /// Only ever called to undo a reservation that will not be committed; it
    /// never fails on stock grounds.
    pub fn release(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), LedgerError> {
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        for _attempt in 0..self.max_attempts {
            let (product, expected) = self.load_product(tenant_id, product_id)?;

            let command = ProductCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                product_id,
                quantity,
                occurred_at: Utc::now(),
            });

            match self.try_append(tenant_id, &product, expected, &command)? {
                AppendOutcome::Committed => return Ok(()),
                AppendOutcome::Conflicted => continue,
            }
        }

        Err(LedgerError::Contention {
            product_id,
            attempts: self.max_attempts,
        })
    }

    fn load_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<(Product, ExpectedVersion), LedgerError> {
        let history = self
            .store
            .load_stream(tenant_id, product_id.0)
            .map_err(|e| LedgerError::Store(e.to_string()))?;
        if history.is_empty() {
            return Err(LedgerError::ProductNotFound { product_id });
        }

        let expected = ExpectedVersion::Exact(stream_version(&history));
        let mut product = Product::empty(product_id);
        apply_history::<Product>(&mut product, &history)
            .map_err(|e| LedgerError::Store(format!("{e:?}")))?;

        Ok((product, expected))
    }

    /// Decide and append under the expected version; distinguishes a version
    /// conflict (retryable) from everything else.
    fn try_append(
        &self,
        tenant_id: TenantId,
        product: &Product,
        expected: ExpectedVersion,
        command: &ProductCommand,
    ) -> Result<AppendOutcome, LedgerError> {
        let events = product
            .handle(command)
            .map_err(|e| LedgerError::Store(format!("ledger command rejected: {e}")))?;

        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    product.id_typed().0,
                    "catalog.product",
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| LedgerError::Store(e.to_string()))?;

        match self.store.append(uncommitted, expected) {
            Ok(committed) => {
                for stored in &committed {
                    // Already durable; delivery is at-least-once and read
                    // models rebuild, so a publish failure is not a rollback.
                    if let Err(e) = self.bus.publish(stored.to_envelope()) {
                        warn!(error = ?e, "event publication failed after ledger append");
                    }
                }
                Ok(AppendOutcome::Committed)
            }
            Err(EventStoreError::Concurrency(_)) => Ok(AppendOutcome::Conflicted),
            Err(e) => Err(LedgerError::Store(e.to_string())),
        }
    }
}

enum AppendOutcome {
    Committed,
    Conflicted,
}

/// A held stock reservation.
///
/// Dropping the guard un-committed releases the reserved quantity. A release
/// failure at that point is a stock discrepancy the ledger cannot repair on
/// its own, so it is surfaced as a reconciliation alert instead of masking
/// whatever error unwound the transaction.
#[derive(Debug)]
pub struct StockReservation<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>> + Clone,
{
    ledger: StockLedger<S, B>,
    tenant_id: TenantId,
    product_id: ProductId,
    quantity: i64,
    committed: bool,
}

impl<S, B> StockReservation<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>> + Clone,
{
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Keep the reservation: the surrounding transaction committed.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<S, B> Drop for StockReservation<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>> + Clone,
{
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self
            .ledger
            .release(self.tenant_id, self.product_id, self.quantity)
        {
            error!(
                product_id = %self.product_id,
                quantity = self.quantity,
                error = %e,
                "stock release failed during rollback; manual reconciliation required"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use depot_catalog::{ActivateProduct, CreateProduct, PriceCard, ReceiveStock};
    use depot_core::{AggregateId, Money};
    use depot_events::InMemoryEventBus;

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::InMemoryEventStore;

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn setup() -> (Store, Bus, StockLedger<Store, Bus>, TenantId) {
        let store: Store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let ledger = StockLedger::new(store.clone(), bus.clone());
        (store, bus, ledger, TenantId::new())
    }

    fn seed_product(store: &Store, bus: &Bus, tenant_id: TenantId, stock: i64) -> ProductId {
        let product_id = ProductId::new(AggregateId::new());
        let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());

        let commands = vec![
            ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: "SKU-L".to_string(),
                name: "Ledger widget".to_string(),
                prices: PriceCard {
                    customer: Some(Money::from_cents(6_000)),
                    dealer: Some(Money::from_cents(5_000)),
                    unit_cost: None,
                },
                reorder_threshold: 0,
                occurred_at: Utc::now(),
            }),
            ProductCommand::ActivateProduct(ActivateProduct {
                tenant_id,
                product_id,
                occurred_at: Utc::now(),
            }),
            ProductCommand::ReceiveStock(ReceiveStock {
                tenant_id,
                product_id,
                quantity: stock,
                occurred_at: Utc::now(),
            }),
        ];
        for command in commands {
            dispatcher
                .dispatch::<Product>(tenant_id, product_id.0, "catalog.product", command, |_, id| {
                    Product::empty(ProductId::new(id))
                })
                .unwrap();
        }

        product_id
    }

    fn current_stock(ledger: &StockLedger<Store, Bus>, tenant_id: TenantId, product_id: ProductId) -> i64 {
        ledger.load_product(tenant_id, product_id).unwrap().0.stock()
    }

    #[test]
    fn reserve_decrements_and_commit_keeps_it() {
        let (_store, _bus, ledger, tenant_id) = setup();
        let product_id = seed_product(&_store, &_bus, tenant_id, 5);

        let reservation = ledger.reserve(tenant_id, product_id, 3).unwrap();
        assert_eq!(current_stock(&ledger, tenant_id, product_id), 2);

        reservation.commit();
        assert_eq!(current_stock(&ledger, tenant_id, product_id), 2);
    }

    #[test]
    fn dropping_an_uncommitted_reservation_releases_it() {
        let (_store, _bus, ledger, tenant_id) = setup();
        let product_id = seed_product(&_store, &_bus, tenant_id, 5);

        {
            let _reservation = ledger.reserve(tenant_id, product_id, 3).unwrap();
            assert_eq!(current_stock(&ledger, tenant_id, product_id), 2);
        }

        assert_eq!(current_stock(&ledger, tenant_id, product_id), 5);
    }

    #[test]
    fn reserve_fails_when_stock_is_short() {
        let (_store, _bus, ledger, tenant_id) = setup();
        let product_id = seed_product(&_store, &_bus, tenant_id, 2);

        let err = ledger.reserve(tenant_id, product_id, 3).unwrap_err();
        match err {
            LedgerError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(current_stock(&ledger, tenant_id, product_id), 2);
    }

    #[test]
    fn reserve_fails_for_unknown_product() {
        let (_store, _bus, ledger, tenant_id) = setup();
        let product_id = ProductId::new(AggregateId::new());

        let err = ledger.reserve(tenant_id, product_id, 1).unwrap_err();
        assert!(matches!(err, LedgerError::ProductNotFound { .. }));
    }

    #[test]
    fn reserve_rejects_non_positive_quantities() {
        let (_store, _bus, ledger, tenant_id) = setup();
        let product_id = seed_product(&_store, &_bus, tenant_id, 5);

        assert!(matches!(
            ledger.reserve(tenant_id, product_id, 0),
            Err(LedgerError::InvalidQuantity(0))
        ));
        assert!(matches!(
            ledger.reserve(tenant_id, product_id, -2),
            Err(LedgerError::InvalidQuantity(-2))
        ));
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let (store, bus, _ledger, tenant_id) = setup();
        let product_id = seed_product(&store, &bus, tenant_id, 10);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = StockLedger::new(store.clone(), bus.clone());
            handles.push(std::thread::spawn(move || {
                ledger
                    .reserve(tenant_id, product_id, 3)
                    .map(StockReservation::commit)
                    .is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        // 10 units, 3 per reservation: exactly 3 can succeed.
        assert_eq!(successes, 3);
        let ledger = StockLedger::new(store, bus);
        assert_eq!(current_stock(&ledger, tenant_id, product_id), 1);
    }
}

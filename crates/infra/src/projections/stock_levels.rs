use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use depot_catalog::{ProductEvent, ProductId};
use depot_core::{AggregateId, TenantId};
use depot_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Queryable stock read model: current on-hand quantity per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevelReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub active: bool,
    pub on_hand: i64,
    pub reorder_threshold: i64,
}

impl StockLevelReadModel {
    /// Replenishment signal for the back-office stock screen.
    pub fn below_threshold(&self) -> bool {
        self.on_hand <= self.reorder_threshold
    }
}

/// Tenant+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum StockLevelProjectionError {
    #[error("failed to deserialize product event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Stock levels projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// tenant-isolated read model. Read models are disposable and rebuildable
/// from the event stream.
#[derive(Debug)]
pub struct StockLevelsProjection<S>
where
    S: TenantStore<ProductId, StockLevelReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> StockLevelsProjection<S>
where
    S: TenantStore<ProductId, StockLevelReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query read model for one tenant/product.
    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<StockLevelReadModel> {
        self.store.get(tenant_id, product_id)
    }

    /// List all products for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StockLevelReadModel> {
        self.store.list(tenant_id)
    }

    /// List products at or below their reorder threshold.
    pub fn list_below_threshold(&self, tenant_id: TenantId) -> Vec<StockLevelReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(StockLevelReadModel::below_threshold)
            .collect()
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces tenant isolation
    /// - Enforces monotonic sequence per (tenant, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockLevelProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = match self.cursors.write() {
            Ok(cursors) => cursors,
            Err(_) => return Ok(()),
        };
        let key = CursorKey {
            tenant_id,
            aggregate_id,
        };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(StockLevelProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(StockLevelProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockLevelProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, product_id) = match &event {
            ProductEvent::ProductCreated(e) => (e.tenant_id, e.product_id),
            ProductEvent::ProductActivated(e) => (e.tenant_id, e.product_id),
            ProductEvent::ProductDiscontinued(e) => (e.tenant_id, e.product_id),
            ProductEvent::PricesChanged(e) => (e.tenant_id, e.product_id),
            ProductEvent::StockReceived(e) => (e.tenant_id, e.product_id),
            ProductEvent::StockReserved(e) => (e.tenant_id, e.product_id),
            ProductEvent::StockReleased(e) => (e.tenant_id, e.product_id),
        };

        if event_tenant != tenant_id {
            return Err(StockLevelProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if product_id.0 != aggregate_id {
            return Err(StockLevelProjectionError::TenantIsolation(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    product_id,
                    StockLevelReadModel {
                        product_id,
                        sku: e.sku,
                        name: e.name,
                        active: false,
                        on_hand: 0,
                        reorder_threshold: e.reorder_threshold,
                    },
                );
            }
            ProductEvent::ProductActivated(_) => {
                if let Some(mut model) = self.store.get(tenant_id, &product_id) {
                    model.active = true;
                    self.store.upsert(tenant_id, product_id, model);
                }
            }
            ProductEvent::ProductDiscontinued(_) => {
                if let Some(mut model) = self.store.get(tenant_id, &product_id) {
                    model.active = false;
                    self.store.upsert(tenant_id, product_id, model);
                }
            }
            ProductEvent::PricesChanged(_) => {}
            ProductEvent::StockReceived(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &product_id) {
                    model.on_hand += e.quantity;
                    self.store.upsert(tenant_id, product_id, model);
                }
            }
            ProductEvent::StockReserved(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &product_id) {
                    model.on_hand -= e.quantity;
                    self.store.upsert(tenant_id, product_id, model);
                }
            }
            ProductEvent::StockReleased(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &product_id) {
                    model.on_hand += e.quantity;
                    self.store.upsert(tenant_id, product_id, model);
                }
            }
        }

        cursors.insert(key, seq);
        Ok(())
    }
}

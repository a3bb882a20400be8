//! Read-side collaborator interfaces consumed by the placement engine.
//!
//! The engine reads product and firm state through these seams so tests can
//! substitute scripted or failing implementations. The default implementation
//! rehydrates aggregates straight from the event store: reads are strongly
//! consistent with every committed write, which the pricing step relies on.

use async_trait::async_trait;
use thiserror::Error;

use depot_catalog::{PriceCard, Product, ProductId};
use depot_core::{Rate, TenantId};
use depot_firms::{Firm, FirmClass, FirmId, FirmStatus};
use depot_pricing::BuyerTerms;

use crate::command_dispatcher::apply_history;
use crate::event_store::EventStore;

/// Catalog view of one product, as consumed by pricing and reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductRecord {
    pub product_id: ProductId,
    pub active: bool,
    pub prices: PriceCard,
    pub stock: i64,
    pub reorder_threshold: i64,
}

/// Directory view of one firm, as consumed by pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmRecord {
    pub firm_id: FirmId,
    pub class: Option<FirmClass>,
    pub special_discount: Option<Rate>,
    pub status: FirmStatus,
}

impl FirmRecord {
    /// The pricing-relevant slice of this record.
    pub fn buyer_terms(&self) -> BuyerTerms {
        BuyerTerms {
            class: self.class,
            special_discount: self.special_discount,
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("record not found")]
    NotFound,

    #[error("lookup failed: {0}")]
    Store(String),
}

/// Read-only catalog access (external collaborator seam).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ProductRecord, LookupError>;
}

/// Read-only firm directory access (external collaborator seam).
#[async_trait]
pub trait FirmDirectory: Send + Sync {
    async fn get_firm(&self, tenant_id: TenantId, firm_id: FirmId) -> Result<FirmRecord, LookupError>;
}

/// Event-store-backed implementation of both lookup seams.
///
/// Rehydrates the aggregate on every read. Fine for back-office read volumes;
/// a cached read model can replace this behind the same traits if it ever is
/// not.
#[derive(Debug, Clone)]
pub struct EventSourcedLookup<S> {
    store: S,
}

impl<S> EventSourcedLookup<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> CatalogStore for EventSourcedLookup<S>
where
    S: EventStore + Clone,
{
    async fn get_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ProductRecord, LookupError> {
        let history = self
            .store
            .load_stream(tenant_id, product_id.0)
            .map_err(|e| LookupError::Store(e.to_string()))?;
        if history.is_empty() {
            return Err(LookupError::NotFound);
        }

        let mut product = Product::empty(product_id);
        apply_history::<Product>(&mut product, &history)
            .map_err(|e| LookupError::Store(format!("{e:?}")))?;

        Ok(ProductRecord {
            product_id,
            active: product.can_be_sold(),
            prices: *product.prices(),
            stock: product.stock(),
            reorder_threshold: product.reorder_threshold(),
        })
    }
}

#[async_trait]
impl<S> FirmDirectory for EventSourcedLookup<S>
where
    S: EventStore + Clone,
{
    async fn get_firm(&self, tenant_id: TenantId, firm_id: FirmId) -> Result<FirmRecord, LookupError> {
        let history = self
            .store
            .load_stream(tenant_id, firm_id.0)
            .map_err(|e| LookupError::Store(e.to_string()))?;
        if history.is_empty() {
            return Err(LookupError::NotFound);
        }

        let mut firm = Firm::empty(firm_id);
        apply_history::<Firm>(&mut firm, &history)
            .map_err(|e| LookupError::Store(format!("{e:?}")))?;

        Ok(FirmRecord {
            firm_id,
            class: firm.class(),
            special_discount: firm.special_discount(),
            status: firm.status(),
        })
    }
}

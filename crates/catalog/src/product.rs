use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use depot_events::Event;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Active,
    Discontinued,
}

/// Per-class unit prices, in smallest currency unit (cents).
///
/// `customer` and `dealer` are the two sell tiers; `unit_cost` is the
/// distributor's own inbound cost and never leaves the back office. A missing
/// tier price means the product is not sellable to that class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCard {
    pub customer: Option<Money>,
    pub dealer: Option<Money>,
    pub unit_cost: Option<Money>,
}

impl PriceCard {
    fn validate(&self) -> Result<(), DomainError> {
        for price in [self.customer, self.dealer, self.unit_cost].into_iter().flatten() {
            if !price.is_positive() {
                return Err(DomainError::validation("prices must be positive when set"));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    sku: String,
    name: String,
    status: ProductStatus,
    prices: PriceCard,
    stock: i64,
    reorder_threshold: i64,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: String::new(),
            name: String::new(),
            status: ProductStatus::Draft,
            prices: PriceCard::default(),
            stock: 0,
            reorder_threshold: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn prices(&self) -> &PriceCard {
        &self.prices
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn reorder_threshold(&self) -> i64 {
        self.reorder_threshold
    }

    /// Whether order lines may be placed against this product.
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Whether current stock has fallen to or below the reorder threshold.
    pub fn is_below_threshold(&self) -> bool {
        self.stock <= self.reorder_threshold
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub prices: PriceCard,
    pub reorder_threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DiscontinueProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscontinueProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPrices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPrices {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub prices: PriceCard,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveStock (inbound replenishment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (compare-and-decrement for an order line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (compensating action undoing a reservation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ActivateProduct(ActivateProduct),
    DiscontinueProduct(DiscontinueProduct),
    SetPrices(SetPrices),
    ReceiveStock(ReceiveStock),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub prices: PriceCard,
    pub reorder_threshold: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductActivated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDiscontinued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDiscontinued {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PricesChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricesChanged {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub prices: PriceCard,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReceived {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductActivated(ProductActivated),
    ProductDiscontinued(ProductDiscontinued),
    PricesChanged(PricesChanged),
    StockReceived(StockReceived),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductActivated(_) => "catalog.product.activated",
            ProductEvent::ProductDiscontinued(_) => "catalog.product.discontinued",
            ProductEvent::PricesChanged(_) => "catalog.product.prices_changed",
            ProductEvent::StockReceived(_) => "catalog.product.stock_received",
            ProductEvent::StockReserved(_) => "catalog.product.stock_reserved",
            ProductEvent::StockReleased(_) => "catalog.product.stock_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductActivated(e) => e.occurred_at,
            ProductEvent::ProductDiscontinued(e) => e.occurred_at,
            ProductEvent::PricesChanged(e) => e.occurred_at,
            ProductEvent::StockReceived(e) => e.occurred_at,
            ProductEvent::StockReserved(e) => e.occurred_at,
            ProductEvent::StockReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.status = ProductStatus::Draft;
                self.prices = e.prices;
                self.stock = 0;
                self.reorder_threshold = e.reorder_threshold;
                self.created = true;
            }
            ProductEvent::ProductActivated(_) => {
                self.status = ProductStatus::Active;
            }
            ProductEvent::ProductDiscontinued(_) => {
                self.status = ProductStatus::Discontinued;
            }
            ProductEvent::PricesChanged(e) => {
                self.prices = e.prices;
            }
            ProductEvent::StockReceived(e) => {
                self.stock += e.quantity;
            }
            ProductEvent::StockReserved(e) => {
                self.stock -= e.quantity;
            }
            ProductEvent::StockReleased(e) => {
                self.stock += e.quantity;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::ActivateProduct(cmd) => self.handle_activate(cmd),
            ProductCommand::DiscontinueProduct(cmd) => self.handle_discontinue(cmd),
            ProductCommand::SetPrices(cmd) => self.handle_set_prices(cmd),
            ProductCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            ProductCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            ProductCommand::ReleaseStock(cmd) => self.handle_release(cmd),
        }
    }
}

impl Product {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, tenant_id: TenantId, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_product_id(product_id)
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.reorder_threshold < 0 {
            return Err(DomainError::validation("reorder threshold cannot be negative"));
        }
        cmd.prices.validate()?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            name: cmd.name.clone(),
            prices: cmd.prices,
            reorder_threshold: cmd.reorder_threshold,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.product_id)?;

        if self.status != ProductStatus::Draft {
            return Err(DomainError::invariant("only draft products can be activated"));
        }

        Ok(vec![ProductEvent::ProductActivated(ProductActivated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discontinue(
        &self,
        cmd: &DiscontinueProduct,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.product_id)?;

        if self.status == ProductStatus::Discontinued {
            return Err(DomainError::invariant("product is already discontinued"));
        }

        Ok(vec![ProductEvent::ProductDiscontinued(ProductDiscontinued {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_prices(&self, cmd: &SetPrices) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.product_id)?;
        cmd.prices.validate()?;

        Ok(vec![ProductEvent::PricesChanged(PricesChanged {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            prices: cmd.prices,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        if self.stock.checked_add(cmd.quantity).is_none() {
            return Err(DomainError::invariant("stock quantity overflow"));
        }

        Ok(vec![ProductEvent::StockReceived(StockReceived {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("reserved quantity must be positive"));
        }
        if !self.can_be_sold() {
            return Err(DomainError::invariant("product is not sellable"));
        }
        if self.stock < cmd.quantity {
            // Stock can never go negative; the ledger pre-checks this but the
            // aggregate is the invariant's last line of defense.
            return Err(DomainError::invariant("insufficient stock"));
        }

        Ok(vec![ProductEvent::StockReserved(StockReserved {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("released quantity must be positive"));
        }
        if self.stock.checked_add(cmd.quantity).is_none() {
            return Err(DomainError::invariant("stock quantity overflow"));
        }

        Ok(vec![ProductEvent::StockReleased(StockReleased {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_prices() -> PriceCard {
        PriceCard {
            customer: Some(Money::from_cents(6_000)),
            dealer: Some(Money::from_cents(5_000)),
            unit_cost: Some(Money::from_cents(3_500)),
        }
    }

    /// Build an active product with the given opening stock.
    fn active_product(tenant_id: TenantId, product_id: ProductId, stock: i64) -> Product {
        let mut product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: "SKU-1".to_string(),
                name: "Widget".to_string(),
                prices: test_prices(),
                reorder_threshold: 2,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        let events = product
            .handle(&ProductCommand::ActivateProduct(ActivateProduct {
                tenant_id,
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        if stock > 0 {
            let events = product
                .handle(&ProductCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    product_id,
                    quantity: stock,
                    occurred_at: test_time(),
                }))
                .unwrap();
            product.apply(&events[0]);
        }

        product
    }

    #[test]
    fn create_product_emits_created_event() {
        let product = Product::empty(test_product_id());
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();

        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: "SKU-9".to_string(),
                name: "Widget".to_string(),
                prices: test_prices(),
                reorder_threshold: 5,
                occurred_at: test_time(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.sku, "SKU-9");
                assert_eq!(e.reorder_threshold, 5);
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_rejects_non_positive_prices() {
        let product = Product::empty(test_product_id());
        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id: test_tenant_id(),
                product_id: test_product_id(),
                sku: "SKU-9".to_string(),
                name: "Widget".to_string(),
                prices: PriceCard {
                    customer: Some(Money::ZERO),
                    dealer: None,
                    unit_cost: None,
                },
                reorder_threshold: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn draft_product_cannot_be_reserved() {
        let mut product = Product::empty(test_product_id());
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();

        let events = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                tenant_id,
                product_id,
                sku: "SKU-1".to_string(),
                name: "Widget".to_string(),
                prices: test_prices(),
                reorder_threshold: 0,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        let err = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        match err {
            DomainError::InvariantViolation(msg) if msg.contains("not sellable") => {}
            other => panic!("Expected not-sellable invariant, got {other:?}"),
        }
    }

    #[test]
    fn reserve_rejects_more_than_available_stock() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = active_product(tenant_id, product_id, 5);

        let err = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity: 6,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        match err {
            DomainError::InvariantViolation(msg) if msg.contains("insufficient stock") => {}
            other => panic!("Expected insufficient-stock invariant, got {other:?}"),
        }
    }

    #[test]
    fn reserve_then_release_restores_stock() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = active_product(tenant_id, product_id, 5);

        let events = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity: 3,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(product.stock(), 2);

        let events = product
            .handle(&ProductCommand::ReleaseStock(ReleaseStock {
                tenant_id,
                product_id,
                quantity: 3,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert_eq!(product.stock(), 5);
    }

    #[test]
    fn threshold_detection_tracks_stock() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = active_product(tenant_id, product_id, 5);
        assert!(!product.is_below_threshold());

        let events = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity: 3,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        // Stock 2 == threshold 2.
        assert!(product.is_below_threshold());
    }

    #[test]
    fn discontinued_product_cannot_be_reserved() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let mut product = active_product(tenant_id, product_id, 5);

        let events = product
            .handle(&ProductCommand::DiscontinueProduct(DiscontinueProduct {
                tenant_id,
                product_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        let err = product
            .handle(&ProductCommand::ReserveStock(ReserveStock {
                tenant_id,
                product_id,
                quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn version_increments_on_apply() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = active_product(tenant_id, product_id, 5);

        // created + activated + received = 3 events.
        assert_eq!(product.version(), 3);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let tenant_id = test_tenant_id();
        let product_id = test_product_id();
        let product = active_product(tenant_id, product_id, 5);

        let before = product.clone();
        let cmd = ProductCommand::ReserveStock(ReserveStock {
            tenant_id,
            product_id,
            quantity: 2,
            occurred_at: test_time(),
        });

        let events1 = product.handle(&cmd).unwrap();
        let events2 = product.handle(&cmd).unwrap();

        assert_eq!(product, before);
        assert_eq!(events1, events2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any interleaving of valid reserve/release pairs keeps
            /// stock non-negative and ends where it started.
            #[test]
            fn reserve_release_round_trip_preserves_stock(
                opening in 1i64..=1_000,
                quantities in proptest::collection::vec(1i64..=50, 1..10)
            ) {
                let tenant_id = test_tenant_id();
                let product_id = test_product_id();
                let mut product = active_product(tenant_id, product_id, opening);

                let mut reserved = Vec::new();
                for quantity in quantities {
                    let cmd = ProductCommand::ReserveStock(ReserveStock {
                        tenant_id,
                        product_id,
                        quantity,
                        occurred_at: test_time(),
                    });
                    match product.handle(&cmd) {
                        Ok(events) => {
                            product.apply(&events[0]);
                            reserved.push(quantity);
                        }
                        Err(_) => prop_assert!(product.stock() < quantity),
                    }
                    prop_assert!(product.stock() >= 0);
                }

                for quantity in reserved {
                    let events = product
                        .handle(&ProductCommand::ReleaseStock(ReleaseStock {
                            tenant_id,
                            product_id,
                            quantity,
                            occurred_at: test_time(),
                        }))
                        .unwrap();
                    product.apply(&events[0]);
                }

                prop_assert_eq!(product.stock(), opening);
            }

            /// Property: handle is deterministic for identical state + command.
            #[test]
            fn handle_is_deterministic(opening in 0i64..=100, quantity in 1i64..=100) {
                let tenant_id = test_tenant_id();
                let product_id = test_product_id();
                let product = active_product(tenant_id, product_id, opening);

                let cmd = ProductCommand::ReserveStock(ReserveStock {
                    tenant_id,
                    product_id,
                    quantity,
                    occurred_at: test_time(),
                });

                prop_assert_eq!(product.handle(&cmd), product.handle(&cmd));
            }
        }
    }
}

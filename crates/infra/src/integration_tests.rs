//! Integration tests for the full order placement pipeline.
//!
//! Command → EventStore → StockLedger / PlacementEngine → EventBus →
//! Projection → ReadModel.
//!
//! Verifies the transactional contract end to end: pricing resolution,
//! linearizable reservations, compensating rollback (including cancellation),
//! and all-or-nothing order persistence.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value as JsonValue;

    use depot_catalog::{
        ActivateProduct, CreateProduct, PriceCard, Product, ProductCommand, ProductId,
        ReceiveStock,
    };
    use depot_core::{AggregateId, Money, Rate, TenantId, UserId};
    use depot_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use depot_firms::{
        ActivateFirm, Firm, FirmClass, FirmCommand, FirmId, RegisterProspect, SetSpecialDiscount,
    };
    use depot_orders::{Order, OrderId, OrderSource, OrderStatus, PlaceOrder};

    use crate::command_dispatcher::{CommandDispatcher, apply_history};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::lookup::{CatalogStore, EventSourcedLookup};
    use crate::placement::{
        EventSourcedOrders, LineRequest, OrderWriter, PersistError, PlaceOrderError,
        PlaceOrderRequest, PlacementConfig, PlacementEngine,
    };
    use crate::projections::{OrderBookProjection, StockLevelsProjection};
    use crate::read_model::InMemoryTenantStore;
    use crate::stock_ledger::StockLedger;

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Dispatcher = CommandDispatcher<Store, Bus>;

    struct TestRig {
        store: Store,
        bus: Bus,
        dispatcher: Arc<Dispatcher>,
        ledger: StockLedger<Store, Bus>,
        lookup: Arc<EventSourcedLookup<Store>>,
    }

    impl TestRig {
        fn new() -> Self {
            let store: Store = Arc::new(InMemoryEventStore::new());
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
            let ledger = StockLedger::new(store.clone(), bus.clone());
            let lookup = Arc::new(EventSourcedLookup::new(store.clone()));
            Self {
                store,
                bus,
                dispatcher,
                ledger,
                lookup,
            }
        }

        /// Engine wired to the standard event-sourced writer.
        fn engine(&self) -> PlacementEngine<Store, Bus> {
            self.engine_with_writer(Arc::new(EventSourcedOrders::new(self.dispatcher.clone())))
        }

        fn engine_with_writer(&self, writer: Arc<dyn OrderWriter>) -> PlacementEngine<Store, Bus> {
            PlacementEngine::new(
                self.lookup.clone(),
                self.lookup.clone(),
                writer,
                self.ledger.clone(),
                PlacementConfig::new(Rate::from_percent(20).unwrap()),
            )
        }

        fn seed_product(&self, tenant_id: TenantId, prices: PriceCard, stock: i64) -> ProductId {
            let product_id = ProductId::new(AggregateId::new());

            let mut commands = vec![
                ProductCommand::CreateProduct(CreateProduct {
                    tenant_id,
                    product_id,
                    sku: format!("SKU-{}", &product_id.to_string()[..8]),
                    name: "Integration widget".to_string(),
                    prices,
                    reorder_threshold: 1,
                    occurred_at: Utc::now(),
                }),
                ProductCommand::ActivateProduct(ActivateProduct {
                    tenant_id,
                    product_id,
                    occurred_at: Utc::now(),
                }),
            ];
            if stock > 0 {
                commands.push(ProductCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    product_id,
                    quantity: stock,
                    occurred_at: Utc::now(),
                }));
            }

            for command in commands {
                self.dispatcher
                    .dispatch::<Product>(
                        tenant_id,
                        product_id.0,
                        "catalog.product",
                        command,
                        |_, id| Product::empty(ProductId::new(id)),
                    )
                    .unwrap();
            }

            product_id
        }

        fn seed_firm(
            &self,
            tenant_id: TenantId,
            class: FirmClass,
            discount_pct: Option<u32>,
            activate: bool,
        ) -> FirmId {
            let firm_id = FirmId::new(AggregateId::new());

            let mut commands = vec![FirmCommand::RegisterProspect(RegisterProspect {
                tenant_id,
                firm_id,
                name: "Integration buyer".to_string(),
                contact: None,
                priority_score: 70,
                occurred_at: Utc::now(),
            })];
            if activate {
                commands.push(FirmCommand::ActivateFirm(ActivateFirm {
                    tenant_id,
                    firm_id,
                    class,
                    payment_terms: None,
                    occurred_at: Utc::now(),
                }));
            }
            if let Some(pct) = discount_pct {
                commands.push(FirmCommand::SetSpecialDiscount(SetSpecialDiscount {
                    tenant_id,
                    firm_id,
                    discount: Some(Rate::from_percent(pct).unwrap()),
                    occurred_at: Utc::now(),
                }));
            }

            for command in commands {
                self.dispatcher
                    .dispatch::<Firm>(tenant_id, firm_id.0, "firms.firm", command, |_, id| {
                        Firm::empty(FirmId::new(id))
                    })
                    .unwrap();
            }

            firm_id
        }

        async fn stock_of(&self, tenant_id: TenantId, product_id: ProductId) -> i64 {
            self.lookup
                .get_product(tenant_id, product_id)
                .await
                .unwrap()
                .stock
        }

        fn rehydrate_order(&self, tenant_id: TenantId, order_id: OrderId) -> Order {
            let history = self.store.load_stream(tenant_id, order_id.0).unwrap();
            let mut order = Order::empty(order_id);
            apply_history::<Order>(&mut order, &history).unwrap();
            order
        }
    }

    fn both_tiers() -> PriceCard {
        PriceCard {
            customer: Some(Money::from_cents(6_000)),
            dealer: Some(Money::from_cents(5_000)),
            unit_cost: Some(Money::from_cents(3_500)),
        }
    }

    fn request(buyer_id: FirmId, lines: Vec<LineRequest>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            buyer_id,
            creator_id: UserId::new(),
            source: OrderSource::Portal,
            delivery_address: "4 Harbour Road".to_string(),
            lines,
        }
    }

    fn line(product_id: ProductId, quantity: i64) -> LineRequest {
        LineRequest {
            product_id,
            quantity,
            unit_price_override: None,
        }
    }

    /// Writer that always fails, simulating a persistence outage after
    /// reservations succeeded.
    struct FailingWriter;

    #[async_trait]
    impl OrderWriter for FailingWriter {
        async fn persist(&self, _command: PlaceOrder) -> Result<(), PersistError> {
            Err(PersistError::Store("injected persistence failure".to_string()))
        }
    }

    /// Writer that never completes, so the surrounding call can be cancelled
    /// mid-persist.
    struct BlockingWriter;

    #[async_trait]
    impl OrderWriter for BlockingWriter {
        async fn persist(&self, _command: PlaceOrder) -> Result<(), PersistError> {
            std::future::pending::<Result<(), PersistError>>().await
        }
    }

    /// Counts persist calls before delegating.
    struct CountingWriter {
        inner: Arc<dyn OrderWriter>,
        calls: AtomicUsize,
    }

    impl CountingWriter {
        fn new(inner: Arc<dyn OrderWriter>) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderWriter for CountingWriter {
        async fn persist(&self, command: PlaceOrder) -> Result<(), PersistError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.persist(command).await
        }
    }

    #[tokio::test]
    async fn dealer_discount_is_resolved_and_stock_decremented() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 10);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Dealer, Some(10), true);

        let placed = rig
            .engine()
            .place_order(tenant_id, request(buyer_id, vec![line(product_id, 2)]))
            .await
            .unwrap();

        // Dealer price 50.00, special discount 10% → unit net 45.00.
        assert_eq!(placed.lines.len(), 1);
        assert_eq!(placed.lines[0].unit_price, Money::from_cents(5_000));
        assert_eq!(placed.lines[0].net_total, Money::from_cents(9_000));
        assert_eq!(placed.net_total, Money::from_cents(9_000));
        // 20% VAT on 90.00 → 108.00 gross.
        assert_eq!(placed.gross_total, Money::from_cents(10_800));

        assert_eq!(rig.stock_of(tenant_id, product_id).await, 8);

        // The order is durably persisted with matching totals.
        let order = rig.rehydrate_order(tenant_id, placed.order_id);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.net_total(), placed.net_total);
        assert_eq!(order.net_total(), order.lines_net_sum());
        assert_eq!(order.lines().len(), 1);
    }

    #[tokio::test]
    async fn price_override_bypasses_the_resolver() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        // No dealer tier price at all.
        let product_id = rig.seed_product(
            tenant_id,
            PriceCard {
                customer: Some(Money::from_cents(6_000)),
                dealer: None,
                unit_cost: None,
            },
            5,
        );
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Dealer, Some(10), true);

        // Without the override the line fails PriceUnavailable.
        let err = rig
            .engine()
            .place_order(tenant_id, request(buyer_id, vec![line(product_id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceOrderError::PriceUnavailable { .. }));

        let placed = rig
            .engine()
            .place_order(
                tenant_id,
                request(
                    buyer_id,
                    vec![LineRequest {
                        product_id,
                        quantity: 1,
                        unit_price_override: Some(Money::from_cents(4_200)),
                    }],
                ),
            )
            .await
            .unwrap();

        assert_eq!(placed.lines[0].unit_price, Money::from_cents(4_200));
        assert!(placed.lines[0].discount.is_zero());
        assert_eq!(rig.stock_of(tenant_id, product_id).await, 4);
    }

    #[tokio::test]
    async fn multi_line_shortage_rolls_back_the_whole_order() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_a = rig.seed_product(tenant_id, both_tiers(), 5);
        let product_b = rig.seed_product(tenant_id, both_tiers(), 2);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Customer, None, true);

        let writer = Arc::new(CountingWriter::new(Arc::new(EventSourcedOrders::new(
            rig.dispatcher.clone(),
        ))));
        let engine = rig.engine_with_writer(writer.clone());

        // qty 3 of A (stock 5) reserves fine; qty 4 of B (stock 2) fails.
        let err = engine
            .place_order(
                tenant_id,
                request(buyer_id, vec![line(product_a, 3), line(product_b, 4)]),
            )
            .await
            .unwrap_err();

        match err {
            PlaceOrderError::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, product_b);
                assert_eq!(requested, 4);
                assert_eq!(available, 2);
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }

        // Product A's reservation was compensated; nothing was persisted.
        assert_eq!(rig.stock_of(tenant_id, product_a).await, 5);
        assert_eq!(rig.stock_of(tenant_id, product_b).await, 2);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persistence_failure_releases_every_reservation() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_a = rig.seed_product(tenant_id, both_tiers(), 5);
        let product_b = rig.seed_product(tenant_id, both_tiers(), 5);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Customer, None, true);

        let engine = rig.engine_with_writer(Arc::new(FailingWriter));
        let err = engine
            .place_order(
                tenant_id,
                request(buyer_id, vec![line(product_a, 2), line(product_b, 3)]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PlaceOrderError::Persistence(_)));
        assert_eq!(rig.stock_of(tenant_id, product_a).await, 5);
        assert_eq!(rig.stock_of(tenant_id, product_b).await, 5);
    }

    #[tokio::test]
    async fn cancellation_mid_persist_releases_reservations() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 5);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Customer, None, true);

        let engine = rig.engine_with_writer(Arc::new(BlockingWriter));
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            engine.place_order(tenant_id, request(buyer_id, vec![line(product_id, 4)])),
        )
        .await;

        // The call was cancelled while blocked in persistence; dropping the
        // in-flight future must have released the reservation.
        assert!(result.is_err());
        assert_eq!(rig.stock_of(tenant_id, product_id).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_single_unit_placements_exactly_one_wins() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 1);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Customer, None, true);

        let engine = Arc::new(rig.engine());
        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let req = request(buyer_id, vec![line(product_id, 1)]);
            handles.push(tokio::spawn(async move {
                engine.place_order(tenant_id, req).await
            }));
        }

        let mut successes = 0;
        let mut shortages = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(PlaceOrderError::InsufficientStock { .. }) => shortages += 1,
                Err(other) => panic!("Unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(shortages, 1);
        assert_eq!(rig.stock_of(tenant_id, product_id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_placements_stop_exactly_at_stock_exhaustion() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 10);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Customer, None, true);

        let engine = Arc::new(rig.engine());
        let mut handles = Vec::new();
        for _ in 0..5 {
            let engine = engine.clone();
            let req = request(buyer_id, vec![line(product_id, 3)]);
            handles.push(tokio::spawn(async move {
                engine.place_order(tenant_id, req).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(PlaceOrderError::InsufficientStock { .. }) => {}
                Err(other) => panic!("Unexpected error: {other:?}"),
            }
        }

        // 10 units at 3 per order: exactly 3 orders fit, stock never negative.
        assert_eq!(successes, 3);
        assert_eq!(rig.stock_of(tenant_id, product_id).await, 1);
    }

    #[tokio::test]
    async fn buyers_that_cannot_transact_are_rejected_before_reservation() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 5);
        let prospect = rig.seed_firm(tenant_id, FirmClass::Customer, None, false);
        let unknown = FirmId::new(AggregateId::new());

        let engine = rig.engine();

        let err = engine
            .place_order(tenant_id, request(prospect, vec![line(product_id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceOrderError::BuyerInactive { .. }));

        let err = engine
            .place_order(tenant_id, request(unknown, vec![line(product_id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceOrderError::BuyerNotFound { .. }));

        assert_eq!(rig.stock_of(tenant_id, product_id).await, 5);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_side_effect() {
        let rig = TestRig::new();
        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 5);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Customer, None, true);
        let engine = rig.engine();

        let err = engine
            .place_order(tenant_id, request(buyer_id, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceOrderError::InvalidInput(_)));

        let err = engine
            .place_order(tenant_id, request(buyer_id, vec![line(product_id, 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceOrderError::InvalidInput(_)));

        let mut req = request(buyer_id, vec![line(product_id, 1)]);
        req.delivery_address = "  ".to_string();
        let err = engine.place_order(tenant_id, req).await.unwrap_err();
        assert!(matches!(err, PlaceOrderError::InvalidInput(_)));

        assert_eq!(rig.stock_of(tenant_id, product_id).await, 5);
    }

    #[tokio::test]
    async fn tenants_do_not_see_each_other() {
        let rig = TestRig::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let product_id = rig.seed_product(tenant_a, both_tiers(), 5);
        let buyer_b = rig.seed_firm(tenant_b, FirmClass::Customer, None, true);

        // Tenant B cannot order tenant A's product.
        let err = rig
            .engine()
            .place_order(tenant_b, request(buyer_b, vec![line(product_id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceOrderError::ProductNotFound { .. }));
    }

    #[tokio::test]
    async fn projections_follow_the_event_stream() {
        let rig = TestRig::new();

        // Subscribe to the bus BEFORE any events are published.
        let stock_levels = Arc::new(StockLevelsProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let order_book = Arc::new(OrderBookProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let subscription = rig.bus.subscribe();
        let pump_stock = stock_levels.clone();
        let pump_orders = order_book.clone();
        let pump = std::thread::spawn(move || {
            while let Ok(envelope) = subscription.recv() {
                match envelope.aggregate_type() {
                    "catalog.product" => {
                        pump_stock.apply_envelope(&envelope).unwrap();
                    }
                    "orders.order" => {
                        pump_orders.apply_envelope(&envelope).unwrap();
                    }
                    _ => {}
                }
            }
        });

        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 3);
        let buyer_id = rig.seed_firm(tenant_id, FirmClass::Dealer, Some(10), true);

        let placed = rig
            .engine()
            .place_order(tenant_id, request(buyer_id, vec![line(product_id, 2)]))
            .await
            .unwrap();

        // Give the pump thread a moment to drain the channel.
        std::thread::sleep(Duration::from_millis(100));

        let stock = stock_levels.get(tenant_id, &product_id).unwrap();
        assert_eq!(stock.on_hand, 1);
        assert!(stock.active);
        assert!(stock.below_threshold());
        assert_eq!(stock_levels.list_below_threshold(tenant_id).len(), 1);

        let order = order_book.get(tenant_id, &placed.order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.net_total, placed.net_total);

        drop(rig);
        let _ = pump.join();
    }

    #[tokio::test]
    async fn projection_ignores_duplicate_envelopes() {
        let rig = TestRig::new();
        let subscription = rig.bus.subscribe();

        let tenant_id = TenantId::new();
        let product_id = rig.seed_product(tenant_id, both_tiers(), 4);

        let stock_levels = StockLevelsProjection::new(Arc::new(InMemoryTenantStore::new()));
        let mut envelopes = Vec::new();
        while let Ok(envelope) = subscription.try_recv() {
            envelopes.push(envelope);
        }

        for envelope in &envelopes {
            stock_levels.apply_envelope(envelope).unwrap();
        }
        // At-least-once delivery: replaying the same envelopes must not
        // double-count stock.
        for envelope in &envelopes {
            stock_levels.apply_envelope(envelope).unwrap();
        }

        assert_eq!(stock_levels.get(tenant_id, &product_id).unwrap().on_hand, 4);
    }
}

//! Infrastructure wiring: event store, bus, dispatcher, engines, projections.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::warn;

use depot_catalog::ProductId;
use depot_core::{Aggregate, AggregateId, DomainError, Rate, TenantId};
use depot_events::{EventBus, EventEnvelope, InMemoryEventBus};
use depot_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use depot_infra::event_store::{InMemoryEventStore, StoredEvent};
use depot_infra::lookup::EventSourcedLookup;
use depot_infra::placement::{EventSourcedOrders, PlacementConfig, PlacementEngine};
use depot_infra::projections::{
    OrderBookProjection, OrderReadModel, StockLevelReadModel, StockLevelsProjection,
};
use depot_infra::read_model::InMemoryTenantStore;
use depot_infra::stock_ledger::StockLedger;
use depot_orders::OrderId;
use depot_pricing::{LeadScorer, ScoringConfig};

pub type Store = Arc<InMemoryEventStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<Store, Bus>;

type StockLevels = StockLevelsProjection<Arc<InMemoryTenantStore<ProductId, StockLevelReadModel>>>;
type OrderBook = OrderBookProjection<Arc<InMemoryTenantStore<OrderId, OrderReadModel>>>;

/// Everything the HTTP handlers need, wired once at startup.
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    engine: PlacementEngine<Store, Bus>,
    lookup: Arc<EventSourcedLookup<Store>>,
    scorer: LeadScorer,
    stock_levels: Arc<StockLevels>,
    order_book: Arc<OrderBook>,
}

impl AppServices {
    pub fn engine(&self) -> &PlacementEngine<Store, Bus> {
        &self.engine
    }

    pub fn lookup(&self) -> &EventSourcedLookup<Store> {
        &self.lookup
    }

    pub fn scorer(&self) -> &LeadScorer {
        &self.scorer
    }

    pub fn stock_levels(&self) -> &StockLevels {
        &self.stock_levels
    }

    pub fn order_book(&self) -> &OrderBook {
        &self.order_book
    }

    /// Dispatch a command against an aggregate (thin command routes).
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: depot_events::Event + Serialize + DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)
    }
}

/// In-memory infra wiring: store + bus + dispatcher + engines + projections,
/// with a pump thread feeding the projections from the bus.
pub fn build_services() -> AppServices {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    let lookup = Arc::new(EventSourcedLookup::new(store.clone()));
    let ledger = StockLedger::new(store.clone(), bus.clone());

    let stock_levels: Arc<StockLevels> = Arc::new(StockLevelsProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));
    let order_book: Arc<OrderBook> = Arc::new(OrderBookProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    // Subscribe before any command can be dispatched so the read models see
    // every event from sequence 1.
    let subscription = bus.subscribe();
    let pump_stock = stock_levels.clone();
    let pump_orders = order_book.clone();
    std::thread::spawn(move || {
        while let Ok(envelope) = subscription.recv() {
            let result = match envelope.aggregate_type() {
                "catalog.product" => pump_stock
                    .apply_envelope(&envelope)
                    .map_err(|e| e.to_string()),
                "orders.order" => pump_orders
                    .apply_envelope(&envelope)
                    .map_err(|e| e.to_string()),
                _ => Ok(()),
            };
            if let Err(error) = result {
                warn!(error = %error, "projection failed to apply envelope");
            }
        }
    });

    let engine = PlacementEngine::new(
        lookup.clone(),
        lookup.clone(),
        Arc::new(EventSourcedOrders::new(dispatcher.clone())),
        ledger,
        PlacementConfig::new(vat_rate_from_env()),
    );

    AppServices {
        dispatcher,
        engine,
        lookup,
        scorer: LeadScorer::new(ScoringConfig::default()),
        stock_levels,
        order_book,
    }
}

/// VAT rate for order grossing, percent via `DEPOT_VAT_PERCENT` (default 20).
fn vat_rate_from_env() -> Rate {
    let percent = std::env::var("DEPOT_VAT_PERCENT")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(20);

    match Rate::from_percent(percent) {
        Ok(rate) => rate,
        Err(_) => {
            warn!(percent, "DEPOT_VAT_PERCENT out of range; falling back to 20%");
            Rate::from_percent(20).expect("20 is a valid percentage")
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_catalog::ProductId;
use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, Rate, TenantId, UserId};
use depot_events::Event;
use depot_firms::FirmId;

/// Order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Where an order entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSource {
    Internal,
    Portal,
}

/// Order status lifecycle.
///
/// Orders are immutable once placed; only the status moves, through the
/// fulfillment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

/// Input line for `PlaceOrder`: priced by the resolver (or a manual override)
/// before it reaches the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Class base unit price, in cents.
    pub unit_price: Money,
    /// Per-firm discount applied to this line.
    pub discount: Rate,
}

impl PricedLine {
    /// Per-unit net after discount, rounded to cents.
    pub fn unit_net(&self) -> Money {
        self.unit_price.less(self.discount)
    }

    /// Line net total (`quantity × unit net`); `None` on overflow.
    pub fn net_total(&self) -> Option<Money> {
        self.unit_net().checked_mul(self.quantity)
    }
}

/// One product/quantity pair within a placed order.
///
/// `unit_price` and `discount` are captured at placement time and never
/// recomputed, so historical orders are immune to later price changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Rate,
    pub net_total: Money,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    tenant_id: Option<TenantId>,
    buyer_id: Option<FirmId>,
    creator_id: Option<UserId>,
    source: OrderSource,
    delivery_address: String,
    status: OrderStatus,
    vat_rate: Rate,
    net_total: Money,
    gross_total: Money,
    lines: Vec<OrderLine>,
    placed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            buyer_id: None,
            creator_id: None,
            source: OrderSource::Internal,
            delivery_address: String::new(),
            status: OrderStatus::Pending,
            vat_rate: Rate::ZERO,
            net_total: Money::ZERO,
            gross_total: Money::ZERO,
            lines: Vec::new(),
            placed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn buyer_id(&self) -> Option<FirmId> {
        self.buyer_id
    }

    pub fn creator_id(&self) -> Option<UserId> {
        self.creator_id
    }

    pub fn source(&self) -> OrderSource {
        self.source
    }

    pub fn delivery_address(&self) -> &str {
        &self.delivery_address
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn vat_rate(&self) -> Rate {
        self.vat_rate
    }

    pub fn net_total(&self) -> Money {
        self.net_total
    }

    pub fn gross_total(&self) -> Money {
        self.gross_total
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    /// Sum of line net totals (used to assert the totals invariant).
    pub fn lines_net_sum(&self) -> Money {
        self.lines
            .iter()
            .fold(Money::ZERO, |acc, line| {
                acc.checked_add(line.net_total).unwrap_or(acc)
            })
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
///
/// Carries the complete, already-priced order. The resulting events (header +
/// one per line) are emitted together so the store appends them as one atomic
/// batch: no observer ever sees a header without its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub buyer_id: FirmId,
    pub creator_id: UserId,
    pub source: OrderSource,
    pub delivery_address: String,
    pub vat_rate: Rate,
    pub lines: Vec<PricedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkFulfilled {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    MarkFulfilled(MarkFulfilled),
    CancelOrder(CancelOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub buyer_id: FirmId,
    pub creator_id: UserId,
    pub source: OrderSource,
    pub delivery_address: String,
    pub vat_rate: Rate,
    pub net_total: Money,
    pub gross_total: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineAdded {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Rate,
    pub net_total: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderFulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFulfilled {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderLineAdded(OrderLineAdded),
    OrderFulfilled(OrderFulfilled),
    OrderCancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderLineAdded(_) => "orders.order.line_added",
            OrderEvent::OrderFulfilled(_) => "orders.order.fulfilled",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderLineAdded(e) => e.occurred_at,
            OrderEvent::OrderFulfilled(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.buyer_id = Some(e.buyer_id);
                self.creator_id = Some(e.creator_id);
                self.source = e.source;
                self.delivery_address = e.delivery_address.clone();
                self.status = OrderStatus::Pending;
                self.vat_rate = e.vat_rate;
                self.net_total = e.net_total;
                self.gross_total = e.gross_total;
                self.lines.clear();
                self.placed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderLineAdded(e) => {
                self.lines.push(OrderLine {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                    unit_price: e.unit_price,
                    discount: e.discount,
                    net_total: e.net_total,
                });
            }
            OrderEvent::OrderFulfilled(_) => {
                self.status = OrderStatus::Fulfilled;
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::MarkFulfilled(cmd) => self.handle_fulfill(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_created(&self, tenant_id: TenantId, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.delivery_address.trim().is_empty() {
            return Err(DomainError::validation("delivery address cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one line"));
        }

        let mut net_total = Money::ZERO;
        let mut line_events = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity must be positive for product {}",
                    line.product_id
                )));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::validation(format!(
                    "unit price cannot be negative for product {}",
                    line.product_id
                )));
            }

            let line_net = line
                .net_total()
                .ok_or_else(|| DomainError::validation("order line total overflow"))?;
            net_total = net_total
                .checked_add(line_net)
                .ok_or_else(|| DomainError::validation("order total overflow"))?;

            line_events.push(OrderEvent::OrderLineAdded(OrderLineAdded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line_no: (idx as u32) + 1,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                net_total: line_net,
                occurred_at: cmd.occurred_at,
            }));
        }

        let gross_total = net_total
            .checked_add(net_total.portion(cmd.vat_rate))
            .ok_or_else(|| DomainError::validation("order total overflow"))?;

        let mut events = Vec::with_capacity(line_events.len() + 1);
        events.push(OrderEvent::OrderPlaced(OrderPlaced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            buyer_id: cmd.buyer_id,
            creator_id: cmd.creator_id,
            source: cmd.source,
            delivery_address: cmd.delivery_address.clone(),
            vat_rate: cmd.vat_rate,
            net_total,
            gross_total,
            occurred_at: cmd.occurred_at,
        }));
        events.extend(line_events);

        Ok(events)
    }

    fn handle_fulfill(&self, cmd: &MarkFulfilled) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.order_id)?;

        if self.status != OrderStatus::Pending {
            return Err(DomainError::invariant("only pending orders can be fulfilled"));
        }

        Ok(vec![OrderEvent::OrderFulfilled(OrderFulfilled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.order_id)?;

        if self.status != OrderStatus::Pending {
            return Err(DomainError::invariant("only pending orders can be cancelled"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

//! Catalog domain module (event-sourced).
//!
//! Products carry their per-class price card, current stock, and a reorder
//! threshold. Stock is mutated only through the receive/reserve/release
//! commands; everything here is deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod product;

pub use product::{
    ActivateProduct, CreateProduct, DiscontinueProduct, PriceCard, PricesChanged, Product,
    ProductActivated, ProductCommand, ProductCreated, ProductDiscontinued, ProductEvent,
    ProductId, ProductStatus, ReceiveStock, ReleaseStock, ReserveStock, SetPrices,
    StockReceived, StockReleased, StockReserved,
};

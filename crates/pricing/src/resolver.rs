//! Price resolution: buyer class + per-firm override → unit net price.

use thiserror::Error;

use depot_catalog::PriceCard;
use depot_core::{Money, Rate};
use depot_firms::FirmClass;

/// Pricing-relevant view of a buyer record.
///
/// `class` is `None` for legacy/unclassified records; resolution treats that
/// as an error rather than silently falling back to a default tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyerTerms {
    pub class: Option<FirmClass>,
    pub special_discount: Option<Rate>,
}

/// Output of price resolution for one order line.
///
/// `unit_price` is the class base price, `discount` the applied per-firm
/// override, and `unit_net` the discounted per-unit price rounded to cents.
/// Lines persist the base + discount pair; the net is derived, so the
/// discount is never applied twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrice {
    pub unit_price: Money,
    pub discount: Rate,
    pub unit_net: Money,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PriceError {
    /// The buyer record carries no class, so no base price table applies.
    #[error("buyer class is missing or invalid")]
    InvalidBuyerClass,

    /// The resolved class has no usable base price on this product.
    #[error("no {class:?} price available for this product")]
    PriceUnavailable { class: FirmClass },
}

/// Resolve the authoritative unit net price for one buyer/product pair.
///
/// Deterministic and pure: identical inputs always produce identical output.
/// `quantity` is part of the contract for forward compatibility but does not
/// currently alter the price (there are no quantity breakpoints).
pub fn resolve_price(
    buyer: &BuyerTerms,
    prices: &PriceCard,
    _quantity: i64,
) -> Result<ResolvedPrice, PriceError> {
    let class = buyer.class.ok_or(PriceError::InvalidBuyerClass)?;

    let base = match class {
        FirmClass::Customer => prices.customer,
        FirmClass::Dealer => prices.dealer,
    };
    let unit_price = base
        .filter(|price| price.is_positive())
        .ok_or(PriceError::PriceUnavailable { class })?;

    let discount = buyer.special_discount.unwrap_or(Rate::ZERO);

    Ok(ResolvedPrice {
        unit_price,
        discount,
        unit_net: unit_price.less(discount),
    })
}

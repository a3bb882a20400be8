//! Pricing domain module: price resolution and lead scoring.
//!
//! Both engines are pure and table-driven: the resolver maps a buyer's class
//! and per-firm override onto a product's price card, the scorer maps a lead
//! category and tag set onto a clamped priority score. Neither performs IO.

pub mod resolver;
pub mod scoring;

pub use resolver::{resolve_price, BuyerTerms, PriceError, ResolvedPrice};
pub use scoring::{LeadCategory, LeadScorer, ScoreBand, ScoringConfig};

//! Firm directory domain module (event-sourced).
//!
//! A firm is a buyer record: its class decides which price tier applies, its
//! special discount overrides the class default, and its lifecycle gates
//! whether it may transact. Pure domain logic only (no IO, no HTTP, no
//! storage).

pub mod firm;

pub use firm::{
    ActivateFirm, ContactInfo, DeactivateFirm, Firm, FirmActivated, FirmClass, FirmCommand,
    FirmDeactivated, FirmEvent, FirmId, FirmStatus, FirmUpdated, NetDays, ProspectRegistered,
    RegisterProspect, SetSpecialDiscount, SpecialDiscountSet, UpdateDetails,
};

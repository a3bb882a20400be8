use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Rate, TenantId};
use depot_events::Event;

/// Firm identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FirmId(pub AggregateId);

impl FirmId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FirmId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Buyer class: decides which base price tier applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmClass {
    Customer,
    Dealer,
}

/// Firm status lifecycle: prospect → active → inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmStatus {
    Prospect,
    Active,
    Inactive,
}

/// Payment terms in net days.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetDays(pub u16);

impl Default for NetDays {
    fn default() -> Self {
        NetDays(30)
    }
}

/// Contact information for a firm.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Aggregate root: Firm (buyer record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firm {
    id: FirmId,
    tenant_id: Option<TenantId>,
    name: String,
    /// Unset while the record is an unclassified prospect; assigned at
    /// activation.
    class: Option<FirmClass>,
    status: FirmStatus,
    special_discount: Option<Rate>,
    payment_terms: NetDays,
    /// Lead priority score captured at onboarding.
    priority_score: i32,
    contact: ContactInfo,
    version: u64,
    created: bool,
}

impl Firm {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: FirmId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            class: None,
            status: FirmStatus::Prospect,
            special_discount: None,
            payment_terms: NetDays::default(),
            priority_score: 0,
            contact: ContactInfo::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> FirmId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> Option<FirmClass> {
        self.class
    }

    pub fn status(&self) -> FirmStatus {
        self.status
    }

    pub fn special_discount(&self) -> Option<Rate> {
        self.special_discount
    }

    pub fn payment_terms(&self) -> NetDays {
        self.payment_terms
    }

    pub fn priority_score(&self) -> i32 {
        self.priority_score
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    /// Invariant helper: only active firms may place orders.
    pub fn can_transact(&self) -> bool {
        self.status == FirmStatus::Active
    }
}

impl AggregateRoot for Firm {
    type Id = FirmId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterProspect.
///
/// `priority_score` is computed by the scoring engine at onboarding and
/// captured on the record for follow-up prioritization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProspect {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub name: String,
    pub contact: Option<ContactInfo>,
    pub priority_score: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivateFirm (assigns the buyer class).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateFirm {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub class: FirmClass,
    pub payment_terms: Option<NetDays>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateFirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateFirm {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetSpecialDiscount.
///
/// `None` clears the override and the firm falls back to its class default
/// (no discount). The `Rate` type bounds the value to 0–100% at construction;
/// an out-of-range discount never reaches the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSpecialDiscount {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub discount: Option<Rate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmCommand {
    RegisterProspect(RegisterProspect),
    ActivateFirm(ActivateFirm),
    DeactivateFirm(DeactivateFirm),
    SetSpecialDiscount(SetSpecialDiscount),
    UpdateDetails(UpdateDetails),
}

/// Event: ProspectRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectRegistered {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub name: String,
    pub contact: ContactInfo,
    pub priority_score: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FirmActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmActivated {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub class: FirmClass,
    pub payment_terms: NetDays,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FirmDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmDeactivated {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SpecialDiscountSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDiscountSet {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub discount: Option<Rate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FirmUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmUpdated {
    pub tenant_id: TenantId,
    pub firm_id: FirmId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmEvent {
    ProspectRegistered(ProspectRegistered),
    FirmActivated(FirmActivated),
    FirmDeactivated(FirmDeactivated),
    SpecialDiscountSet(SpecialDiscountSet),
    FirmUpdated(FirmUpdated),
}

impl Event for FirmEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FirmEvent::ProspectRegistered(_) => "firms.firm.prospect_registered",
            FirmEvent::FirmActivated(_) => "firms.firm.activated",
            FirmEvent::FirmDeactivated(_) => "firms.firm.deactivated",
            FirmEvent::SpecialDiscountSet(_) => "firms.firm.discount_set",
            FirmEvent::FirmUpdated(_) => "firms.firm.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FirmEvent::ProspectRegistered(e) => e.occurred_at,
            FirmEvent::FirmActivated(e) => e.occurred_at,
            FirmEvent::FirmDeactivated(e) => e.occurred_at,
            FirmEvent::SpecialDiscountSet(e) => e.occurred_at,
            FirmEvent::FirmUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Firm {
    type Command = FirmCommand;
    type Event = FirmEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FirmEvent::ProspectRegistered(e) => {
                self.id = e.firm_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.class = None;
                self.status = FirmStatus::Prospect;
                self.priority_score = e.priority_score;
                self.contact = e.contact.clone();
                self.created = true;
            }
            FirmEvent::FirmActivated(e) => {
                self.class = Some(e.class);
                self.payment_terms = e.payment_terms;
                self.status = FirmStatus::Active;
            }
            FirmEvent::FirmDeactivated(_) => {
                self.status = FirmStatus::Inactive;
            }
            FirmEvent::SpecialDiscountSet(e) => {
                self.special_discount = e.discount;
            }
            FirmEvent::FirmUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FirmCommand::RegisterProspect(cmd) => self.handle_register(cmd),
            FirmCommand::ActivateFirm(cmd) => self.handle_activate(cmd),
            FirmCommand::DeactivateFirm(cmd) => self.handle_deactivate(cmd),
            FirmCommand::SetSpecialDiscount(cmd) => self.handle_set_discount(cmd),
            FirmCommand::UpdateDetails(cmd) => self.handle_update(cmd),
        }
    }
}

impl Firm {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_firm_id(&self, firm_id: FirmId) -> Result<(), DomainError> {
        if self.id != firm_id {
            return Err(DomainError::invariant("firm_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self, tenant_id: TenantId, firm_id: FirmId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_firm_id(firm_id)
    }

    fn handle_register(&self, cmd: &RegisterProspect) -> Result<Vec<FirmEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("firm already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![FirmEvent::ProspectRegistered(ProspectRegistered {
            tenant_id: cmd.tenant_id,
            firm_id: cmd.firm_id,
            name: cmd.name.clone(),
            contact: cmd.contact.clone().unwrap_or_default(),
            priority_score: cmd.priority_score,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateFirm) -> Result<Vec<FirmEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.firm_id)?;

        if self.status == FirmStatus::Active {
            return Err(DomainError::invariant("firm is already active"));
        }

        Ok(vec![FirmEvent::FirmActivated(FirmActivated {
            tenant_id: cmd.tenant_id,
            firm_id: cmd.firm_id,
            class: cmd.class,
            payment_terms: cmd.payment_terms.unwrap_or(self.payment_terms),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateFirm) -> Result<Vec<FirmEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.firm_id)?;

        if self.status != FirmStatus::Active {
            return Err(DomainError::invariant("only active firms can be deactivated"));
        }

        Ok(vec![FirmEvent::FirmDeactivated(FirmDeactivated {
            tenant_id: cmd.tenant_id,
            firm_id: cmd.firm_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_discount(&self, cmd: &SetSpecialDiscount) -> Result<Vec<FirmEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.firm_id)?;

        Ok(vec![FirmEvent::SpecialDiscountSet(SpecialDiscountSet {
            tenant_id: cmd.tenant_id,
            firm_id: cmd.firm_id,
            discount: cmd.discount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateDetails) -> Result<Vec<FirmEvent>, DomainError> {
        self.ensure_created(cmd.tenant_id, cmd.firm_id)?;

        let name = match &cmd.name {
            Some(name) => {
                if name.trim().is_empty() {
                    return Err(DomainError::validation("name cannot be empty"));
                }
                name.clone()
            }
            None => self.name.clone(),
        };

        Ok(vec![FirmEvent::FirmUpdated(FirmUpdated {
            tenant_id: cmd.tenant_id,
            firm_id: cmd.firm_id,
            name,
            contact: cmd.contact.clone().unwrap_or_else(|| self.contact.clone()),
            occurred_at: cmd.occurred_at,
        })])
    }
}

//! Purchase order header and line item models
//!
//! A line item only ever moves forward through its stages:
//! requested → accepted → registered → verified → approved.
//! Every mutator here refuses a change that would move it backwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::validation::validate_price_pair;

/// Aggregate status of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    PendingAdminAcceptance,
    AcceptedByAdmin,
    PartiallyRegistered,
    CompletelyRegistered,
    PartiallyFinanceProcessed,
    FullyFinanceProcessed,
    PartiallyApproved,
    FullyApproved,
    Rejected,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::PendingAdminAcceptance => "pending_admin_acceptance",
            PurchaseOrderStatus::AcceptedByAdmin => "accepted_by_admin",
            PurchaseOrderStatus::PartiallyRegistered => "partially_registered",
            PurchaseOrderStatus::CompletelyRegistered => "completely_registered",
            PurchaseOrderStatus::PartiallyFinanceProcessed => "partially_finance_processed",
            PurchaseOrderStatus::FullyFinanceProcessed => "fully_finance_processed",
            PurchaseOrderStatus::PartiallyApproved => "partially_approved",
            PurchaseOrderStatus::FullyApproved => "fully_approved",
            PurchaseOrderStatus::Rejected => "rejected",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending_admin_acceptance" => Some(PurchaseOrderStatus::PendingAdminAcceptance),
            "accepted_by_admin" => Some(PurchaseOrderStatus::AcceptedByAdmin),
            "partially_registered" => Some(PurchaseOrderStatus::PartiallyRegistered),
            "completely_registered" => Some(PurchaseOrderStatus::CompletelyRegistered),
            "partially_finance_processed" => Some(PurchaseOrderStatus::PartiallyFinanceProcessed),
            "fully_finance_processed" => Some(PurchaseOrderStatus::FullyFinanceProcessed),
            "partially_approved" => Some(PurchaseOrderStatus::PartiallyApproved),
            "fully_approved" => Some(PurchaseOrderStatus::FullyApproved),
            "rejected" => Some(PurchaseOrderStatus::Rejected),
            "cancelled" => Some(PurchaseOrderStatus::Cancelled),
            _ => None,
        }
    }

    /// No further mutation is accepted in these statuses
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::FullyApproved
                | PurchaseOrderStatus::Rejected
                | PurchaseOrderStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurchaseOrderStatus::PendingAdminAcceptance => write!(f, "Pending Admin Acceptance"),
            PurchaseOrderStatus::AcceptedByAdmin => write!(f, "Accepted By Admin"),
            PurchaseOrderStatus::PartiallyRegistered => write!(f, "Partially Registered"),
            PurchaseOrderStatus::CompletelyRegistered => write!(f, "Completely Registered"),
            PurchaseOrderStatus::PartiallyFinanceProcessed => {
                write!(f, "Partially Finance Processed")
            }
            PurchaseOrderStatus::FullyFinanceProcessed => write!(f, "Fully Finance Processed"),
            PurchaseOrderStatus::PartiallyApproved => write!(f, "Partially Approved"),
            PurchaseOrderStatus::FullyApproved => write!(f, "Fully Approved"),
            PurchaseOrderStatus::Rejected => write!(f, "Rejected"),
            PurchaseOrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Purchase order header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub created_by: Uuid,
    pub status: PurchaseOrderStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Finance review outcome for a line item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinanceReview {
    #[default]
    Pending,
    Verified,
    Declined,
}

impl FinanceReview {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinanceReview::Pending => "pending",
            FinanceReview::Verified => "verified",
            FinanceReview::Declined => "declined",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FinanceReview::Pending),
            "verified" => Some(FinanceReview::Verified),
            "declined" => Some(FinanceReview::Declined),
            _ => None,
        }
    }
}

/// Furthest stage a line item has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Requested,
    Accepted,
    Registered,
    Verified,
    Approved,
}

/// One product line within a purchase order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub product_id: Uuid,
    pub quantity_requested: i64,
    pub quantity_accepted: Option<i64>,
    /// Accumulated across every registration call
    pub quantity_registered: Option<i64>,
    pub finance_review: FinanceReview,
    pub buying_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    /// Set once, never cleared
    pub approved_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrderItem {
    pub fn new(purchase_order_id: Uuid, product_id: Uuid, quantity_requested: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            purchase_order_id,
            product_id,
            quantity_requested,
            quantity_accepted: None,
            quantity_registered: None,
            finance_review: FinanceReview::Pending,
            buying_price: None,
            selling_price: None,
            verified_by: None,
            verified_at: None,
            approved_by: None,
            approved_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn stage(&self) -> ItemStage {
        if self.is_approved() {
            ItemStage::Approved
        } else if self.is_verified() {
            ItemStage::Verified
        } else if self.registered() > 0 {
            ItemStage::Registered
        } else if self.quantity_accepted.is_some() {
            ItemStage::Accepted
        } else {
            ItemStage::Requested
        }
    }

    pub fn registered(&self) -> i64 {
        self.quantity_registered.unwrap_or(0)
    }

    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    pub fn is_verified(&self) -> bool {
        self.finance_review == FinanceReview::Verified
    }

    /// Accepted quantity was set to zero by the reviewer
    pub fn is_rejected(&self) -> bool {
        self.quantity_accepted == Some(0)
    }

    /// Active and not rejected; only live items gate order completion
    pub fn is_live(&self) -> bool {
        self.is_active && !self.is_rejected()
    }

    pub fn is_fully_registered(&self) -> bool {
        match self.quantity_accepted {
            Some(accepted) => self.registered() >= accepted,
            None => false,
        }
    }

    // ========================================================================
    // Forward progression
    // ========================================================================

    /// Record the reviewer's accepted quantity (first acceptance only)
    pub fn accept(&mut self, quantity: i64) -> WorkflowResult<()> {
        if self.stage() > ItemStage::Requested {
            return Err(WorkflowError::state(format!(
                "item {} has already been accepted",
                self.id
            )));
        }
        self.check_accepted_bound(quantity)?;
        self.quantity_accepted = Some(quantity);
        self.touch();
        Ok(())
    }

    /// Add a delivery to the accumulated registered quantity
    pub fn register(&mut self, delta: i64) -> WorkflowResult<()> {
        let accepted = match (self.stage(), self.quantity_accepted) {
            (ItemStage::Approved, _) => {
                return Err(WorkflowError::state(format!(
                    "item {} is already approved",
                    self.id
                )))
            }
            (_, Some(accepted)) => accepted,
            (_, None) => {
                return Err(WorkflowError::state(format!(
                    "item {} has not been accepted",
                    self.id
                )))
            }
        };
        if delta <= 0 {
            return Err(WorkflowError::range(
                "quantity_registered",
                "registered quantity must be positive",
            ));
        }
        let total = self.registered().checked_add(delta).ok_or_else(|| {
            WorkflowError::range("quantity_registered", "registered quantity overflow")
        })?;
        if total > accepted {
            return Err(WorkflowError::range(
                "quantity_registered",
                format!(
                    "item {} would have {} registered, exceeding the accepted {}",
                    self.id, total, accepted
                ),
            ));
        }
        self.quantity_registered = Some(total);
        self.touch();
        Ok(())
    }

    /// Mark finance-verified with the resolved price pair
    pub fn verify(
        &mut self,
        buying_price: Decimal,
        selling_price: Decimal,
        actor_id: Uuid,
    ) -> WorkflowResult<()> {
        match self.stage() {
            ItemStage::Approved => {
                return Err(WorkflowError::state(format!(
                    "item {} is already approved",
                    self.id
                )))
            }
            ItemStage::Requested | ItemStage::Accepted => {
                return Err(WorkflowError::state(format!(
                    "item {} has nothing registered to verify",
                    self.id
                )))
            }
            ItemStage::Registered | ItemStage::Verified => {}
        }
        validate_price_pair(buying_price, selling_price)?;
        self.finance_review = FinanceReview::Verified;
        self.buying_price = Some(buying_price);
        self.selling_price = Some(selling_price);
        self.stamp_review(actor_id);
        Ok(())
    }

    /// Mark declined by finance; prices are left untouched.
    /// A verified item stays verified; its prices change through `edit_prices`.
    pub fn decline(&mut self, actor_id: Uuid) -> WorkflowResult<()> {
        match self.stage() {
            ItemStage::Approved => {
                return Err(WorkflowError::state(format!(
                    "item {} is already approved",
                    self.id
                )))
            }
            ItemStage::Verified => {
                return Err(WorkflowError::state(format!(
                    "item {} is already finance-verified",
                    self.id
                )))
            }
            ItemStage::Requested | ItemStage::Accepted => {
                return Err(WorkflowError::state(format!(
                    "item {} has nothing registered to review",
                    self.id
                )))
            }
            ItemStage::Registered => {}
        }
        self.finance_review = FinanceReview::Declined;
        self.stamp_review(actor_id);
        Ok(())
    }

    /// Final approval; one-way
    pub fn approve(&mut self, actor_id: Uuid) -> WorkflowResult<()> {
        match self.stage() {
            ItemStage::Approved => {
                return Err(WorkflowError::state(format!(
                    "item {} is already approved",
                    self.id
                )))
            }
            ItemStage::Verified => {}
            _ => {
                return Err(WorkflowError::state(format!(
                    "item {} has not been finance-verified",
                    self.id
                )))
            }
        }
        if !self.is_fully_registered() {
            return Err(WorkflowError::state(format!(
                "item {} is under-delivered: {} of {} registered",
                self.id,
                self.registered(),
                self.quantity_accepted.unwrap_or(0)
            )));
        }
        let now = Utc::now();
        self.approved_by = Some(actor_id);
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Zero the accepted quantity of a line nothing has been delivered for
    pub fn reject(&mut self) -> WorkflowResult<()> {
        if self.stage() >= ItemStage::Registered {
            return Err(WorkflowError::state(format!(
                "item {} already has deliveries registered",
                self.id
            )));
        }
        self.quantity_accepted = Some(0);
        self.touch();
        Ok(())
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    // ========================================================================
    // Bounded edits
    // ========================================================================

    pub fn edit_requested(&mut self, quantity: i64) -> WorkflowResult<()> {
        if self.stage() > ItemStage::Requested {
            return Err(WorkflowError::state(format!(
                "item {} has already been reviewed",
                self.id
            )));
        }
        if quantity <= 0 {
            return Err(WorkflowError::range(
                "quantity_requested",
                "requested quantity must be positive",
            ));
        }
        self.quantity_requested = quantity;
        self.touch();
        Ok(())
    }

    pub fn edit_accepted(&mut self, quantity: i64) -> WorkflowResult<()> {
        match self.stage() {
            ItemStage::Requested => {
                return Err(WorkflowError::state(format!(
                    "item {} has not been accepted yet",
                    self.id
                )))
            }
            ItemStage::Accepted => {}
            _ => {
                return Err(WorkflowError::state(format!(
                    "item {} already has deliveries registered",
                    self.id
                )))
            }
        }
        self.check_accepted_bound(quantity)?;
        self.quantity_accepted = Some(quantity);
        self.touch();
        Ok(())
    }

    /// Overwrite (not accumulate) the registered quantity
    pub fn edit_registered(&mut self, quantity: i64) -> WorkflowResult<()> {
        let accepted = match (self.stage(), self.quantity_accepted) {
            (ItemStage::Approved, _) => {
                return Err(WorkflowError::state(format!(
                    "item {} is already approved",
                    self.id
                )))
            }
            (ItemStage::Verified, _) => {
                return Err(WorkflowError::state(format!(
                    "item {} is already finance-verified",
                    self.id
                )))
            }
            (_, Some(accepted)) => accepted,
            (_, None) => {
                return Err(WorkflowError::state(format!(
                    "item {} has not been accepted",
                    self.id
                )))
            }
        };
        if quantity < 0 || quantity > accepted {
            return Err(WorkflowError::range(
                "quantity_registered",
                format!("registered quantity must be between 0 and {}", accepted),
            ));
        }
        self.quantity_registered = Some(quantity);
        self.touch();
        Ok(())
    }

    pub fn edit_prices(
        &mut self,
        buying_price: Decimal,
        selling_price: Decimal,
    ) -> WorkflowResult<()> {
        match self.stage() {
            ItemStage::Approved => {
                return Err(WorkflowError::state(format!(
                    "item {} is already approved; its prices are final",
                    self.id
                )))
            }
            ItemStage::Verified => {}
            _ => {
                return Err(WorkflowError::state(format!(
                    "item {} has not been finance-verified",
                    self.id
                )))
            }
        }
        validate_price_pair(buying_price, selling_price)?;
        self.buying_price = Some(buying_price);
        self.selling_price = Some(selling_price);
        self.touch();
        Ok(())
    }

    fn check_accepted_bound(&self, quantity: i64) -> WorkflowResult<()> {
        if quantity < 0 || quantity > self.quantity_requested {
            return Err(WorkflowError::range(
                "quantity_accepted",
                format!(
                    "accepted quantity for item {} must be between 0 and {}",
                    self.id, self.quantity_requested
                ),
            ));
        }
        Ok(())
    }

    fn stamp_review(&mut self, actor_id: Uuid) {
        let now = Utc::now();
        self.verified_by = Some(actor_id);
        self.verified_at = Some(now);
        self.updated_at = now;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

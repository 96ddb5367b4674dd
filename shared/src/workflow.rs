//! Purchase order approval workflow
//!
//! [`PurchaseOrderAggregate`] is the unit every operation loads, mutates and
//! saves as a whole. Operations check the actor's capability, validate the
//! full request against a scratch copy of the items, and only then replace
//! the live items and re-derive the header status, so a failed operation
//! leaves the aggregate untouched.
//!
//! Each successful operation returns a [`Transition`]: the trail entries to
//! append and, for final approval, the stock receipts to book in the ledger.

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    derive_status, Actor, Capability, HistoryAction, HistoryEntry, PurchaseOrder,
    PurchaseOrderItem, PurchaseOrderStatus, Role,
};
use crate::validation::{ensure_unique_ids, resolve_selling_price, validate_requested_quantity};

/// Statuses in which deliveries can be registered
pub const REGISTRATION_OPEN: [PurchaseOrderStatus; 6] = [
    PurchaseOrderStatus::AcceptedByAdmin,
    PurchaseOrderStatus::PartiallyRegistered,
    PurchaseOrderStatus::CompletelyRegistered,
    PurchaseOrderStatus::PartiallyFinanceProcessed,
    PurchaseOrderStatus::FullyFinanceProcessed,
    PurchaseOrderStatus::PartiallyApproved,
];

/// The three earliest statuses; reject and cancel are only legal here
pub const EARLY_STATUSES: [PurchaseOrderStatus; 3] = [
    PurchaseOrderStatus::PendingAdminAcceptance,
    PurchaseOrderStatus::AcceptedByAdmin,
    PurchaseOrderStatus::PartiallyRegistered,
];

// ============================================================================
// Inputs
// ============================================================================

/// One requested product line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedLine {
    pub product_id: Uuid,
    pub quantity: i64,
}

/// Input for creating a purchase order
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderInput {
    pub branch_id: Uuid,
    #[validate(length(min = 1))]
    pub items: Vec<RequestedLine>,
}

/// A quantity for one existing item (accept, register, edits)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityLine {
    pub item_id: Uuid,
    pub quantity: i64,
}

/// Finance decision for one item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyLine {
    pub item_id: Uuid,
    pub verify: bool,
    pub buying_price: Option<Decimal>,
    /// Derived from the markup when omitted
    pub selling_price: Option<Decimal>,
}

/// Price correction for one verified item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLine {
    pub item_id: Uuid,
    pub buying_price: Decimal,
    pub selling_price: Option<Decimal>,
}

/// Which of the collaborator references were found active
#[derive(Debug, Clone, Default)]
pub struct ActiveReferences {
    pub branch_active: bool,
    pub active_products: HashSet<Uuid>,
}

// ============================================================================
// Outputs
// ============================================================================

/// Stock to book for one approved item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReceipt {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub quantity: i64,
    pub buying_price: Decimal,
    pub selling_price: Decimal,
}

/// Side effects produced by one successful operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub history: Vec<HistoryEntry>,
    pub receipts: Vec<StockReceipt>,
    /// Set only by the hard-delete path
    pub removed_item_id: Option<Uuid>,
}

impl Transition {
    fn with_history(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            ..Default::default()
        }
    }
}

/// Purchase order header together with all of its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderAggregate {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

impl PurchaseOrderAggregate {
    /// Submit a new order in `PendingAdminAcceptance`
    pub fn create(
        actor: &Actor,
        input: &CreatePurchaseOrderInput,
        references: &ActiveReferences,
    ) -> WorkflowResult<(Self, Transition)> {
        actor.require(Capability::RequestStock)?;

        if input.items.is_empty() {
            return Err(WorkflowError::validation(
                "items",
                "an order needs at least one item",
            ));
        }
        if !references.branch_active {
            return Err(WorkflowError::validation(
                "branch_id",
                format!("branch {} does not exist or is inactive", input.branch_id),
            ));
        }
        ensure_unique_ids(input.items.iter().map(|l| &l.product_id), "product_id")?;
        for line in &input.items {
            if !references.active_products.contains(&line.product_id) {
                return Err(WorkflowError::validation(
                    "product_id",
                    format!("product {} does not exist or is inactive", line.product_id),
                ));
            }
            validate_requested_quantity(line.quantity)?;
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let items: Vec<PurchaseOrderItem> = input
            .items
            .iter()
            .map(|line| PurchaseOrderItem::new(order_id, line.product_id, line.quantity))
            .collect();
        let order = PurchaseOrder {
            id: order_id,
            branch_id: input.branch_id,
            created_by: actor.user_id,
            status: derive_status(&items),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let history = vec![HistoryEntry::for_order(
            order_id,
            HistoryAction::Created,
            actor.user_id,
            format!("order created with {} item(s)", items.len()),
        )];

        Ok((Self { order, items }, Transition::with_history(history)))
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.order.status
    }

    /// Active item by id
    pub fn item(&self, item_id: Uuid) -> WorkflowResult<&PurchaseOrderItem> {
        self.items
            .iter()
            .find(|i| i.id == item_id && i.is_active)
            .ok_or_else(|| WorkflowError::NotFound(format!("Purchase order item {}", item_id)))
    }

    // ========================================================================
    // Five main stages
    // ========================================================================

    /// Record the admin's accepted quantity for every active item.
    ///
    /// Lines already rejected at zero need no entry; if one is listed its
    /// quantity must be zero.
    pub fn accept_quantities(
        &mut self,
        actor: &Actor,
        lines: &[QuantityLine],
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::ReviewOrder)?;
        self.ensure_status(&[PurchaseOrderStatus::PendingAdminAcceptance], "accept quantities")?;
        check_lines(lines.iter().map(|l| &l.item_id))?;

        let mut items = self.items.clone();
        for line in lines {
            position(&items, line.item_id)?;
        }
        let mut history = Vec::with_capacity(lines.len());
        for item in items.iter_mut().filter(|i| i.is_active) {
            let line = lines.iter().find(|l| l.item_id == item.id);
            if item.is_rejected() {
                match line {
                    Some(l) if l.quantity != 0 => {
                        return Err(WorkflowError::state(format!(
                            "item {} has been rejected; restore it with an accepted-quantity edit",
                            item.id
                        )))
                    }
                    _ => continue,
                }
            }
            let line = line.ok_or_else(|| {
                WorkflowError::validation(
                    "items",
                    format!("no accepted quantity given for item {}", item.id),
                )
            })?;
            item.accept(line.quantity)?;
            history.push(HistoryEntry::for_item(
                self.order.id,
                item.id,
                HistoryAction::QuantityAccepted,
                actor.user_id,
                format!("accepted {} of {}", line.quantity, item.quantity_requested),
            ));
        }

        self.commit(items);
        if self.order.status == PurchaseOrderStatus::Rejected {
            history.push(HistoryEntry::for_order(
                self.order.id,
                HistoryAction::Rejected,
                actor.user_id,
                "every item accepted at zero",
            ));
        }
        Ok(Transition::with_history(history))
    }

    /// Add delivered quantities; repeated calls accumulate
    pub fn register_received(
        &mut self,
        actor: &Actor,
        lines: &[QuantityLine],
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::ReceiveStock)?;
        self.ensure_status(&REGISTRATION_OPEN, "register deliveries")?;
        check_lines(lines.iter().map(|l| &l.item_id))?;

        let mut items = self.items.clone();
        let mut history = Vec::with_capacity(lines.len());
        for line in lines {
            let item = &mut items[position(&self.items, line.item_id)?];
            item.register(line.quantity)?;
            history.push(HistoryEntry::for_item(
                self.order.id,
                item.id,
                HistoryAction::Registered,
                actor.user_id,
                format!(
                    "received {}, {} of {} registered",
                    line.quantity,
                    item.registered(),
                    item.quantity_accepted.unwrap_or(0)
                ),
            ));
        }

        self.commit(items);
        Ok(Transition::with_history(history))
    }

    /// Finance review: price verified items, decline the rest
    pub fn verify_finance(
        &mut self,
        actor: &Actor,
        lines: &[VerifyLine],
        markup_percent: Decimal,
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::VerifyFinance)?;
        self.ensure_open()?;
        let reviewable = self
            .active_items()
            .any(|i| i.registered() > 0 && !i.is_approved());
        if !reviewable {
            return Err(WorkflowError::state(
                "no registered, unapproved item is awaiting finance review",
            ));
        }
        check_lines(lines.iter().map(|l| &l.item_id))?;

        let mut items = self.items.clone();
        let mut history = Vec::with_capacity(lines.len());
        for line in lines {
            let item = &mut items[position(&self.items, line.item_id)?];
            if line.verify {
                let buying = line.buying_price.ok_or_else(|| {
                    WorkflowError::validation(
                        "buying_price",
                        format!("buying price is required to verify item {}", item.id),
                    )
                })?;
                let selling = resolve_selling_price(buying, line.selling_price, markup_percent)?;
                item.verify(buying, selling, actor.user_id)?;
                history.push(HistoryEntry::for_item(
                    self.order.id,
                    item.id,
                    HistoryAction::FinanceVerified,
                    actor.user_id,
                    format!("buying {} selling {}", buying, selling),
                ));
            } else {
                item.decline(actor.user_id)?;
                history.push(HistoryEntry::for_item(
                    self.order.id,
                    item.id,
                    HistoryAction::FinanceDeclined,
                    actor.user_id,
                    "declined by finance",
                ));
            }
        }

        self.commit(items);
        Ok(Transition::with_history(history))
    }

    /// Final approval of verified, fully delivered items.
    ///
    /// With `item_ids` every listed item must be verified and unapproved;
    /// without, every verified item that is fully delivered is approved.
    pub fn approve_final(
        &mut self,
        actor: &Actor,
        item_ids: Option<&[Uuid]>,
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::ApproveOrder)?;
        self.ensure_open()?;
        let awaiting = self
            .active_items()
            .any(|i| i.is_verified() && !i.is_approved());
        if !awaiting {
            return Err(WorkflowError::state(
                "no finance-verified item is awaiting approval",
            ));
        }

        let selected: Vec<Uuid> = match item_ids {
            Some(ids) => {
                check_lines(ids.iter())?;
                for id in ids {
                    let item = self.item(*id)?;
                    if !item.is_verified() || item.is_approved() {
                        return Err(WorkflowError::state(format!(
                            "item {} is not awaiting approval",
                            id
                        )));
                    }
                }
                ids.to_vec()
            }
            None => self
                .active_items()
                .filter(|i| i.is_verified() && !i.is_approved() && i.is_fully_registered())
                .map(|i| i.id)
                .collect(),
        };
        if selected.is_empty() {
            return Err(WorkflowError::state(
                "no verified item has been fully delivered",
            ));
        }

        let mut items = self.items.clone();
        let mut transition = Transition::default();
        for id in &selected {
            let item = &mut items[position(&self.items, *id)?];
            item.approve(actor.user_id)?;
            let (Some(buying_price), Some(selling_price)) = (item.buying_price, item.selling_price)
            else {
                return Err(WorkflowError::state(format!(
                    "item {} was verified without prices",
                    item.id
                )));
            };
            transition.receipts.push(StockReceipt {
                item_id: item.id,
                product_id: item.product_id,
                branch_id: self.order.branch_id,
                quantity: item.registered(),
                buying_price,
                selling_price,
            });
            transition.history.push(HistoryEntry::for_item(
                self.order.id,
                item.id,
                HistoryAction::Approved,
                actor.user_id,
                format!(
                    "approved {} unit(s) at buying {} selling {}",
                    item.registered(),
                    buying_price,
                    selling_price
                ),
            ));
        }

        self.commit(items);
        Ok(transition)
    }

    // ========================================================================
    // Reversal paths
    // ========================================================================

    /// Reject the listed items, or the whole order when `item_ids` is `None`
    pub fn reject(&mut self, actor: &Actor, item_ids: Option<&[Uuid]>) -> WorkflowResult<Transition> {
        actor.require(Capability::ReviewOrder)?;
        self.ensure_status(&EARLY_STATUSES, "reject")?;

        let Some(ids) = item_ids else {
            self.order.status = PurchaseOrderStatus::Rejected;
            self.order.updated_at = Utc::now();
            return Ok(Transition::with_history(vec![HistoryEntry::for_order(
                self.order.id,
                HistoryAction::Rejected,
                actor.user_id,
                "order rejected",
            )]));
        };

        check_lines(ids.iter())?;
        let mut items = self.items.clone();
        let mut history = Vec::with_capacity(ids.len());
        for id in ids {
            let item = &mut items[position(&self.items, *id)?];
            item.reject()?;
            history.push(HistoryEntry::for_item(
                self.order.id,
                item.id,
                HistoryAction::ItemRejected,
                actor.user_id,
                "accepted quantity set to zero",
            ));
        }

        self.commit(items);
        if self.order.status == PurchaseOrderStatus::Rejected {
            history.push(HistoryEntry::for_order(
                self.order.id,
                HistoryAction::Rejected,
                actor.user_id,
                "every item rejected",
            ));
        }
        Ok(Transition::with_history(history))
    }

    /// Soft-delete the order and its items
    pub fn cancel(&mut self, actor: &Actor) -> WorkflowResult<Transition> {
        actor.require(Capability::CancelOrder)?;
        self.ensure_owner_or_admin(actor)?;
        self.ensure_status(&EARLY_STATUSES, "cancel")?;

        for item in self.items.iter_mut() {
            item.deactivate();
        }
        self.order.is_active = false;
        self.order.status = PurchaseOrderStatus::Cancelled;
        self.order.updated_at = Utc::now();

        Ok(Transition::with_history(vec![HistoryEntry::for_order(
            self.order.id,
            HistoryAction::Cancelled,
            actor.user_id,
            "order cancelled",
        )]))
    }

    // ========================================================================
    // Bounded edits
    // ========================================================================

    pub fn edit_requested_quantities(
        &mut self,
        actor: &Actor,
        lines: &[QuantityLine],
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::RequestStock)?;
        self.ensure_owner_or_admin(actor)?;
        self.ensure_status(
            &[PurchaseOrderStatus::PendingAdminAcceptance],
            "edit requested quantities",
        )?;
        self.edit_quantities(actor, lines, HistoryAction::RequestedEdited, |item, q| {
            let before = item.quantity_requested;
            item.edit_requested(q)?;
            Ok(format!("requested {} -> {}", before, q))
        })
    }

    /// Refused once any delivery has been registered on the order
    pub fn edit_accepted_quantities(
        &mut self,
        actor: &Actor,
        lines: &[QuantityLine],
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::ReviewOrder)?;
        self.ensure_open()?;
        if self.active_items().any(|i| i.registered() > 0) {
            return Err(WorkflowError::state(
                "accepted quantities are locked once deliveries are registered",
            ));
        }
        self.ensure_status(
            &[PurchaseOrderStatus::AcceptedByAdmin],
            "edit accepted quantities",
        )?;
        let mut transition =
            self.edit_quantities(actor, lines, HistoryAction::AcceptedEdited, |item, q| {
                let before = item.quantity_accepted.unwrap_or(0);
                item.edit_accepted(q)?;
                Ok(format!("accepted {} -> {}", before, q))
            })?;
        if self.order.status == PurchaseOrderStatus::Rejected {
            transition.history.push(HistoryEntry::for_order(
                self.order.id,
                HistoryAction::Rejected,
                actor.user_id,
                "every item accepted at zero",
            ));
        }
        Ok(transition)
    }

    /// Refused once any item on the order is finance-verified
    pub fn edit_registered_quantities(
        &mut self,
        actor: &Actor,
        lines: &[QuantityLine],
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::ReceiveStock)?;
        self.ensure_open()?;
        if self.active_items().any(|i| i.is_verified()) {
            return Err(WorkflowError::state(
                "registered quantities are locked once finance has verified an item",
            ));
        }
        self.ensure_status(&REGISTRATION_OPEN, "edit registered quantities")?;
        self.edit_quantities(actor, lines, HistoryAction::RegisteredEdited, |item, q| {
            let before = item.registered();
            item.edit_registered(q)?;
            Ok(format!("registered {} -> {}", before, q))
        })
    }

    /// Correct prices of verified, unapproved items
    pub fn edit_prices(
        &mut self,
        actor: &Actor,
        lines: &[PriceLine],
        markup_percent: Decimal,
    ) -> WorkflowResult<Transition> {
        actor.require(Capability::VerifyFinance)?;
        if self.order.status == PurchaseOrderStatus::FullyApproved {
            return Err(WorkflowError::state(
                "prices are final once the order is fully approved",
            ));
        }
        self.ensure_open()?;
        check_lines(lines.iter().map(|l| &l.item_id))?;

        let mut items = self.items.clone();
        let mut history = Vec::with_capacity(lines.len());
        for line in lines {
            let item = &mut items[position(&self.items, line.item_id)?];
            let selling =
                resolve_selling_price(line.buying_price, line.selling_price, markup_percent)?;
            item.edit_prices(line.buying_price, selling)?;
            history.push(HistoryEntry::for_item(
                self.order.id,
                item.id,
                HistoryAction::PricesEdited,
                actor.user_id,
                format!("buying {} selling {}", line.buying_price, selling),
            ));
        }

        self.commit(items);
        Ok(Transition::with_history(history))
    }

    /// Hard-delete one unreviewed line while the order is still pending
    pub fn remove_item(&mut self, actor: &Actor, item_id: Uuid) -> WorkflowResult<Transition> {
        actor.require(Capability::RequestStock)?;
        self.ensure_owner_or_admin(actor)?;
        self.ensure_status(&[PurchaseOrderStatus::PendingAdminAcceptance], "remove an item")?;

        let index = position(&self.items, item_id)?;
        if self.items[index].quantity_accepted.is_some() {
            return Err(WorkflowError::state(format!(
                "item {} has already been reviewed",
                item_id
            )));
        }
        if self.active_items().count() <= 1 {
            return Err(WorkflowError::state(
                "cannot remove the last item; cancel the order instead",
            ));
        }

        let mut items = self.items.clone();
        let removed = items.remove(index);
        self.commit(items);

        Ok(Transition {
            history: vec![HistoryEntry::for_order(
                self.order.id,
                HistoryAction::ItemRemoved,
                actor.user_id,
                format!(
                    "removed item {} for product {}",
                    removed.id, removed.product_id
                ),
            )],
            receipts: Vec::new(),
            removed_item_id: Some(removed.id),
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn active_items(&self) -> impl Iterator<Item = &PurchaseOrderItem> {
        self.items.iter().filter(|i| i.is_active)
    }

    fn ensure_open(&self) -> WorkflowResult<()> {
        if self.order.status.is_terminal() {
            return Err(WorkflowError::state(format!(
                "order {} is {}",
                self.order.id, self.order.status
            )));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[PurchaseOrderStatus], operation: &str) -> WorkflowResult<()> {
        self.ensure_open()?;
        if !allowed.contains(&self.order.status) {
            return Err(WorkflowError::state(format!(
                "cannot {} while order is {}",
                operation, self.order.status
            )));
        }
        Ok(())
    }

    fn ensure_owner_or_admin(&self, actor: &Actor) -> WorkflowResult<()> {
        if actor.role == Role::Admin || actor.user_id == self.order.created_by {
            Ok(())
        } else {
            Err(WorkflowError::Authorization(
                "only the order's creator or an admin may do this".to_string(),
            ))
        }
    }

    fn edit_quantities<F>(
        &mut self,
        actor: &Actor,
        lines: &[QuantityLine],
        action: HistoryAction,
        mut apply: F,
    ) -> WorkflowResult<Transition>
    where
        F: FnMut(&mut PurchaseOrderItem, i64) -> WorkflowResult<String>,
    {
        check_lines(lines.iter().map(|l| &l.item_id))?;

        let mut items = self.items.clone();
        let mut history = Vec::with_capacity(lines.len());
        for line in lines {
            let item = &mut items[position(&self.items, line.item_id)?];
            let detail = apply(item, line.quantity)?;
            history.push(HistoryEntry::for_item(
                self.order.id,
                item.id,
                action,
                actor.user_id,
                detail,
            ));
        }

        self.commit(items);
        Ok(Transition::with_history(history))
    }

    /// Install validated items and re-derive the header status
    fn commit(&mut self, items: Vec<PurchaseOrderItem>) {
        self.items = items;
        self.order.status = derive_status(&self.items);
        self.order.updated_at = Utc::now();
    }
}

/// Index of an active item
fn position(items: &[PurchaseOrderItem], item_id: Uuid) -> WorkflowResult<usize> {
    items
        .iter()
        .position(|i| i.id == item_id && i.is_active)
        .ok_or_else(|| WorkflowError::NotFound(format!("Purchase order item {}", item_id)))
}

/// Line lists must be non-empty and name each item once
fn check_lines<'a, I>(ids: I) -> WorkflowResult<()>
where
    I: IntoIterator<Item = &'a Uuid>,
{
    let ids: Vec<&Uuid> = ids.into_iter().collect();
    if ids.is_empty() {
        return Err(WorkflowError::validation("items", "no items given"));
    }
    ensure_unique_ids(ids, "item_id")
}

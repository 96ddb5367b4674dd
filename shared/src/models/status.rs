//! Purchase order status derivation
//!
//! The header status is a pure function of the item collection. Rules are
//! evaluated top to bottom and the first match wins, so approval progress
//! dominates finance progress, which dominates registration, which
//! dominates acceptance.

use super::purchase_order::{PurchaseOrderItem, PurchaseOrderStatus};

/// Aggregated facts about an item collection that the rules inspect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFacts {
    pub active: usize,
    pub rejected: usize,
    pub live: usize,
    pub live_approved: usize,
    pub any_approved: bool,
    pub live_verified: usize,
    pub live_verified_and_registered: usize,
    pub live_fully_registered: usize,
    pub any_registered: bool,
    pub accepted: usize,
}

impl ItemFacts {
    pub fn collect(items: &[PurchaseOrderItem]) -> Self {
        let mut facts = ItemFacts::default();
        for item in items.iter().filter(|i| i.is_active) {
            facts.active += 1;
            if item.quantity_accepted.is_some() {
                facts.accepted += 1;
            }
            if item.is_rejected() {
                facts.rejected += 1;
            }
            if item.is_approved() {
                facts.any_approved = true;
            }
            if item.registered() > 0 {
                facts.any_registered = true;
            }
            if !item.is_live() {
                continue;
            }
            facts.live += 1;
            if item.is_approved() {
                facts.live_approved += 1;
            }
            if item.is_verified() {
                facts.live_verified += 1;
                if item.is_fully_registered() {
                    facts.live_verified_and_registered += 1;
                }
            }
            if item.is_fully_registered() {
                facts.live_fully_registered += 1;
            }
        }
        facts
    }
}

/// One row of the priority table
pub struct StatusRule {
    pub status: PurchaseOrderStatus,
    pub applies: fn(&ItemFacts) -> bool,
}

/// Priority-ordered rule table; first match wins
pub const STATUS_RULES: [StatusRule; 10] = [
    StatusRule {
        status: PurchaseOrderStatus::Cancelled,
        applies: |f| f.active == 0,
    },
    StatusRule {
        status: PurchaseOrderStatus::Rejected,
        applies: |f| f.rejected == f.active,
    },
    StatusRule {
        status: PurchaseOrderStatus::FullyApproved,
        applies: |f| f.live_approved == f.live,
    },
    StatusRule {
        status: PurchaseOrderStatus::PartiallyApproved,
        applies: |f| f.any_approved,
    },
    StatusRule {
        status: PurchaseOrderStatus::FullyFinanceProcessed,
        applies: |f| f.live_verified_and_registered == f.live,
    },
    StatusRule {
        status: PurchaseOrderStatus::PartiallyFinanceProcessed,
        applies: |f| f.live_verified > 0,
    },
    StatusRule {
        status: PurchaseOrderStatus::CompletelyRegistered,
        applies: |f| f.live_fully_registered == f.live,
    },
    StatusRule {
        status: PurchaseOrderStatus::PartiallyRegistered,
        applies: |f| f.any_registered,
    },
    StatusRule {
        status: PurchaseOrderStatus::AcceptedByAdmin,
        applies: |f| f.accepted == f.active,
    },
    StatusRule {
        status: PurchaseOrderStatus::PendingAdminAcceptance,
        applies: |_| true,
    },
];

/// Derive the aggregate status from item facts
pub fn status_from_facts(facts: &ItemFacts) -> PurchaseOrderStatus {
    STATUS_RULES
        .iter()
        .find(|rule| (rule.applies)(facts))
        .map(|rule| rule.status)
        .unwrap_or(PurchaseOrderStatus::PendingAdminAcceptance)
}

/// Derive the aggregate status from the items of an order
pub fn derive_status(items: &[PurchaseOrderItem]) -> PurchaseOrderStatus {
    status_from_facts(&ItemFacts::collect(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn item(requested: i64) -> PurchaseOrderItem {
        PurchaseOrderItem::new(Uuid::new_v4(), Uuid::new_v4(), requested)
    }

    fn verified(requested: i64, registered: i64) -> PurchaseOrderItem {
        let mut i = item(requested);
        i.accept(requested).unwrap();
        i.register(registered).unwrap();
        i.verify(Decimal::from(10), Decimal::from(13), Uuid::new_v4())
            .unwrap();
        i
    }

    #[test]
    fn test_fresh_items_pending() {
        assert_eq!(
            derive_status(&[item(5), item(3)]),
            PurchaseOrderStatus::PendingAdminAcceptance
        );
    }

    #[test]
    fn test_all_inactive_cancelled() {
        let mut a = item(5);
        a.deactivate();
        assert_eq!(derive_status(&[a]), PurchaseOrderStatus::Cancelled);
    }

    #[test]
    fn test_all_zero_accepted_rejected() {
        let mut a = item(5);
        let mut b = item(3);
        a.accept(0).unwrap();
        b.accept(0).unwrap();
        assert_eq!(derive_status(&[a, b]), PurchaseOrderStatus::Rejected);
    }

    #[test]
    fn test_partial_acceptance_stays_pending() {
        let mut a = item(5);
        a.accept(5).unwrap();
        assert_eq!(
            derive_status(&[a, item(3)]),
            PurchaseOrderStatus::PendingAdminAcceptance
        );
    }

    #[test]
    fn test_rejected_line_does_not_block_completion() {
        let mut a = item(5);
        a.accept(5).unwrap();
        a.register(5).unwrap();
        let mut b = item(3);
        b.accept(0).unwrap();
        assert_eq!(
            derive_status(&[a, b]),
            PurchaseOrderStatus::CompletelyRegistered
        );
    }

    #[test]
    fn test_finance_dominates_registration() {
        let mut b = item(3);
        b.accept(3).unwrap();
        assert_eq!(
            derive_status(&[verified(5, 2), b.clone()]),
            PurchaseOrderStatus::PartiallyFinanceProcessed
        );

        // all verified but one under-delivered is still partial
        assert_eq!(
            derive_status(&[verified(5, 2), verified(3, 3)]),
            PurchaseOrderStatus::PartiallyFinanceProcessed
        );
        assert_eq!(
            derive_status(&[verified(5, 5), verified(3, 3)]),
            PurchaseOrderStatus::FullyFinanceProcessed
        );
    }

    #[test]
    fn test_any_approval_dominates() {
        let mut a = verified(5, 5);
        a.approve(Uuid::new_v4()).unwrap();
        let mut b = item(3);
        b.accept(3).unwrap();
        assert_eq!(
            derive_status(&[a.clone(), b]),
            PurchaseOrderStatus::PartiallyApproved
        );
        assert_eq!(derive_status(&[a]), PurchaseOrderStatus::FullyApproved);
    }

    #[test]
    fn test_rule_table_ends_with_catch_all() {
        let last = STATUS_RULES.last().unwrap();
        assert_eq!(last.status, PurchaseOrderStatus::PendingAdminAcceptance);
        assert!((last.applies)(&ItemFacts::default()));
    }
}

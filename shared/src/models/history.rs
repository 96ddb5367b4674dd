//! Purchase order audit trail models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action recorded in the trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    QuantityAccepted,
    Rejected,
    ItemRejected,
    Registered,
    FinanceVerified,
    FinanceDeclined,
    Approved,
    Cancelled,
    RequestedEdited,
    AcceptedEdited,
    RegisteredEdited,
    PricesEdited,
    ItemRemoved,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::QuantityAccepted => "quantity_accepted",
            HistoryAction::Rejected => "rejected",
            HistoryAction::ItemRejected => "item_rejected",
            HistoryAction::Registered => "registered",
            HistoryAction::FinanceVerified => "finance_verified",
            HistoryAction::FinanceDeclined => "finance_declined",
            HistoryAction::Approved => "approved",
            HistoryAction::Cancelled => "cancelled",
            HistoryAction::RequestedEdited => "requested_edited",
            HistoryAction::AcceptedEdited => "accepted_edited",
            HistoryAction::RegisteredEdited => "registered_edited",
            HistoryAction::PricesEdited => "prices_edited",
            HistoryAction::ItemRemoved => "item_removed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(HistoryAction::Created),
            "quantity_accepted" => Some(HistoryAction::QuantityAccepted),
            "rejected" => Some(HistoryAction::Rejected),
            "item_rejected" => Some(HistoryAction::ItemRejected),
            "registered" => Some(HistoryAction::Registered),
            "finance_verified" => Some(HistoryAction::FinanceVerified),
            "finance_declined" => Some(HistoryAction::FinanceDeclined),
            "approved" => Some(HistoryAction::Approved),
            "cancelled" => Some(HistoryAction::Cancelled),
            "requested_edited" => Some(HistoryAction::RequestedEdited),
            "accepted_edited" => Some(HistoryAction::AcceptedEdited),
            "registered_edited" => Some(HistoryAction::RegisteredEdited),
            "prices_edited" => Some(HistoryAction::PricesEdited),
            "item_removed" => Some(HistoryAction::ItemRemoved),
            _ => None,
        }
    }
}

/// One append-only trail row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub item_id: Option<Uuid>,
    pub action: HistoryAction,
    pub actor_id: Uuid,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn for_order(
        purchase_order_id: Uuid,
        action: HistoryAction,
        actor_id: Uuid,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            purchase_order_id,
            item_id: None,
            action,
            actor_id,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }

    pub fn for_item(
        purchase_order_id: Uuid,
        item_id: Uuid,
        action: HistoryAction,
        actor_id: Uuid,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            item_id: Some(item_id),
            ..Self::for_order(purchase_order_id, action, actor_id, detail)
        }
    }
}

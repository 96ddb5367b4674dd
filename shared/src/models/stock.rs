//! Stock ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// Kind of inventory-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Purchase,
    Sale,
    Return,
    Adjustment,
    Damage,
    Transfer,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Purchase => "purchase",
            MovementKind::Sale => "sale",
            MovementKind::Return => "return",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Damage => "damage",
            MovementKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(MovementKind::Purchase),
            "sale" => Some(MovementKind::Sale),
            "return" => Some(MovementKind::Return),
            "adjustment" => Some(MovementKind::Adjustment),
            "damage" => Some(MovementKind::Damage),
            "transfer" => Some(MovementKind::Transfer),
            _ => None,
        }
    }

    /// Adjustment and transfer carry their sign in the magnitude
    pub fn is_signed(&self) -> bool {
        matches!(self, MovementKind::Adjustment | MovementKind::Transfer)
    }

    /// Signed change this movement applies to the running quantity
    pub fn effect(&self, magnitude: i64) -> i64 {
        match self {
            MovementKind::Purchase | MovementKind::Return => magnitude,
            MovementKind::Sale | MovementKind::Damage => -magnitude,
            MovementKind::Adjustment | MovementKind::Transfer => magnitude,
        }
    }

    /// Unsigned kinds need a positive magnitude, signed kinds a non-zero one
    pub fn validate_magnitude(&self, magnitude: i64) -> WorkflowResult<()> {
        if self.is_signed() {
            if magnitude == 0 {
                return Err(WorkflowError::range(
                    "magnitude",
                    format!("{} magnitude must not be zero", self.as_str()),
                ));
            }
        } else if magnitude <= 0 {
            return Err(WorkflowError::range(
                "magnitude",
                format!("{} magnitude must be positive", self.as_str()),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What caused a movement; a sale and a purchase order are mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MovementSource {
    Sale(Uuid),
    PurchaseOrder(Uuid),
}

impl MovementSource {
    /// Rebuild from the two nullable storage columns
    pub fn from_columns(
        sale_id: Option<Uuid>,
        purchase_order_id: Option<Uuid>,
    ) -> WorkflowResult<Option<Self>> {
        match (sale_id, purchase_order_id) {
            (None, None) => Ok(None),
            (Some(id), None) => Ok(Some(MovementSource::Sale(id))),
            (None, Some(id)) => Ok(Some(MovementSource::PurchaseOrder(id))),
            (Some(_), Some(_)) => Err(WorkflowError::validation(
                "source",
                "a movement cannot reference both a sale and a purchase order",
            )),
        }
    }

    pub fn sale_id(&self) -> Option<Uuid> {
        match self {
            MovementSource::Sale(id) => Some(*id),
            MovementSource::PurchaseOrder(_) => None,
        }
    }

    pub fn purchase_order_id(&self) -> Option<Uuid> {
        match self {
            MovementSource::PurchaseOrder(id) => Some(*id),
            MovementSource::Sale(_) => None,
        }
    }
}

/// A committed, immutable ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    /// Insertion order; breaks ties between movements with the same date
    pub sequence: i64,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub source: Option<MovementSource>,
    pub kind: MovementKind,
    pub magnitude: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub movement_date: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_by: Uuid,
    pub is_active: bool,
}

impl StockMovement {
    pub fn effect(&self) -> i64 {
        self.kind.effect(self.magnitude)
    }
}

/// Request to append one movement to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub kind: MovementKind,
    pub magnitude: i64,
    pub source: Option<MovementSource>,
    pub reason: Option<String>,
}

/// Cached current quantity for one (product, branch) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_signs() {
        assert_eq!(MovementKind::Purchase.effect(4), 4);
        assert_eq!(MovementKind::Return.effect(4), 4);
        assert_eq!(MovementKind::Sale.effect(4), -4);
        assert_eq!(MovementKind::Damage.effect(4), -4);
        assert_eq!(MovementKind::Adjustment.effect(-4), -4);
        assert_eq!(MovementKind::Adjustment.effect(4), 4);
        assert_eq!(MovementKind::Transfer.effect(-2), -2);
    }

    #[test]
    fn test_magnitude_rules() {
        assert!(MovementKind::Sale.validate_magnitude(1).is_ok());
        assert!(MovementKind::Sale.validate_magnitude(-1).is_err());
        assert!(MovementKind::Purchase.validate_magnitude(0).is_err());
        assert!(MovementKind::Adjustment.validate_magnitude(-3).is_ok());
        assert!(MovementKind::Transfer.validate_magnitude(0).is_err());
    }

    #[test]
    fn test_source_columns_are_exclusive() {
        let id = Uuid::new_v4();
        assert_eq!(
            MovementSource::from_columns(Some(id), None).unwrap(),
            Some(MovementSource::Sale(id))
        );
        assert_eq!(MovementSource::from_columns(None, None).unwrap(), None);
        assert!(MovementSource::from_columns(Some(id), Some(id)).is_err());

        let source = MovementSource::PurchaseOrder(id);
        assert_eq!(source.purchase_order_id(), Some(id));
        assert_eq!(source.sale_id(), None);
    }

    #[test]
    fn test_kind_names() {
        for kind in [
            MovementKind::Purchase,
            MovementKind::Sale,
            MovementKind::Return,
            MovementKind::Adjustment,
            MovementKind::Damage,
            MovementKind::Transfer,
        ] {
            assert_eq!(MovementKind::from_str(kind.as_str()), Some(kind));
        }
    }
}

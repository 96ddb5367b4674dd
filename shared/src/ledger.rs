//! Stock ledger arithmetic
//!
//! The movement log is the source of truth. The cached quantity and the
//! per-row `previous_quantity`/`new_quantity` snapshots are indexes over it:
//! point-in-time answers come from replaying the log, and the snapshot is
//! only a cross-check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{MovementKind, StockMovement};

/// Running quantity after applying one movement to `previous`
pub fn apply_movement(previous: i64, kind: MovementKind, magnitude: i64) -> WorkflowResult<i64> {
    kind.validate_magnitude(magnitude)?;
    previous
        .checked_add(kind.effect(magnitude))
        .ok_or_else(|| WorkflowError::range("magnitude", "stock quantity overflow"))
}

/// Active movements up to `as_of` (all when `None`), in ledger order:
/// movement date, then sequence
fn ordered_until(movements: &[StockMovement], as_of: Option<DateTime<Utc>>) -> Vec<&StockMovement> {
    let mut rows: Vec<&StockMovement> = movements
        .iter()
        .filter(|m| m.is_active && as_of.map_or(true, |limit| m.movement_date <= limit))
        .collect();
    rows.sort_by_key(|m| (m.movement_date, m.sequence));
    rows
}

/// Canonical point-in-time quantity: replay every effect from zero
pub fn replay_quantity(movements: &[StockMovement], as_of: DateTime<Utc>) -> i64 {
    ordered_until(movements, Some(as_of))
        .iter()
        .map(|m| m.effect())
        .sum()
}

/// Snapshot of the latest movement at or before `as_of`, zero if none
pub fn snapshot_quantity(movements: &[StockMovement], as_of: DateTime<Utc>) -> i64 {
    ordered_until(movements, Some(as_of))
        .last()
        .map(|m| m.new_quantity)
        .unwrap_or(0)
}

/// Both point-in-time strategies side by side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantityAsOf {
    pub as_of: DateTime<Utc>,
    /// Authoritative value
    pub quantity: i64,
    pub snapshot_quantity: i64,
    pub consistent: bool,
}

pub fn quantity_as_of(movements: &[StockMovement], as_of: DateTime<Utc>) -> QuantityAsOf {
    let quantity = replay_quantity(movements, as_of);
    let snapshot_quantity = snapshot_quantity(movements, as_of);
    QuantityAsOf {
        as_of,
        quantity,
        snapshot_quantity,
        consistent: quantity == snapshot_quantity,
    }
}

/// First broken link found while walking a movement history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum ChainBreak {
    /// `previous_quantity` does not continue from the prior row
    Discontinuous {
        movement_id: Uuid,
        sequence: i64,
        expected_previous: i64,
        recorded_previous: i64,
    },
    /// `new_quantity` is not `previous_quantity + effect`
    Miscomputed {
        movement_id: Uuid,
        sequence: i64,
        expected_new: i64,
        recorded_new: i64,
    },
}

/// Check every snapshot of a single (product, branch) history
pub fn verify_chain(movements: &[StockMovement]) -> Result<(), ChainBreak> {
    let mut running = 0i64;
    for m in ordered_until(movements, None) {
        if m.previous_quantity != running {
            return Err(ChainBreak::Discontinuous {
                movement_id: m.id,
                sequence: m.sequence,
                expected_previous: running,
                recorded_previous: m.previous_quantity,
            });
        }
        let expected_new = m.previous_quantity + m.effect();
        if m.new_quantity != expected_new {
            return Err(ChainBreak::Miscomputed {
                movement_id: m.id,
                sequence: m.sequence,
                expected_new,
                recorded_new: m.new_quantity,
            });
        }
        running = m.new_quantity;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn movement(
        sequence: i64,
        kind: MovementKind,
        magnitude: i64,
        previous: i64,
        day: u32,
    ) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            sequence,
            product_id: Uuid::nil(),
            branch_id: Uuid::nil(),
            source: None,
            kind,
            magnitude,
            previous_quantity: previous,
            new_quantity: apply_movement(previous, kind, magnitude).unwrap(),
            movement_date: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
            reason: None,
            created_by: Uuid::nil(),
            is_active: true,
        }
    }

    fn history() -> Vec<StockMovement> {
        vec![
            movement(1, MovementKind::Purchase, 10, 0, 1),
            movement(2, MovementKind::Sale, 3, 10, 2),
            movement(3, MovementKind::Adjustment, -2, 7, 2),
            movement(4, MovementKind::Return, 1, 5, 4),
        ]
    }

    #[test]
    fn test_apply_movement() {
        assert_eq!(apply_movement(5, MovementKind::Damage, 2).unwrap(), 3);
        assert!(apply_movement(5, MovementKind::Sale, 0).is_err());
        assert!(apply_movement(i64::MAX, MovementKind::Purchase, 1).is_err());
    }

    #[test]
    fn test_quantity_as_of_each_day() {
        let rows = history();
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 23, 0, 0).unwrap();

        assert_eq!(quantity_as_of(&rows, day(1)).quantity, 10);
        assert_eq!(quantity_as_of(&rows, day(2)).quantity, 5);
        assert_eq!(quantity_as_of(&rows, day(3)).quantity, 5);
        assert_eq!(quantity_as_of(&rows, day(4)).quantity, 6);

        let before = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let answer = quantity_as_of(&rows, before);
        assert_eq!(answer.quantity, 0);
        assert!(answer.consistent);
    }

    #[test]
    fn test_same_date_ordered_by_sequence() {
        let mut rows = history();
        rows.reverse();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        assert_eq!(snapshot_quantity(&rows, day2), 5);
        assert_eq!(replay_quantity(&rows, day2), 5);
    }

    #[test]
    fn test_inactive_rows_ignored() {
        let mut rows = history();
        rows.push(StockMovement {
            is_active: false,
            ..movement(5, MovementKind::Purchase, 100, 6, 5)
        });
        let later = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        assert_eq!(replay_quantity(&rows, later), 6);
    }

    #[test]
    fn test_verify_chain_accepts_well_formed() {
        assert_eq!(verify_chain(&history()), Ok(()));
        assert_eq!(verify_chain(&[]), Ok(()));
    }

    #[test]
    fn test_verify_chain_detects_tampered_snapshot() {
        let mut rows = history();
        rows[2].previous_quantity = 9;
        rows[2].new_quantity = 7;
        match verify_chain(&rows) {
            Err(ChainBreak::Discontinuous {
                sequence,
                expected_previous,
                ..
            }) => {
                assert_eq!(sequence, 3);
                assert_eq!(expected_previous, 7);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut rows = history();
        rows[1].new_quantity = 8;
        assert!(matches!(
            verify_chain(&rows),
            Err(ChainBreak::Miscomputed { sequence: 2, .. })
        ));
    }

    #[test]
    fn test_tampered_snapshot_flagged_inconsistent() {
        let mut rows = history();
        rows[3].new_quantity = 60;
        let later = rows[3].movement_date + Duration::hours(1);
        let answer = quantity_as_of(&rows, later);
        assert_eq!(answer.quantity, 6);
        assert_eq!(answer.snapshot_quantity, 60);
        assert!(!answer.consistent);
    }
}

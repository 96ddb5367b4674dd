//! Validation and pricing rules shared by the workflow and the backend

use std::collections::HashSet;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};

/// Markup applied when no configuration overrides it
pub const DEFAULT_MARKUP_PERCENT: Decimal = Decimal::from_parts(30, 0, 0, false, 0);

/// Prices are stored as NUMERIC(12,2)
pub const PRICE_SCALE: u32 = 2;

// ============================================================================
// Pricing
// ============================================================================

/// Selling price derived from a buying price and a markup percentage,
/// rounded to 2 decimal places
pub fn selling_price_from_markup(buying_price: Decimal, markup_percent: Decimal) -> Decimal {
    (buying_price * (Decimal::ONE_HUNDRED + markup_percent) / Decimal::ONE_HUNDRED).round_dp(2)
}

/// Trailing zeros are ignored, so `10.500` passes and `10.501` does not
pub fn validate_price_scale(field: &str, price: Decimal) -> WorkflowResult<()> {
    if price.normalize().scale() > PRICE_SCALE {
        return Err(WorkflowError::range(
            field,
            format!("{} has more than {} decimal places", price, PRICE_SCALE),
        ));
    }
    Ok(())
}

/// Buying price must be positive and the selling price strictly above it
pub fn validate_price_pair(buying_price: Decimal, selling_price: Decimal) -> WorkflowResult<()> {
    validate_price_scale("buying_price", buying_price)?;
    validate_price_scale("selling_price", selling_price)?;
    if buying_price <= Decimal::ZERO {
        return Err(WorkflowError::range(
            "buying_price",
            "buying price must be positive",
        ));
    }
    if selling_price <= buying_price {
        return Err(WorkflowError::range(
            "selling_price",
            format!(
                "selling price {} must exceed buying price {}",
                selling_price, buying_price
            ),
        ));
    }
    Ok(())
}

/// Use the given selling price, or derive one from the markup
pub fn resolve_selling_price(
    buying_price: Decimal,
    selling_price: Option<Decimal>,
    markup_percent: Decimal,
) -> WorkflowResult<Decimal> {
    let selling = selling_price
        .unwrap_or_else(|| selling_price_from_markup(buying_price, markup_percent));
    validate_price_pair(buying_price, selling)?;
    Ok(selling)
}

/// Markup must be a positive percentage
pub fn validate_markup_percent(markup_percent: Decimal) -> Result<(), &'static str> {
    if markup_percent <= Decimal::ZERO {
        return Err("Markup percentage must be positive");
    }
    if markup_percent > Decimal::from(1000) {
        return Err("Markup percentage must be at most 1000");
    }
    Ok(())
}

// ============================================================================
// Quantities and references
// ============================================================================

pub fn validate_requested_quantity(quantity: i64) -> WorkflowResult<()> {
    if quantity <= 0 {
        return Err(WorkflowError::range(
            "quantity_requested",
            "requested quantity must be positive",
        ));
    }
    Ok(())
}

/// Each id may appear at most once in a request
pub fn ensure_unique_ids<'a, I>(ids: I, field: &str) -> WorkflowResult<()>
where
    I: IntoIterator<Item = &'a Uuid>,
{
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(*id) {
            return Err(WorkflowError::validation(
                field,
                format!("{} is listed more than once", id),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_default_markup_is_thirty() {
        assert_eq!(DEFAULT_MARKUP_PERCENT, Decimal::from(30));
    }

    #[test]
    fn test_markup_selling_price() {
        assert_eq!(
            selling_price_from_markup(Decimal::from(10), DEFAULT_MARKUP_PERCENT),
            Decimal::from(13)
        );
        assert_eq!(
            selling_price_from_markup(dec("19.99"), DEFAULT_MARKUP_PERCENT),
            dec("25.99")
        );
        assert_eq!(
            selling_price_from_markup(dec("100"), dec("12.5")),
            dec("112.50")
        );
    }

    #[test]
    fn test_price_pair() {
        assert!(validate_price_pair(dec("10"), dec("10.01")).is_ok());
        assert!(validate_price_pair(dec("10"), dec("10")).is_err());
        assert!(validate_price_pair(dec("0"), dec("1")).is_err());
        assert!(validate_price_pair(dec("-1"), dec("1")).is_err());
    }

    #[test]
    fn test_price_scale() {
        assert!(validate_price_scale("buying_price", dec("10.5")).is_ok());
        assert!(validate_price_scale("buying_price", dec("10.500")).is_ok());
        assert!(validate_price_scale("buying_price", dec("10")).is_ok());

        let err = validate_price_pair(dec("10.001"), dec("12")).unwrap_err();
        assert!(matches!(err, WorkflowError::Range { ref field, .. } if field == "buying_price"));

        // 10.004 would round down onto a stored buying price of 10.00
        let err = validate_price_pair(dec("10"), dec("10.004")).unwrap_err();
        assert!(matches!(err, WorkflowError::Range { ref field, .. } if field == "selling_price"));

        assert!(validate_price_pair(dec("0.001"), dec("1")).is_err());
    }

    #[test]
    fn test_resolve_selling_price() {
        assert_eq!(
            resolve_selling_price(dec("10"), None, DEFAULT_MARKUP_PERCENT).unwrap(),
            dec("13")
        );
        assert_eq!(
            resolve_selling_price(dec("10"), Some(dec("20")), DEFAULT_MARKUP_PERCENT).unwrap(),
            dec("20")
        );
        let err = resolve_selling_price(dec("10"), Some(dec("9")), DEFAULT_MARKUP_PERCENT)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Range { .. }));

        // markup rounding can collapse onto the buying price
        assert!(resolve_selling_price(dec("0.01"), None, DEFAULT_MARKUP_PERCENT).is_err());
    }

    #[test]
    fn test_markup_bounds() {
        assert!(validate_markup_percent(dec("30")).is_ok());
        assert!(validate_markup_percent(dec("0")).is_err());
        assert!(validate_markup_percent(dec("1001")).is_err());
    }

    #[test]
    fn test_unique_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(ensure_unique_ids(&[a, b], "item_id").is_ok());
        assert!(matches!(
            ensure_unique_ids(&[a, b, a], "item_id"),
            Err(WorkflowError::Validation { .. })
        ));
    }
}

//! Market impact estimation by walking resting depth.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::models::{OrderbookSnapshot, Side};

/// Execution-time proxy per level consumed. A labeled heuristic, not a
/// latency model.
const MS_PER_LEVEL: u64 = 50;

/// Estimated fill outcome for a hypothetical aggressive order.
#[derive(Debug, Clone, Serialize)]
pub struct MarketImpact {
    /// Venue of the snapshot walked.
    pub venue: String,
    /// Symbol of the snapshot walked.
    pub symbol: String,
    /// Aggressor side: `Bid` buys into the asks, `Ask` sells into the bids.
    pub side: Side,
    /// Quantity the hypothetical order asked for.
    pub requested_quantity: Decimal,
    /// Quantity actually available on the walked side.
    pub filled_quantity: Decimal,
    /// Volume-weighted average fill price over the consumed levels.
    pub average_price: Decimal,
    /// Best available price before the walk.
    pub best_price: Decimal,
    /// Distance of the average fill from the best price, in percent.
    pub impact_pct: f64,
    /// Worst fill price minus best price, absolute.
    pub slippage: Decimal,
    /// Worst fill distance from the best price, in percent.
    pub slippage_pct: f64,
    /// Number of levels the walk consumed from.
    pub levels_touched: usize,
    /// Heuristic execution time: [`MS_PER_LEVEL`] per level touched.
    pub execution_time_ms: u64,
    /// Whether resting depth ran out before the requested quantity.
    pub partial_fill: bool,
}

/// Walk the side opposite the aggressor, consuming `size` in book order.
///
/// Insufficient depth yields a partial-fill result computed over the
/// consumed portion. Returns `None` only when the opposite side holds no
/// quantity or `size` is not positive, where no fill price exists at all.
#[must_use]
pub fn estimate(snapshot: &OrderbookSnapshot, size: Decimal, side: Side) -> Option<MarketImpact> {
    if size <= Decimal::ZERO {
        return None;
    }
    let levels = match side {
        Side::Bid => &snapshot.asks,
        Side::Ask => &snapshot.bids,
    };
    let best_price = levels.first()?.price;

    let mut remaining = size;
    let mut cost = Decimal::ZERO;
    let mut filled = Decimal::ZERO;
    let mut worst_price = best_price;
    let mut levels_touched = 0usize;

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(level.quantity);
        cost += take * level.price;
        filled += take;
        worst_price = level.price;
        levels_touched += 1;
        remaining -= take;
    }

    if filled <= Decimal::ZERO {
        return None;
    }
    let average_price = cost / filled;
    let slippage = (worst_price - best_price).abs();

    Some(MarketImpact {
        venue: snapshot.venue.clone(),
        symbol: snapshot.symbol.clone(),
        side,
        requested_quantity: size,
        filled_quantity: filled,
        average_price,
        best_price,
        impact_pct: pct_from_best(average_price, best_price),
        slippage,
        slippage_pct: pct_from_best(worst_price, best_price),
        levels_touched,
        execution_time_ms: levels_touched as u64 * MS_PER_LEVEL,
        partial_fill: remaining > Decimal::ZERO,
    })
}

/// Unsigned distance of `price` from `best`, in percent of `best`.
fn pct_from_best(price: Decimal, best: Decimal) -> f64 {
    if best.is_zero() {
        return 0.0;
    }
    ((price - best) / best * Decimal::ONE_HUNDRED)
        .abs()
        .to_f64()
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceLevel;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> OrderbookSnapshot {
        let now = Utc::now();
        let to_levels = |pairs: Vec<(Decimal, Decimal)>| {
            pairs
                .into_iter()
                .map(|(p, q)| PriceLevel::new(p, q, now))
                .collect()
        };
        OrderbookSnapshot::new("BTC-USD", "binance", now, to_levels(bids), to_levels(asks), None)
    }

    fn book() -> OrderbookSnapshot {
        snapshot(
            vec![(dec!(99), dec!(2)), (dec!(98), dec!(3))],
            vec![(dec!(100), dec!(1)), (dec!(101), dec!(2)), (dec!(102), dec!(4))],
        )
    }

    #[test]
    fn test_buy_within_best_level() {
        let impact = estimate(&book(), dec!(1), Side::Bid).unwrap();

        assert_eq!(impact.average_price, dec!(100));
        assert_eq!(impact.best_price, dec!(100));
        assert_eq!(impact.levels_touched, 1);
        assert_eq!(impact.execution_time_ms, 50);
        assert_eq!(impact.slippage, dec!(0));
        assert!(!impact.partial_fill);
        assert!(impact.impact_pct.abs() < 1e-12);
    }

    #[test]
    fn test_buy_walks_multiple_levels() {
        // 1 @ 100 + 2 @ 101 = 302 for 3 units.
        let impact = estimate(&book(), dec!(3), Side::Bid).unwrap();

        assert_eq!(impact.filled_quantity, dec!(3));
        assert_eq!(impact.average_price, dec!(302) / dec!(3));
        assert_eq!(impact.levels_touched, 2);
        assert_eq!(impact.execution_time_ms, 100);
        assert_eq!(impact.slippage, dec!(1));
        assert!((impact.slippage_pct - 1.0).abs() < 1e-9);
        assert!(!impact.partial_fill);
    }

    #[test]
    fn test_sell_walks_bids_downward() {
        // 2 @ 99 + 2 @ 98 = 394 for 4 units.
        let impact = estimate(&book(), dec!(4), Side::Ask).unwrap();

        assert_eq!(impact.best_price, dec!(99));
        assert_eq!(impact.average_price, dec!(394) / dec!(4));
        assert_eq!(impact.slippage, dec!(1));
        assert!(!impact.partial_fill);
    }

    #[test]
    fn test_full_depth_consumption_ends_at_last_level() {
        // Book holds exactly 7 on the ask side.
        let impact = estimate(&book(), dec!(7), Side::Bid).unwrap();

        assert!(!impact.partial_fill);
        assert_eq!(impact.filled_quantity, dec!(7));
        assert_eq!(impact.levels_touched, 3);
        // Worst fill is the deepest level consumed.
        assert_eq!(impact.slippage, dec!(2));
        assert!(impact.impact_pct > 0.0);
    }

    #[test]
    fn test_beyond_depth_is_partial_never_error() {
        let impact = estimate(&book(), dec!(100), Side::Bid).unwrap();

        assert!(impact.partial_fill);
        assert_eq!(impact.filled_quantity, dec!(7));
        assert_eq!(impact.levels_touched, 3);
        // VWAP over the consumed portion only: (100 + 202 + 408) / 7.
        assert_eq!(impact.average_price, dec!(710) / dec!(7));
    }

    #[test]
    fn test_empty_opposite_side_is_none() {
        let one_sided = snapshot(vec![(dec!(99), dec!(2))], vec![]);
        assert!(estimate(&one_sided, dec!(1), Side::Bid).is_none());
    }

    #[test]
    fn test_zero_quantity_depth_is_none() {
        let hollow = snapshot(vec![], vec![(dec!(100), dec!(0))]);
        assert!(estimate(&hollow, dec!(1), Side::Bid).is_none());
    }

    #[test]
    fn test_non_positive_size_is_none() {
        assert!(estimate(&book(), dec!(0), Side::Bid).is_none());
        assert!(estimate(&book(), dec!(-1), Side::Bid).is_none());
    }
}

//! Annualized supply yield from venue-native rate figures.
//!
//! Rate quotes fed into deposit and rebalance are comparable percentages.
//! Venue A (cToken style) reports a per-block supply rate scaled by 1e18;
//! Venue B (lending-pool style) reports an annual liquidity rate in ray
//! units (1e27). These helpers bring both onto the same APY scale.

use rust_decimal::{Decimal, MathematicalOps};

use allocator_domain::Rate;

use crate::error::{EngineError, EngineResult};

/// Blocks mined per day at ~13.15s block time
pub const BLOCKS_PER_DAY: u32 = 6570;

/// Compounding periods per year
pub const DAYS_PER_YEAR: u32 = 365;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

fn wad() -> Decimal {
    Decimal::from(1_000_000_000_000_000_000u64)
}

fn ray() -> Decimal {
    Decimal::from_i128_with_scale(1_000_000_000_000_000_000_000_000_000, 0)
}

/// Supply APY (percent) for a per-block rate scaled by 1e18.
///
/// ```text
/// APY = ((rate_per_block / 1e18 * blocks_per_day + 1) ^ days_per_year - 1) * 100
/// ```
pub fn compound_supply_apy(
    supply_rate_per_block: Decimal,
    blocks_per_day: u32,
    days_per_year: u32,
) -> EngineResult<Rate> {
    if supply_rate_per_block.is_sign_negative() && !supply_rate_per_block.is_zero() {
        return Err(EngineError::InvalidRateInput(format!(
            "supply rate per block must not be negative: {}",
            supply_rate_per_block
        )));
    }

    let overflow =
        || EngineError::Overflow(format!("rate {} per block", supply_rate_per_block));

    let daily = (supply_rate_per_block / wad())
        .checked_mul(Decimal::from(blocks_per_day))
        .ok_or_else(overflow)?;
    let growth = daily
        .checked_add(Decimal::ONE)
        .and_then(|base| base.checked_powu(u64::from(days_per_year)))
        .ok_or_else(overflow)?;
    let apy = growth
        .checked_sub(Decimal::ONE)
        .and_then(|gain| gain.checked_mul(HUNDRED))
        .ok_or_else(overflow)?;

    Ok(Rate::new(apy.round_dp(6)))
}

/// Supply APY (percent) for an annual liquidity rate in ray units.
///
/// ```text
/// APY = liquidity_rate / 1e27 * 100
/// ```
pub fn aave_supply_apy(liquidity_rate_ray: Decimal) -> EngineResult<Rate> {
    if liquidity_rate_ray.is_sign_negative() && !liquidity_rate_ray.is_zero() {
        return Err(EngineError::InvalidRateInput(format!(
            "liquidity rate must not be negative: {}",
            liquidity_rate_ray
        )));
    }

    let apy = (liquidity_rate_ray / ray()).checked_mul(HUNDRED).ok_or_else(|| {
        EngineError::Overflow(format!("liquidity rate {}", liquidity_rate_ray))
    })?;

    Ok(Rate::new(apy.round_dp(6)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_compound_zero_rate() {
        let apy = compound_supply_apy(Decimal::ZERO, BLOCKS_PER_DAY, DAYS_PER_YEAR).unwrap();
        assert_eq!(apy.as_decimal(), Decimal::ZERO);
    }

    #[test]
    fn test_compound_typical_rate() {
        // 1e10 per block ≈ 6.57e-5 per day ≈ 2.43% per year
        let apy = compound_supply_apy(dec!(10000000000), BLOCKS_PER_DAY, DAYS_PER_YEAR).unwrap();
        assert!(apy.as_decimal() > dec!(2.42), "apy = {}", apy);
        assert!(apy.as_decimal() < dec!(2.44), "apy = {}", apy);
    }

    #[test]
    fn test_compound_rejects_negative() {
        assert!(matches!(
            compound_supply_apy(dec!(-1), BLOCKS_PER_DAY, DAYS_PER_YEAR),
            Err(EngineError::InvalidRateInput(_))
        ));
    }

    #[test]
    fn test_compound_overflow_is_an_error() {
        let result = compound_supply_apy(dec!(30000000000000), BLOCKS_PER_DAY, DAYS_PER_YEAR);
        assert!(matches!(result, Err(EngineError::Overflow(_))));

        let result = compound_supply_apy(Decimal::MAX, BLOCKS_PER_DAY, DAYS_PER_YEAR);
        assert!(matches!(result, Err(EngineError::Overflow(_))));
    }

    #[test]
    fn test_aave_ray_conversion() {
        // 3e25 ray = 0.03 = 3%
        let apy = aave_supply_apy(dec!(30000000000000000000000000)).unwrap();
        assert_eq!(apy.as_decimal(), dec!(3));
    }

    #[test]
    fn test_aave_rejects_negative() {
        assert!(aave_supply_apy(dec!(-5)).is_err());
    }

    #[test]
    fn test_rates_are_comparable() {
        let a = compound_supply_apy(dec!(10000000000), BLOCKS_PER_DAY, DAYS_PER_YEAR).unwrap();
        let b = aave_supply_apy(dec!(30000000000000000000000000)).unwrap();
        assert!(b > a);
    }
}

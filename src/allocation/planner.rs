//! Pure rebalance planning and proportional distribution.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use super::ledger::Allocation;
use crate::core::math::mul_div;
use crate::core::types::{Bps, Bucket, BucketValues};

/// Transfer of value between two buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Bucket,
    pub to: Bucket,
    pub amount: U256,
}

/// Plan the moves bringing `values` toward `allocation`.
///
/// The RWA bucket is settled first, sourcing a shortfall from buffer surplus
/// and then yield surplus, and releasing an excess into any yield shortfall
/// before the buffer. The yield bucket is then topped up from (or drained
/// into) the buffer. Rounding dust from the targets stays in the buffer.
///
/// # Arguments
/// * `values` - Current value per bucket
/// * `allocation` - Target weights
///
/// # Returns
/// Moves in execution order, zero-amount moves omitted
pub fn plan_rebalance(values: &BucketValues, allocation: &Allocation) -> Vec<Move> {
    let total = values.total();
    let target_rwa = allocation.target(Bucket::Rwa, total);
    let target_yield = allocation.target(Bucket::Yield, total);
    let target_buffer = allocation.target(Bucket::Buffer, total);

    let mut working = *values;
    let mut moves = Vec::new();

    if working.rwa < target_rwa {
        let mut shortfall = target_rwa - working.rwa;

        let from_buffer = shortfall.min(working.buffer.saturating_sub(target_buffer));
        push_move(&mut moves, &mut working, Bucket::Buffer, Bucket::Rwa, from_buffer);
        shortfall -= from_buffer;

        let from_yield = shortfall.min(working.yield_value.saturating_sub(target_yield));
        push_move(&mut moves, &mut working, Bucket::Yield, Bucket::Rwa, from_yield);
    } else if working.rwa > target_rwa {
        let excess = working.rwa - target_rwa;

        let to_yield = excess.min(target_yield.saturating_sub(working.yield_value));
        push_move(&mut moves, &mut working, Bucket::Rwa, Bucket::Yield, to_yield);
        push_move(&mut moves, &mut working, Bucket::Rwa, Bucket::Buffer, excess - to_yield);
    }

    if working.yield_value < target_yield && working.buffer > target_buffer {
        let amount = (target_yield - working.yield_value).min(working.buffer - target_buffer);
        push_move(&mut moves, &mut working, Bucket::Buffer, Bucket::Yield, amount);
    } else if working.yield_value > target_yield && working.buffer < target_buffer {
        let amount = (working.yield_value - target_yield).min(target_buffer - working.buffer);
        push_move(&mut moves, &mut working, Bucket::Yield, Bucket::Buffer, amount);
    }

    moves
}

fn push_move(
    moves: &mut Vec<Move>,
    working: &mut BucketValues,
    from: Bucket,
    to: Bucket,
    amount: U256,
) {
    if amount.is_zero() {
        return;
    }
    *working.get_mut(from) -= amount;
    *working.get_mut(to) += amount;
    moves.push(Move { from, to, amount });
}

/// Split `amount` as `amount * p_i / sum(p)`, rounding each share down.
///
/// Returns all zeros when the percentages sum to zero.
pub fn proportional_split(amount: U256, percentages: &[Bps]) -> Vec<U256> {
    let sum: u64 = percentages.iter().map(|&p| u64::from(p)).sum();
    let denominator = U256::from(sum);
    percentages
        .iter()
        .map(|&p| mul_div(amount, U256::from(p), denominator))
        .collect()
}

/// Split a withdrawal of `amount` across entities holding `values`.
///
/// Entities with zero value are skipped and the remaining percentages are
/// renormalized. Each share is capped at the entity's value; whatever the
/// cap leaves over is spread again across entities that still hold value,
/// so the shares sum to `min(amount, sum(values))`.
pub fn withdrawal_split(amount: U256, percentages: &[Bps], values: &[U256]) -> Vec<U256> {
    let mut shares = vec![U256::ZERO; values.len()];
    let mut remaining = amount;

    while !remaining.is_zero() {
        let room: Vec<U256> = values.iter().zip(&shares).map(|(v, s)| *v - *s).collect();
        let effective: Vec<Bps> = percentages
            .iter()
            .zip(&room)
            .map(|(&p, r)| if r.is_zero() { 0 } else { p })
            .collect();
        if effective.iter().all(|&p| p == 0) {
            break;
        }

        let mut placed = U256::ZERO;
        for ((share, extra), r) in shares
            .iter_mut()
            .zip(proportional_split(remaining, &effective))
            .zip(&room)
        {
            let take = extra.min(*r);
            *share += take;
            placed += take;
        }
        remaining -= placed;

        if placed.is_zero() {
            // Rounding dust smaller than every proportional share.
            for (share, r) in shares.iter_mut().zip(&room) {
                let take = remaining.min(*r);
                *share += take;
                remaining -= take;
            }
            break;
        }
    }
    shares
}

//! Index arithmetic shared with the ledger program.
//!
//! Each update adds `amount * INDEX_SCALE / share_supply` to the global index.
//! A participant's earnings are their balance times the index movement since
//! their last checkpoint.

/// Fixed-point scale of the accrual index.
pub const INDEX_SCALE: u128 = 1_000_000_000_000;

/// Index increase produced by distributing `amount` over `share_supply`.
/// `None` when the supply is zero or the product overflows.
pub fn index_delta(amount: u64, share_supply: u64) -> Option<u128> {
    if share_supply == 0 {
        return None;
    }
    u128::from(amount)
        .checked_mul(INDEX_SCALE)?
        .checked_div(u128::from(share_supply))
}

/// Rewards a participant can claim right now.
pub fn claimable(global_index: u128, user_index: u128, pending_rewards: u64, balance: u64) -> u64 {
    if global_index <= user_index {
        return pending_rewards;
    }
    let accrued = u128::from(balance).saturating_mul(global_index - user_index) / INDEX_SCALE;
    let accrued = u64::try_from(accrued).unwrap_or(u64::MAX);
    pending_rewards.saturating_add(accrued)
}

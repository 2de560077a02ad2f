//! Coins and payments.
//!
//! Money is carried as stacks of currency items (`currency_value_<n>`). Paying
//! picks the coin combination with the least overpayment, then the fewest
//! coins; change comes back greedily.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::ItemId;

pub const DEFAULT_DENOMINATIONS: [u64; 6] = [1000, 100, 50, 10, 5, 1];

const CURRENCY_PREFIX: &str = "currency_value_";

/// Item id of the coin worth `denomination`.
pub fn currency_item_id(denomination: u64) -> ItemId {
    ItemId::new(format!("{}{}", CURRENCY_PREFIX, denomination))
}

/// Denomination of a currency item id, if it is one.
pub fn denomination_of(item_id: &ItemId) -> Option<u64> {
    item_id.as_str().strip_prefix(CURRENCY_PREFIX)?.parse().ok()
}

/// Coin counts keyed by denomination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinSet(BTreeMap<u64, u64>);

impl CoinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: &[(u64, u64)]) -> Self {
        let mut set = Self::new();
        for &(denom, count) in counts {
            set.add(denom, count);
        }
        set
    }

    pub fn add(&mut self, denomination: u64, count: u64) {
        if count == 0 {
            return;
        }
        *self.0.entry(denomination).or_insert(0) += count;
    }

    pub fn count(&self, denomination: u64) -> u64 {
        self.0.get(&denomination).copied().unwrap_or(0)
    }

    /// Total value of all coins.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|(d, c)| d * c).sum()
    }

    /// Number of physical coins.
    pub fn coin_count(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.coin_count() == 0
    }

    /// Non-zero (denomination, count) pairs, largest denomination first.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.0.iter().rev().filter(|(_, c)| **c > 0).map(|(d, c)| (*d, *c))
    }
}

/// A chosen set of coins for a price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub coins: CoinSet,
    pub total: u64,
    /// Amount paid above the price, owed back as change
    pub overpay: u64,
}

struct PaymentSearch<'a> {
    price: u64,
    limit: u64,
    denominations: &'a [u64],
    wallet: &'a CoinSet,
    combo: Vec<u64>,
    best: Option<(u64, u64, Vec<u64>)>,
}

impl PaymentSearch<'_> {
    fn dfs(&mut self, idx: usize, paid: u64, used: u64) {
        if paid >= self.price {
            let overpay = paid - self.price;
            let better = match &self.best {
                None => true,
                Some((best_overpay, best_used, _)) => {
                    overpay < *best_overpay || (overpay == *best_overpay && used < *best_used)
                }
            };
            if better {
                self.best = Some((overpay, used, self.combo.clone()));
            }
            return;
        }

        if idx >= self.denominations.len() {
            return;
        }

        let denom = self.denominations[idx];
        for count in 0..=self.wallet.count(denom) {
            let new_paid = paid + denom * count;
            if new_paid > self.limit {
                break;
            }
            self.combo[idx] = count;
            self.dfs(idx + 1, new_paid, used + count);
        }
        self.combo[idx] = 0;
    }
}

/// Find the payment for `price` with minimum overpayment, ties broken by
/// fewest coins. Returns `None` when the wallet cannot cover the price.
///
/// `denominations` may be in any order. Branches whose running total passes
/// `price + prune_slack` are cut; this is only safe when the slack is at
/// least the largest denomination, which is enforced.
pub fn best_payment(
    price: u64,
    wallet: &CoinSet,
    denominations: &[u64],
    prune_slack: u64,
) -> CoreResult<Option<Payment>> {
    let mut denoms = denominations.to_vec();
    denoms.sort_unstable_by(|a, b| b.cmp(a));
    denoms.dedup();

    let largest = denoms.first().copied().unwrap_or(0);
    if prune_slack < largest {
        return Err(CoreError::invariant(format!(
            "best_payment prune slack {} is below the largest denomination {}",
            prune_slack, largest
        )));
    }

    let available: u64 = denoms.iter().map(|d| d * wallet.count(*d)).sum();
    if available < price {
        return Ok(None);
    }

    let mut search = PaymentSearch {
        price,
        limit: price.saturating_add(prune_slack),
        denominations: &denoms,
        wallet,
        combo: vec![0; denoms.len()],
        best: None,
    };
    search.dfs(0, 0, 0);

    let Some((overpay, _, counts)) = search.best else {
        return Err(CoreError::invariant(format!(
            "no payment found for price {} despite wallet total {}",
            price, available
        )));
    };

    let mut coins = CoinSet::new();
    for (denom, count) in denoms.iter().zip(counts) {
        coins.add(*denom, count);
    }
    Ok(Some(Payment {
        total: coins.total(),
        coins,
        overpay,
    }))
}

/// Greedy decomposition of `amount` into coins.
pub fn calculate_coins(amount: u64, denominations: &[u64]) -> CoreResult<CoinSet> {
    let mut denoms = denominations.to_vec();
    denoms.sort_unstable_by(|a, b| b.cmp(a));

    let mut remaining = amount;
    let mut coins = CoinSet::new();
    for denom in denoms {
        if denom == 0 || remaining < denom {
            continue;
        }
        coins.add(denom, remaining / denom);
        remaining %= denom;
    }

    if remaining != 0 {
        return Err(CoreError::invariant(format!(
            "calculate_coins left a remainder of {} for amount {}",
            remaining, amount
        )));
    }
    Ok(coins)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pay(price: u64, wallet: &CoinSet) -> Payment {
        best_payment(price, wallet, &DEFAULT_DENOMINATIONS, 1000)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_exact_payment_fewest_coins() {
        let wallet = CoinSet::from_counts(&[(100, 2), (50, 2), (10, 5), (5, 3), (1, 10)]);
        let payment = pay(137, &wallet);

        assert_eq!(payment.total, 137);
        assert_eq!(payment.overpay, 0);
        // 100 + 3x10 + 5 + 2x1
        assert_eq!(payment.coins.coin_count(), 7);
        assert_eq!(payment.coins.count(100), 1);
        assert_eq!(payment.coins.count(50), 0);
    }

    #[test]
    fn test_minimum_overpay_and_change() {
        let wallet = CoinSet::from_counts(&[(100, 2), (50, 1)]);
        let payment = pay(137, &wallet);

        assert!(payment.total >= 137);
        assert_eq!(payment.total, 150);
        assert_eq!(payment.overpay, 13);

        let change = calculate_coins(payment.overpay, &DEFAULT_DENOMINATIONS).unwrap();
        assert_eq!(change.total(), 13);
        assert_eq!(change.count(10), 1);
        assert_eq!(change.count(1), 3);
    }

    #[test]
    fn test_tie_break_prefers_fewer_coins() {
        let wallet = CoinSet::from_counts(&[(10, 1), (5, 2)]);
        let payment = pay(10, &wallet);
        assert_eq!(payment.coins.count(10), 1);
        assert_eq!(payment.coins.coin_count(), 1);
    }

    #[test]
    fn test_insufficient_funds() {
        let wallet = CoinSet::from_counts(&[(5, 1)]);
        let result = best_payment(6, &wallet, &DEFAULT_DENOMINATIONS, 1000).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_large_coin_only() {
        let wallet = CoinSet::from_counts(&[(1000, 1)]);
        let payment = pay(1, &wallet);
        assert_eq!(payment.overpay, 999);
    }

    #[test]
    fn test_prune_slack_below_largest_is_rejected() {
        let wallet = CoinSet::from_counts(&[(1000, 1)]);
        let err = best_payment(1, &wallet, &DEFAULT_DENOMINATIONS, 999).unwrap_err();
        assert!(matches!(err, CoreError::Invariant(_)));
    }

    #[test]
    fn test_calculate_coins_sums_exactly() {
        for amount in [0, 1, 4, 9, 137, 1999, 2866] {
            let coins = calculate_coins(amount, &DEFAULT_DENOMINATIONS).unwrap();
            assert_eq!(coins.total(), amount);
        }
        let coins = calculate_coins(1866, &DEFAULT_DENOMINATIONS).unwrap();
        assert_eq!(coins.count(1000), 1);
        assert_eq!(coins.count(100), 8);
        assert_eq!(coins.count(50), 1);
        assert_eq!(coins.count(10), 1);
        assert_eq!(coins.count(5), 1);
        assert_eq!(coins.count(1), 1);
    }

    #[test]
    fn test_calculate_coins_remainder_is_error() {
        assert!(calculate_coins(7, &[5, 4]).is_err());
    }

    #[test]
    fn test_currency_ids() {
        let id = currency_item_id(50);
        assert_eq!(id.as_str(), "currency_value_50");
        assert_eq!(denomination_of(&id), Some(50));
        assert_eq!(denomination_of(&ItemId::new("apple")), None);
    }
}

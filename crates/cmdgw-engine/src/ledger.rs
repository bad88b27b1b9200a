//! # Credit Ledger
//!
//! Per-user credit balances. Entries are created lazily: a user without an
//! entry has balance 0, and the first debit or adjustment creates the entry
//! with the resulting balance (which may be negative for escalated
//! executions).
//!
//! All mutation goes through [`GatewayInner::apply_credit`], which only ever
//! runs inside a gateway critical section. The balance check and the debit
//! that depends on it therefore always observe the same state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmdgw_core::UserId;

use crate::store::GatewayInner;

/// One user's ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditEntry {
    /// The account holder.
    pub user_id: UserId,
    /// Current balance in credits.
    pub balance: i64,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl GatewayInner {
    /// Current balance; 0 when no entry exists yet.
    pub(crate) fn balance_of(&self, user_id: UserId) -> i64 {
        self.credits.get(&user_id).map_or(0, |e| e.balance)
    }

    /// Apply a signed delta to a balance, creating the entry on first use.
    /// Returns the new balance.
    pub(crate) fn apply_credit(&mut self, user_id: UserId, delta: i64, now: DateTime<Utc>) -> i64 {
        let entry = self.credits.entry(user_id).or_insert(CreditEntry {
            user_id,
            balance: 0,
            updated_at: now,
        });
        entry.balance += delta;
        entry.updated_at = now;
        entry.balance
    }
}

#[cfg(test)]
mod tests {
    use crate::store::CommandGateway;
    use chrono::Utc;
    use cmdgw_core::UserId;

    #[test]
    fn missing_entry_reads_as_zero() {
        let gw = CommandGateway::new();
        assert_eq!(gw.balance_of(UserId::new()), 0);
    }

    #[test]
    fn first_debit_creates_negative_entry() {
        let gw = CommandGateway::new();
        let now = Utc::now();
        let user = gw
            .create_user("dana", "dana@example.com", cmdgw_core::Role::Member, now)
            .id;
        let new_balance = gw.with_inner_mut(|inner| inner.apply_credit(user, -3, now));
        assert_eq!(new_balance, -3);
        assert_eq!(gw.balance_of(user), -3);
    }

    proptest::proptest! {
        /// Any sequence of adjustments leaves the balance at the sum of
        /// the deltas.
        #[test]
        fn balance_is_sum_of_deltas(deltas in proptest::collection::vec(-1000i64..1000, 0..30)) {
            let gw = CommandGateway::new();
            let now = Utc::now();
            let user = gw
                .create_user("dana", "dana@example.com", cmdgw_core::Role::Member, now)
                .id;
            for delta in &deltas {
                gw.with_inner_mut(|inner| inner.apply_credit(user, *delta, now));
            }
            proptest::prop_assert_eq!(gw.balance_of(user), deltas.iter().sum::<i64>());
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::error::EconomicError;
use crate::fixed::Money;

/// An economic agent that owns segments and pays for their protection.
///
/// Which segments a steward owns is recorded in the flow graph, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Steward {
    name: String,
    balance: Money,
}

impl Steward {
    pub fn new(name: impl Into<String>, balance: Money) -> Self {
        Self {
            name: name.into(),
            balance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn deposit_money(&mut self, amount: Money) {
        self.balance = self.balance.saturating_add(amount);
    }

    /// Withdraw `amount`, failing without change if the balance is short.
    pub fn withdraw_money(&mut self, amount: Money) -> Result<(), EconomicError> {
        if amount > self.balance {
            return Err(EconomicError::InsufficientFunds {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn can_afford(&self, amount: Money) -> bool {
        amount <= self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_and_withdraw() {
        let mut steward = Steward::new("valley board", 500);
        steward.deposit_money(250);
        assert_eq!(steward.balance(), 750);
        steward.withdraw_money(750).unwrap();
        assert_eq!(steward.balance(), 0);
    }

    #[test]
    fn overdraw_fails_without_change() {
        let mut steward = Steward::new("valley board", 100);
        assert_eq!(
            steward.withdraw_money(101),
            Err(EconomicError::InsufficientFunds {
                required: 101,
                available: 100,
            })
        );
        assert_eq!(steward.balance(), 100);
        assert!(!steward.can_afford(101));
        assert!(steward.can_afford(100));
    }
}

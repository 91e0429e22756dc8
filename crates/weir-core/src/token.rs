//! Token capability interfaces
//!
//! The ledger never owns token logic. It talks to narrow capabilities
//! (`Transferable`, `MultiTransferable`, `Mintable`, `Owned`) and this module
//! ships in-memory implementations of them for tests and local simulation.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Result, WeirError};
use crate::types::{Address, Amount, TokenClass};

/// One movement of a fungible token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

impl Transfer {
    pub fn new(from: Address, to: Address, amount: Amount) -> Self {
        Self { from, to, amount }
    }
}

/// One movement of a class-indexed (multi) token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTransfer {
    pub from: Address,
    pub to: Address,
    pub class: TokenClass,
    pub amount: Amount,
}

/// Fungible token transfers
pub trait Transferable: Send + Sync {
    fn balance_of(&self, account: &Address) -> Amount;

    /// Apply every transfer or none of them
    fn transfer_batch(&self, transfers: &[Transfer]) -> Result<()>;

    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<()> {
        self.transfer_batch(&[Transfer::new(from, to, amount)])
    }
}

/// Class-indexed token transfers (staked position tokens)
pub trait MultiTransferable: Send + Sync {
    fn balance_of(&self, account: &Address, class: TokenClass) -> Amount;

    /// Apply every transfer or none of them
    fn transfer_batch(&self, transfers: &[ClassTransfer]) -> Result<()>;
}

/// Supply creation, used to fund escrow and stakers
pub trait Mintable {
    fn mint(&self, to: Address, amount: Amount) -> Result<()>;
}

/// Single-owner access control
pub trait Owned {
    fn owner(&self) -> Address;

    fn ensure_owner(&self, caller: &Address, operation: &'static str) -> Result<()> {
        if *caller != self.owner() {
            return Err(WeirError::unauthorized(operation, caller));
        }
        Ok(())
    }
}

/// Debit then credit `amount` inside a scratch balance map
fn apply_move<K: Copy + Eq + std::hash::Hash>(
    balances: &mut HashMap<K, Amount>,
    from: K,
    to: K,
    amount: Amount,
) -> Result<()> {
    let available = balances.get(&from).copied().unwrap_or(0);
    if available < amount {
        return Err(WeirError::InsufficientBalance {
            required: amount,
            available,
        });
    }
    balances.insert(from, available - amount);
    let credited = balances
        .get(&to)
        .copied()
        .unwrap_or(0)
        .checked_add(amount)
        .ok_or(WeirError::ArithmeticOverflow("token credit"))?;
    balances.insert(to, credited);
    Ok(())
}

/// In-memory fungible token
#[derive(Debug, Default)]
pub struct TokenBank {
    balances: RwLock<HashMap<Address, Amount>>,
    total_supply: RwLock<Amount>,
}

impl TokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> Amount {
        *self.total_supply.read()
    }
}

impl Transferable for TokenBank {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.read().get(account).copied().unwrap_or(0)
    }

    fn transfer_batch(&self, transfers: &[Transfer]) -> Result<()> {
        if transfers.is_empty() {
            return Ok(());
        }
        let mut balances = self.balances.write();
        let mut scratch = balances.clone();
        for t in transfers {
            apply_move(&mut scratch, t.from, t.to, t.amount)?;
            trace!(from = %t.from, to = %t.to, amount = t.amount, "transfer");
        }
        *balances = scratch;
        Ok(())
    }
}

impl Mintable for TokenBank {
    fn mint(&self, to: Address, amount: Amount) -> Result<()> {
        let mut supply = self.total_supply.write();
        let new_supply = supply
            .checked_add(amount)
            .ok_or(WeirError::ArithmeticOverflow("total supply"))?;
        let mut balances = self.balances.write();
        let entry = balances.entry(to).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(WeirError::ArithmeticOverflow("token credit"))?;
        *supply = new_supply;
        Ok(())
    }
}

/// In-memory multi-class token
#[derive(Debug, Default)]
pub struct ClassTokenBank {
    balances: RwLock<HashMap<(Address, TokenClass), Amount>>,
}

impl ClassTokenBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` units of `class` to `to`
    pub fn mint(&self, to: Address, class: TokenClass, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write();
        let entry = balances.entry((to, class)).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(WeirError::ArithmeticOverflow("class token credit"))?;
        Ok(())
    }
}

impl MultiTransferable for ClassTokenBank {
    fn balance_of(&self, account: &Address, class: TokenClass) -> Amount {
        self.balances
            .read()
            .get(&(*account, class))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_batch(&self, transfers: &[ClassTransfer]) -> Result<()> {
        if transfers.is_empty() {
            return Ok(());
        }
        let mut balances = self.balances.write();
        let mut scratch = balances.clone();
        for t in transfers {
            apply_move(&mut scratch, (t.from, t.class), (t.to, t.class), t.amount)?;
        }
        *balances = scratch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_mint_and_transfer() {
        let bank = TokenBank::new();
        bank.mint(addr(1), 100).unwrap();
        bank.transfer(addr(1), addr(2), 40).unwrap();

        assert_eq!(bank.balance_of(&addr(1)), 60);
        assert_eq!(bank.balance_of(&addr(2)), 40);
        assert_eq!(bank.total_supply(), 100);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let bank = TokenBank::new();
        bank.mint(addr(1), 100).unwrap();

        let result = bank.transfer_batch(&[
            Transfer::new(addr(1), addr(2), 80),
            Transfer::new(addr(1), addr(3), 30),
        ]);
        assert_eq!(
            result,
            Err(WeirError::InsufficientBalance {
                required: 30,
                available: 20
            })
        );
        assert_eq!(bank.balance_of(&addr(1)), 100);
        assert_eq!(bank.balance_of(&addr(2)), 0);
    }

    #[test]
    fn test_class_bank_tracks_classes_separately() {
        let bank = ClassTokenBank::new();
        bank.mint(addr(1), TokenClass(1), 3).unwrap();
        bank.mint(addr(1), TokenClass(2), 5).unwrap();

        bank.transfer_batch(&[ClassTransfer {
            from: addr(1),
            to: addr(9),
            class: TokenClass(2),
            amount: 5,
        }])
        .unwrap();

        assert_eq!(bank.balance_of(&addr(1), TokenClass(1)), 3);
        assert_eq!(bank.balance_of(&addr(1), TokenClass(2)), 0);
        assert_eq!(bank.balance_of(&addr(9), TokenClass(2)), 5);
    }

    struct Vault(Address);

    impl Owned for Vault {
        fn owner(&self) -> Address {
            self.0
        }
    }

    #[test]
    fn test_ensure_owner() {
        let vault = Vault(addr(7));
        assert!(vault.ensure_owner(&addr(7), "addReward").is_ok());
        assert_eq!(
            vault.ensure_owner(&addr(8), "addReward").unwrap_err().code(),
            1001
        );
    }
}

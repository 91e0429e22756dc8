//! # Release Escrow
//!
//! Custodies the lifetime allocation and releases whatever the emission
//! schedule has unlocked beyond what was already distributed. Only the
//! designated recipient (the weight ledger) may trigger a release.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use weir_core::tx::atomically;
use weir_core::{Address, Amount, Result, Timestamp, Transfer, Transferable, WeirError};

use crate::emission::EmissionSchedule;

/// Escrow state: the allocation and how much of it has left
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    /// Account holding the escrowed tokens
    address: Address,
    /// Only caller allowed to withdraw, and the receiver of every release
    recipient: Address,
    schedule: EmissionSchedule,
    lifetime_allocation: Amount,
    distributed_total: Amount,
    last_withdrawal_time: Timestamp,
}

impl Escrow {
    pub fn new(
        address: Address,
        recipient: Address,
        schedule: EmissionSchedule,
        lifetime_allocation: Amount,
    ) -> Self {
        let last_withdrawal_time = schedule.genesis_time();
        Self {
            address,
            recipient,
            schedule,
            lifetime_allocation,
            distributed_total: 0,
            last_withdrawal_time,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    pub fn lifetime_rewards(&self) -> Amount {
        self.lifetime_allocation
    }

    pub fn distributed_rewards(&self) -> Amount {
        self.distributed_total
    }

    pub fn released_rewards(&self) -> Amount {
        self.distributed_total
    }

    pub fn remaining_rewards(&self) -> Amount {
        self.lifetime_allocation.saturating_sub(self.distributed_total)
    }

    /// Always 0: per-recipient claims are tracked downstream
    pub fn unclaimed_rewards(&self) -> Amount {
        0
    }

    pub fn last_withdrawal_time(&self) -> Timestamp {
        self.last_withdrawal_time
    }

    /// Schedule-unlocked amount at `t`, capped at the lifetime allocation
    pub fn unlocked_at(&self, t: Timestamp) -> Amount {
        self.schedule
            .available_rewards(t)
            .min(self.lifetime_allocation)
    }

    /// Amount a withdrawal at `now` would release
    pub fn releasable(&self, now: Timestamp) -> Amount {
        self.unlocked_at(now).saturating_sub(self.distributed_total)
    }

    /// Book a release at `now` and return the transfer that pays it out.
    ///
    /// Only the accounting happens here; the caller submits the transfer.
    pub(crate) fn record_release(&mut self, now: Timestamp) -> Option<Transfer> {
        if now < self.schedule.genesis_time() || now < self.last_withdrawal_time {
            debug!(now, "escrow release before genesis or last withdrawal, no-op");
            return None;
        }
        let delta = self.releasable(now);
        self.distributed_total += delta;
        self.last_withdrawal_time = now;
        if delta == 0 {
            return None;
        }
        info!(
            amount = delta,
            distributed = self.distributed_total,
            remaining = self.remaining_rewards(),
            "escrow release"
        );
        Some(Transfer::new(self.address, self.recipient, delta))
    }

    /// Release the unlocked-but-undistributed amount to the recipient
    pub fn withdraw(
        &mut self,
        caller: &Address,
        now: Timestamp,
        token: &dyn Transferable,
    ) -> Result<Amount> {
        if *caller != self.recipient {
            return Err(WeirError::unauthorized("escrow.withdraw", caller));
        }
        atomically(self, |draft| match draft.record_release(now) {
            Some(transfer) => {
                token.transfer_batch(&[transfer])?;
                Ok(transfer.amount)
            }
            None => Ok(0),
        })
    }
}

use serde::{Deserialize, Serialize};

use tally_accounting::AccountCode;
use tally_core::{DomainError, DomainResult, Entity};

tally_core::numeric_id!(
    /// Payment method identifier.
    PaymentMethodId(u64),
    "PaymentMethodId"
);

/// `rel_fee` denominator: 1 unit = 0.0001 %.
pub const REL_FEE_SCALE: i64 = 1_000_000;

/// A way to take payment (cash drawer, card terminal, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
    /// Must carry "POS - Payment Method"; checked by the caller.
    pub account_code: AccountCode,
    pub min_fee: i64,
    /// 0 means no cap.
    pub max_fee: i64,
    pub rel_fee: i64,
}

impl PaymentMethod {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("Payment method name cannot be empty"));
        }
        if self.min_fee < 0 || self.max_fee < 0 {
            return Err(DomainError::validation("Payment fees cannot be negative"));
        }
        if self.max_fee > 0 && self.max_fee < self.min_fee {
            return Err(DomainError::validation(
                "Maximum fee cannot be less than minimum fee",
            ));
        }
        if !(0..=REL_FEE_SCALE).contains(&self.rel_fee) {
            return Err(DomainError::validation(format!(
                "Relative fee must be between 0 and {REL_FEE_SCALE}"
            )));
        }
        Ok(())
    }

    /// Fee charged on a payment of `amount`: the relative fee rounded half up,
    /// raised to `min_fee`, capped at `max_fee` when one is set.
    pub fn fee_for(&self, amount: i64) -> i64 {
        let scale = REL_FEE_SCALE as i128;
        let relative = (amount as i128 * self.rel_fee as i128 + scale / 2).div_euclid(scale) as i64;
        let fee = relative.max(self.min_fee);
        if self.max_fee > 0 {
            fee.min(self.max_fee)
        } else {
            fee
        }
    }
}

impl Entity for PaymentMethod {
    type Id = PaymentMethodId;
    const KIND: &'static str = "Payment method";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

use serde::{Deserialize, Serialize};

use tally_core::{DomainError, DomainResult, Entity};
use tally_inventory::InventoryId;

tally_core::numeric_id!(
    /// Discount identifier.
    DiscountId(u64),
    "DiscountId"
);

/// Quantity discount: `amount` off for every full `multiple_of_quantity`
/// units on a sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: DiscountId,
    pub name: String,
    /// None applies to every inventory.
    pub inventory_id: Option<InventoryId>,
    pub multiple_of_quantity: i64,
    pub amount: i64,
}

impl Discount {
    pub fn new(
        id: DiscountId,
        name: impl Into<String>,
        inventory_id: Option<InventoryId>,
        multiple_of_quantity: i64,
        amount: i64,
    ) -> DomainResult<Self> {
        let discount = Self {
            id,
            name: name.into(),
            inventory_id,
            multiple_of_quantity,
            amount,
        };
        discount.validate()?;
        Ok(discount)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("Discount name cannot be empty"));
        }
        if self.multiple_of_quantity <= 0 {
            return Err(DomainError::validation(
                "Discount multiple of quantity must be positive",
            ));
        }
        if self.amount < 0 {
            return Err(DomainError::validation("Discount amount cannot be negative"));
        }
        Ok(())
    }

    pub fn applies_to(&self, inventory_id: InventoryId) -> bool {
        self.inventory_id.is_none_or(|scope| scope == inventory_id)
    }

    pub fn ensure_applicable(&self, inventory_id: InventoryId) -> DomainResult<()> {
        if self.applies_to(inventory_id) {
            Ok(())
        } else {
            Err(DomainError::validation(
                "Discount is not applicable to this inventory",
            ))
        }
    }

    /// Discount earned by a line of `quantity` units. Saturates at
    /// `i64::MAX`, which no line price can cover.
    pub fn amount_for(&self, quantity: i64) -> i64 {
        if quantity <= 0 {
            return 0;
        }
        (quantity / self.multiple_of_quantity).saturating_mul(self.amount)
    }
}

impl Entity for Discount {
    type Id = DiscountId;
    const KIND: &'static str = "Discount";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three_for_2000(scope: Option<InventoryId>) -> Discount {
        Discount::new(DiscountId(1), "3-for-2000", scope, 3, 2_000).unwrap()
    }

    #[test]
    fn amount_counts_full_multiples() {
        let d = three_for_2000(None);
        assert_eq!(d.amount_for(7), 4_000);
        assert_eq!(d.amount_for(2), 0);
        assert_eq!(d.amount_for(9), 6_000);
    }

    #[test]
    fn scoped_discount_rejects_other_inventory() {
        let d = three_for_2000(Some(InventoryId(1)));
        assert!(d.ensure_applicable(InventoryId(1)).is_ok());
        let err = d.ensure_applicable(InventoryId(2)).unwrap_err();
        assert_eq!(err.message(), "Discount is not applicable to this inventory");
    }

    #[test]
    fn global_discount_applies_everywhere() {
        let d = three_for_2000(None);
        assert!(d.applies_to(InventoryId(1)));
        assert!(d.applies_to(InventoryId(99)));
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        assert!(Discount::new(DiscountId(1), "x", None, 0, 10).is_err());
        assert!(Discount::new(DiscountId(1), "x", None, 2, -1).is_err());
        assert!(Discount::new(DiscountId(1), " ", None, 2, 1).is_err());
    }

    proptest! {
        #[test]
        fn amount_is_floor_of_multiples(
            quantity in 0i64..10_000,
            multiple in 1i64..100,
            amount in 0i64..100_000,
        ) {
            let d = Discount::new(DiscountId(1), "d", None, multiple, amount).unwrap();
            let got = d.amount_for(quantity);
            prop_assert_eq!(got, (quantity / multiple) * amount);
            prop_assert!(got <= quantity * amount);
        }
    }
}

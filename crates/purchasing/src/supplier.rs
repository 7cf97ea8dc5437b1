use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tally_core::{DomainError, DomainResult, Entity};
use tally_inventory::InventoryId;

tally_core::numeric_id!(
    /// Supplier identifier.
    SupplierId(u64),
    "SupplierId"
);

/// A supplier and the units it sells in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub phone: Option<String>,
    /// Internal units per supplier unit, per inventory. Missing means 1.
    conversions: BTreeMap<InventoryId, i64>,
}

impl Supplier {
    pub fn new(id: SupplierId, name: impl Into<String>, phone: Option<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("Supplier name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            phone,
            conversions: BTreeMap::new(),
        })
    }

    pub fn rename(&mut self, name: impl Into<String>) -> DomainResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("Supplier name cannot be empty"));
        }
        self.name = name;
        Ok(())
    }

    pub fn conversion_for(&self, inventory_id: InventoryId) -> i64 {
        self.conversions.get(&inventory_id).copied().unwrap_or(1)
    }

    pub fn set_conversion(&mut self, inventory_id: InventoryId, factor: i64) -> DomainResult<()> {
        if factor <= 0 {
            return Err(DomainError::validation("Conversion factor must be positive"));
        }
        if factor == 1 {
            self.conversions.remove(&inventory_id);
        } else {
            self.conversions.insert(inventory_id, factor);
        }
        Ok(())
    }

    pub fn conversions(&self) -> impl Iterator<Item = (InventoryId, i64)> + '_ {
        self.conversions.iter().map(|(k, v)| (*k, *v))
    }
}

impl Entity for Supplier {
    type Id = SupplierId;
    const KIND: &'static str = "Supplier";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

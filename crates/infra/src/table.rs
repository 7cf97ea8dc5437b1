use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use tally_core::{DomainError, DomainResult, Entity};

/// Records of one kind, keyed and ordered by id.
///
/// Serialized as a plain list of rows so non-string ids (timestamps, integers)
/// survive JSON.
pub struct Table<E: Entity> {
    rows: BTreeMap<E::Id, E>,
}

impl<E: Entity> Table<E> {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: E::Id) -> DomainResult<&E> {
        self.rows.get(&id).ok_or_else(|| missing::<E>(id))
    }

    pub fn get_mut(&mut self, id: E::Id) -> DomainResult<&mut E> {
        self.rows.get_mut(&id).ok_or_else(|| missing::<E>(id))
    }

    pub fn find(&self, id: E::Id) -> Option<&E> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: E::Id) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn insert(&mut self, row: E) -> Option<E> {
        self.rows.insert(*row.id(), row)
    }

    pub fn remove(&mut self, id: E::Id) -> DomainResult<E> {
        self.rows.remove(&id).ok_or_else(|| missing::<E>(id))
    }

    pub fn values(&self) -> impl Iterator<Item = &E> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn missing<E: Entity>(id: E::Id) -> DomainError {
    DomainError::not_found(format!("{} {} does not exist", E::KIND, id))
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity + Clone> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
        }
    }
}

impl<E: Entity + PartialEq> PartialEq for Table<E> {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for Table<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rows.values()).finish()
    }
}

impl<E: Entity + Serialize> Serialize for Table<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows.values())
    }
}

impl<'de, E: Entity + DeserializeOwned> Deserialize<'de> for Table<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<E>::deserialize(deserializer)?;
        let mut table = Table::new();
        for row in rows {
            if table.insert(row).is_some() {
                return Err(serde::de::Error::custom(format!(
                    "duplicate {} row",
                    E::KIND
                )));
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_sales::{Discount, DiscountId};

    fn discount(id: u64) -> Discount {
        Discount::new(DiscountId(id), format!("promo {id}"), None, 3, 1_000).unwrap()
    }

    #[test]
    fn missing_rows_are_named_by_kind() {
        let table: Table<Discount> = Table::new();
        let err = table.get(DiscountId(9)).unwrap_err();
        assert_eq!(err.message(), "Discount 9 does not exist");
    }

    #[test]
    fn rows_survive_a_json_round_trip_in_id_order() {
        let mut table = Table::new();
        table.insert(discount(2));
        table.insert(discount(1));

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json[0]["id"], 1);

        let back: Table<Discount> = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let json = serde_json::json!([
            serde_json::to_value(discount(1)).unwrap(),
            serde_json::to_value(discount(1)).unwrap(),
        ]);
        assert!(serde_json::from_value::<Table<Discount>>(json).is_err());
    }
}

//! Supply inventory counters.
//!
//! Two groups of named, non-negative counters (food and medicine) that are
//! mutated additively. A delta that would take a counter below zero leaves
//! it at exactly zero.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Counters
// ============================================================================

/// Food stock held by the shelter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodSupply {
    pub meat: u64,
    pub vegetables: u64,
    pub fruits: u64,
    pub water: u64,
}

/// Medicine stock held by the shelter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineSupply {
    pub antibiotics: u64,
    pub analgesics: u64,
    pub bandages: u64,
}

/// Snapshot of every supply counter.
///
/// Serializes to the `status` response document:
/// `{"food": {...}, "medicine": {...}}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyState {
    pub food: FoodSupply,
    pub medicine: MedicineSupply,
}

impl SupplyState {
    /// Applies every present field of `delta`; missing fields are untouched.
    pub fn apply(&mut self, delta: &SupplyDelta) {
        if let Some(food) = &delta.food {
            apply_field(&mut self.food.meat, food.meat);
            apply_field(&mut self.food.vegetables, food.vegetables);
            apply_field(&mut self.food.fruits, food.fruits);
            apply_field(&mut self.food.water, food.water);
        }
        if let Some(medicine) = &delta.medicine {
            apply_field(&mut self.medicine.antibiotics, medicine.antibiotics);
            apply_field(&mut self.medicine.analgesics, medicine.analgesics);
            apply_field(&mut self.medicine.bandages, medicine.bandages);
        }
    }
}

fn apply_field(counter: &mut u64, delta: Option<i64>) {
    if let Some(delta) = delta {
        *counter = apply_delta(*counter, delta);
    }
}

/// Adds a signed delta to a counter, flooring at zero.
pub fn apply_delta(current: u64, delta: i64) -> u64 {
    if delta >= 0 {
        current.saturating_add(delta.unsigned_abs())
    } else {
        current.saturating_sub(delta.unsigned_abs())
    }
}

// ============================================================================
// Deltas
// ============================================================================

/// Signed changes to food counters. `None` means "leave unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vegetables: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fruits: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water: Option<i64>,
}

/// Signed changes to medicine counters. `None` means "leave unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antibiotics: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analgesics: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandages: Option<i64>,
}

/// The body of an `update` request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food: Option<FoodDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medicine: Option<MedicineDelta>,
}

impl SupplyDelta {
    /// Sets one field by its wire names (`"food"`, `"fruits"`).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownSupply` if the pair does not name a counter.
    pub fn set(&mut self, category: &str, item: &str, value: i64) -> DomainResult<()> {
        let slot = match category {
            "food" => {
                let food = self.food.get_or_insert_with(FoodDelta::default);
                match item {
                    "meat" => Some(&mut food.meat),
                    "vegetables" => Some(&mut food.vegetables),
                    "fruits" => Some(&mut food.fruits),
                    "water" => Some(&mut food.water),
                    _ => None,
                }
            }
            "medicine" => {
                let medicine = self.medicine.get_or_insert_with(MedicineDelta::default);
                match item {
                    "antibiotics" => Some(&mut medicine.antibiotics),
                    "analgesics" => Some(&mut medicine.analgesics),
                    "bandages" => Some(&mut medicine.bandages),
                    _ => None,
                }
            }
            _ => None,
        };

        match slot {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(DomainError::UnknownSupply {
                category: category.to_string(),
                item: item.to_string(),
            }),
        }
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.food.map_or(true, |f| f == FoodDelta::default())
            && self.medicine.map_or(true, |m| m == MedicineDelta::default())
    }
}

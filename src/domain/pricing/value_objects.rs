use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::order::{BuyerId, SellerId};

// ============================================================================
// Pricing Value Objects
// ============================================================================

/// Amount in the smallest currency unit.
pub type Money = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceId(pub i64);

impl fmt::Display for PriceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog item reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discount level a seller grants a buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Normal,
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }

    /// Slot of the four-price array this tier reads.
    pub fn slot_index(&self) -> usize {
        match self {
            Tier::Normal => 0,
            Tier::Bronze => 1,
            Tier::Silver => 2,
            Tier::Gold => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Tier::Normal),
            "bronze" => Ok(Tier::Bronze),
            "silver" => Ok(Tier::Silver),
            "gold" => Ok(Tier::Gold),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Four normalized prices, highest (normal) first.
pub type TierPrices = [Money; 4];

/// Price configuration for one (seller, item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSlot {
    pub id: PriceId,
    pub seller_id: SellerId,
    pub item_id: ItemId,
    pub unit: String,
    pub ratio: i32,
    pub prices: TierPrices,
    pub active: bool,
}

/// Slot contents before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceSlot {
    pub seller_id: SellerId,
    pub item_id: ItemId,
    pub unit: String,
    pub ratio: i32,
    pub prices: TierPrices,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerSellerRelation {
    pub buyer_id: BuyerId,
    pub seller_id: SellerId,
    pub tier: Tier,
    pub active: bool,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_round_trip() {
        for tier in [Tier::Normal, Tier::Bronze, Tier::Silver, Tier::Gold] {
            assert_eq!(tier.as_str().parse::<Tier>().unwrap(), tier);
        }
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        let json = serde_json::to_string(&Tier::Silver).unwrap();
        assert_eq!(json, "\"silver\"");
    }

    #[test]
    fn test_default_tier_is_normal() {
        assert_eq!(Tier::default(), Tier::Normal);
    }
}

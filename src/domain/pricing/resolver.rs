use std::sync::Arc;

use crate::domain::order::{BuyerId, SellerId};
use crate::repository::RelationRepository;

use super::errors::PricingError;
use super::value_objects::{BuyerSellerRelation, Money, Tier, TierPrices};

// ============================================================================
// Price Tier Resolver
// ============================================================================
//
// - Which tier a buyer gets from a seller
// - Normalizing a seller's raw price list into four descending slots
// - Picking the charged price for a tier
//
// ============================================================================

/// Tier granted by a relation row. Missing or inactive relations price at
/// `Normal`; inactivity only hides the buyer from the seller's listings.
pub fn tier_for(relation: Option<&BuyerSellerRelation>) -> Tier {
    match relation {
        Some(relation) if relation.active => relation.tier,
        _ => Tier::Normal,
    }
}

/// Normalize raw tier prices into four descending, non-zero slots.
///
/// Zero entries take the value of the nearest earlier entry; leading zeros
/// take the left-most non-zero price. Non-positive values are then dropped,
/// the rest sorted descending and padded with the lowest value. Returns
/// `None` when nothing positive remains.
pub fn normalize_price(raw: &[Money]) -> Option<TierPrices> {
    let left_most = raw.iter().copied().find(|price| *price > 0).unwrap_or(0);

    let mut filled: Vec<Money> = Vec::with_capacity(raw.len());
    for &price in raw {
        let value = if price != 0 {
            price
        } else {
            filled.last().copied().unwrap_or(left_most)
        };
        filled.push(value);
    }

    filled.retain(|price| *price > 0);
    filled.sort_unstable_by(|a, b| b.cmp(a));
    filled.truncate(4);

    let lowest = *filled.last()?;
    let mut slots = [lowest; 4];
    slots[..filled.len()].copy_from_slice(&filled);
    Some(slots)
}

/// Price charged at `tier`. A zero slot falls back to the base price.
pub fn pick_price(prices: &TierPrices, tier: Tier) -> Money {
    let candidate = prices[tier.slot_index()];
    if candidate != 0 {
        candidate
    } else {
        prices[0]
    }
}

/// Resolves tiers through the relation directory.
#[derive(Clone)]
pub struct TierResolver {
    relations: Arc<dyn RelationRepository>,
}

impl TierResolver {
    pub fn new(relations: Arc<dyn RelationRepository>) -> Self {
        Self { relations }
    }

    pub async fn resolve(&self, buyer: BuyerId, seller: SellerId) -> Result<Tier, PricingError> {
        let relation = self.relations.find(buyer, seller).await?;
        let tier = tier_for(relation.as_ref());

        tracing::debug!(
            buyer_id = %buyer,
            seller_id = %seller,
            tier = %tier,
            relation_found = relation.is_some(),
            "Resolved price tier"
        );

        Ok(tier)
    }
}

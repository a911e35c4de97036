use std::sync::Arc;

use crate::domain::order::{BuyerId, SellerId};
use crate::repository::{PriceRepository, RelationRepository};

use super::errors::PricingError;
use super::resolver::normalize_price;
use super::value_objects::{BuyerSellerRelation, ItemId, Money, NewPriceSlot, PriceSlot, Tier};

// ============================================================================
// Price Book - Seller Price Slots & Buyer Relations
// ============================================================================

pub struct PriceBook {
    prices: Arc<dyn PriceRepository>,
    relations: Arc<dyn RelationRepository>,
}

impl PriceBook {
    pub fn new(prices: Arc<dyn PriceRepository>, relations: Arc<dyn RelationRepository>) -> Self {
        Self { prices, relations }
    }

    /// Replace the active slot of (seller, item).
    ///
    /// Every active slot is deactivated; a new one is inserted only when the
    /// raw prices normalize to something. Old slots keep their values so
    /// existing order items still point at the price they were charged.
    pub async fn replace_slot(
        &self,
        seller: SellerId,
        item: ItemId,
        unit: &str,
        raw_prices: &[Money],
        ratio: i32,
    ) -> Result<Option<PriceSlot>, PricingError> {
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(PricingError::EmptyUnit);
        }

        let slot = normalize_price(raw_prices).map(|prices| NewPriceSlot {
            seller_id: seller,
            item_id: item,
            unit: unit.to_string(),
            ratio: ratio.max(1),
            prices,
        });

        let replacement = self.prices.replace_active(seller, item, slot).await?;

        tracing::info!(
            seller_id = %seller,
            item_id = %item,
            deactivated = replacement.deactivated.len(),
            inserted = ?replacement.inserted.as_ref().map(|slot| slot.id.0),
            "Replaced price slot"
        );

        Ok(replacement.inserted)
    }

    /// Create an active `normal` relation, or re-activate an existing one
    /// keeping its tier.
    pub async fn activate_relation(
        &self,
        seller: SellerId,
        buyer: BuyerId,
    ) -> Result<BuyerSellerRelation, PricingError> {
        let relation = match self.relations.find(buyer, seller).await? {
            Some(existing) => BuyerSellerRelation {
                active: true,
                ..existing
            },
            None => BuyerSellerRelation {
                buyer_id: buyer,
                seller_id: seller,
                tier: Tier::Normal,
                active: true,
                notes: None,
            },
        };

        self.relations.save(&relation).await?;
        tracing::info!(seller_id = %seller, buyer_id = %buyer, tier = %relation.tier, "Activated buyer relation");

        Ok(relation)
    }

    /// Returns whether a relation existed.
    pub async fn deactivate_relation(&self, seller: SellerId, buyer: BuyerId) -> Result<bool, PricingError> {
        let Some(existing) = self.relations.find(buyer, seller).await? else {
            return Ok(false);
        };

        self.relations
            .save(&BuyerSellerRelation {
                active: false,
                ..existing
            })
            .await?;
        tracing::info!(seller_id = %seller, buyer_id = %buyer, "Deactivated buyer relation");

        Ok(true)
    }

    pub async fn change_tier(
        &self,
        seller: SellerId,
        buyer: BuyerId,
        tier: Tier,
    ) -> Result<BuyerSellerRelation, PricingError> {
        let existing = self
            .relations
            .find(buyer, seller)
            .await?
            .ok_or(PricingError::RelationNotFound { buyer, seller })?;

        let relation = BuyerSellerRelation { tier, ..existing };
        self.relations.save(&relation).await?;
        tracing::info!(seller_id = %seller, buyer_id = %buyer, tier = %tier, "Changed buyer tier");

        Ok(relation)
    }
}

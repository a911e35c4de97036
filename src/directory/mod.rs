use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::order::{BuyerId, SellerId};
use crate::domain::pricing::ItemId;

// ============================================================================
// Directories - Party & Catalog Lookups
// ============================================================================
//
// Read-only collaborators used to shape responses. Profiles and catalog
// entries are owned elsewhere; this crate only reads them.
//
// ============================================================================

pub mod image;

pub use image::{sized_url, ImageVariants, DEFAULT_CDN_PREFIX};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyProfile {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl PartyProfile {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: None,
            phone: None,
        }
    }
}

/// Catalog entry as stored, with the raw image URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub item_id: ItemId,
    pub name: String,
    pub category: Option<String>,
    pub image: Option<String>,
}

/// Catalog entry as returned to clients, with CDN image variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: ItemId,
    pub name: String,
    pub category: Option<String>,
    #[serde(flatten)]
    pub images: Option<ImageVariants>,
}

impl CatalogEntry {
    pub fn with_variants(&self, cdn_prefix: &str) -> CatalogItem {
        CatalogItem {
            item_id: self.item_id,
            name: self.name.clone(),
            category: self.category.clone(),
            images: self
                .image
                .as_deref()
                .and_then(|url| ImageVariants::from_url(cdn_prefix, url)),
        }
    }
}

#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn buyer(&self, id: BuyerId) -> Result<Option<PartyProfile>>;

    async fn seller(&self, id: SellerId) -> Result<Option<PartyProfile>>;
}

#[async_trait]
pub trait CatalogDirectory: Send + Sync {
    /// Entries for the known ids; unknown ids are skipped.
    async fn items(&self, ids: &[ItemId]) -> Result<Vec<CatalogEntry>>;
}

/// Fixed in-process directory for the demo binary and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    buyers: HashMap<BuyerId, PartyProfile>,
    sellers: HashMap<SellerId, PartyProfile>,
    catalog: HashMap<ItemId, CatalogEntry>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buyer(mut self, profile: PartyProfile) -> Self {
        self.buyers.insert(BuyerId(profile.id), profile);
        self
    }

    pub fn with_seller(mut self, profile: PartyProfile) -> Self {
        self.sellers.insert(SellerId(profile.id), profile);
        self
    }

    pub fn with_item(mut self, entry: CatalogEntry) -> Self {
        self.catalog.insert(entry.item_id, entry);
        self
    }
}

#[async_trait]
impl PartyDirectory for StaticDirectory {
    async fn buyer(&self, id: BuyerId) -> Result<Option<PartyProfile>> {
        Ok(self.buyers.get(&id).cloned())
    }

    async fn seller(&self, id: SellerId) -> Result<Option<PartyProfile>> {
        Ok(self.sellers.get(&id).cloned())
    }
}

#[async_trait]
impl CatalogDirectory for StaticDirectory {
    async fn items(&self, ids: &[ItemId]) -> Result<Vec<CatalogEntry>> {
        Ok(ids.iter().filter_map(|id| self.catalog.get(id).cloned()).collect())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::pricing::{Money, PriceId};

use super::value_objects::{BuyerId, SellerId};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// One requested line: a price slot and how many units of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub price_id: PriceId,
    pub quantity: i64,
}

impl RequestedLine {
    pub fn new(price_id: i64, quantity: i64) -> Self {
        Self {
            price_id: PriceId(price_id),
            quantity,
        }
    }
}

/// Additional charge as submitted by a client. Fields stay untyped until the
/// ledger validates them; malformed entries are dropped there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAdditional {
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub unit: Value,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub price: Value,
}

/// Buyer-facing order creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub buyer_id: BuyerId,
    pub seller_id: SellerId,
    pub address: Option<String>,
    pub is_cod: bool,
    #[serde(default)]
    pub delivery_fee: Money,
    pub notes: Option<String>,
    pub lines: Vec<RequestedLine>,
    /// `None` writes no additionals at all.
    pub additionals: Option<Vec<RawAdditional>>,
}

#[derive(Debug, Clone)]
pub enum OrderCommand {
    Accept {
        lines: Vec<RequestedLine>,
        additionals: Option<Vec<RawAdditional>>,
        notes: Option<String>,
    },
    Draft {
        lines: Vec<RequestedLine>,
        additionals: Option<Vec<RawAdditional>>,
    },
    Assign,
    Deliver,
    Cancel {
        notes: Option<String>,
    },
}

impl OrderCommand {
    pub fn operation(&self) -> &'static str {
        match self {
            OrderCommand::Accept { .. } => "accept",
            OrderCommand::Draft { .. } => "draft",
            OrderCommand::Assign => "assign",
            OrderCommand::Deliver => "deliver",
            OrderCommand::Cancel { .. } => "cancel",
        }
    }

    /// Lines and additionals carried by content-rewriting commands.
    pub fn contents(&self) -> Option<(&[RequestedLine], Option<&[RawAdditional]>)> {
        match self {
            OrderCommand::Accept {
                lines, additionals, ..
            }
            | OrderCommand::Draft { lines, additionals } => {
                Some((lines.as_slice(), additionals.as_deref()))
            }
            _ => None,
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::order::RawAdditional;
use crate::domain::pricing::{ItemId, Money, PriceId};

use super::revision::Revision;

// ============================================================================
// Line-Item Rows & Batches
// ============================================================================
//
// Rows are written once and never updated. Every row of one edit shares the
// batch revision; an order's current contents are the rows carrying its
// highest revision.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: ItemId,
    pub unit: String,
    pub quantity: i64,
    /// Unit price captured at write time.
    pub price: Money,
    pub price_id: PriceId,
    pub revision: Revision,
}

impl OrderItem {
    /// `None` when quantity x price does not fit in [`Money`].
    pub fn checked_total(&self) -> Option<Money> {
        self.quantity.checked_mul(self.price)
    }

    /// Saturates at the [`Money`] bounds.
    pub fn total(&self) -> Money {
        self.quantity.saturating_mul(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAdditional {
    pub name: String,
    pub unit: String,
    pub quantity: i64,
    pub price: Money,
    pub revision: Revision,
}

impl OrderAdditional {
    /// Validate a client-submitted additional. Returns `None` for entries
    /// that must be dropped: empty or non-string name/unit, a quantity that is
    /// not an integer `>= 0`, or a price that is not an integer.
    pub fn from_raw(raw: &RawAdditional, revision: Revision) -> Option<Self> {
        let name = non_empty_string(&raw.name)?;
        let unit = non_empty_string(&raw.unit)?;
        let quantity = integer(&raw.quantity).filter(|quantity| *quantity >= 0)?;
        let price = integer(&raw.price)?;

        Some(Self {
            name,
            unit,
            quantity,
            price,
            revision,
        })
    }
}

fn non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Integer reading of a JSON value. Numbers truncate toward zero; strings
/// parse their leading integer (`"12 pcs"` reads as 12).
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => leading_integer(s),
        _ => None,
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());

    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Rows produced by one edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemBatch {
    pub revision: Revision,
    pub items: Vec<OrderItem>,
    pub additionals: Vec<OrderAdditional>,
}

impl LineItemBatch {
    pub fn empty(revision: Revision) -> Self {
        Self {
            revision,
            items: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.items.len() + self.additionals.len()
    }
}

/// A batch together with the revision it supersedes. Storage commits it only
/// when the order's latest revision still equals `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub expected: Option<Revision>,
    pub batch: LineItemBatch,
}

/// Every stored row of one order, across all revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderRows {
    pub items: Vec<OrderItem>,
    pub additionals: Vec<OrderAdditional>,
}

impl OrderRows {
    /// Highest revision present across items and additionals.
    pub fn max_revision(&self) -> Option<Revision> {
        self.items
            .iter()
            .map(|item| item.revision)
            .chain(self.additionals.iter().map(|add| add.revision))
            .max()
    }

    pub fn current_contents(&self) -> OrderContents {
        match self.max_revision() {
            Some(revision) => OrderContents {
                revision: Some(revision),
                items: self
                    .items
                    .iter()
                    .filter(|item| item.revision == revision)
                    .cloned()
                    .collect(),
                additionals: self
                    .additionals
                    .iter()
                    .filter(|add| add.revision == revision)
                    .cloned()
                    .collect(),
            },
            None => OrderContents::default(),
        }
    }

    pub fn version_history(&self) -> VersionHistory {
        let mut history = VersionHistory::new();
        for item in &self.items {
            history.entry(item.revision).or_default().items.push(item.clone());
        }
        for add in &self.additionals {
            history
                .entry(add.revision)
                .or_default()
                .additionals
                .push(add.clone());
        }
        history
    }
}

/// Current contents of an order. `revision` is `None` when it has no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderContents {
    pub revision: Option<Revision>,
    pub items: Vec<OrderItem>,
    pub additionals: Vec<OrderAdditional>,
}

impl OrderContents {
    /// Sum of quantity x price over the items. Additionals are not included.
    /// Saturates at the [`Money`] bounds.
    pub fn items_total(&self) -> Money {
        self.items
            .iter()
            .map(OrderItem::total)
            .fold(0, Money::saturating_add)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionContents {
    pub items: Vec<OrderItem>,
    pub additionals: Vec<OrderAdditional>,
}

pub type VersionHistory = BTreeMap<Revision, RevisionContents>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(item_id: i64, quantity: i64, price: Money, revision: i64) -> OrderItem {
        OrderItem {
            item_id: ItemId(item_id),
            unit: "box".to_string(),
            quantity,
            price,
            price_id: PriceId(item_id * 10),
            revision: Revision(revision),
        }
    }

    fn additional(name: &str, revision: i64) -> OrderAdditional {
        OrderAdditional {
            name: name.to_string(),
            unit: "trip".to_string(),
            quantity: 1,
            price: 5_000,
            revision: Revision(revision),
        }
    }

    fn raw(value: serde_json::Value) -> RawAdditional {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_current_contents_takes_max_revision_only() {
        let rows = OrderRows {
            items: vec![item(1, 2, 100, 10), item(2, 1, 50, 10), item(1, 3, 100, 20)],
            additionals: vec![additional("shipping", 10)],
        };

        let current = rows.current_contents();
        assert_eq!(current.revision, Some(Revision(20)));
        assert_eq!(current.items, vec![item(1, 3, 100, 20)]);
        assert!(current.additionals.is_empty());
    }

    #[test]
    fn test_additionals_alone_can_carry_max_revision() {
        let rows = OrderRows {
            items: vec![item(1, 2, 100, 10)],
            additionals: vec![additional("crating", 30)],
        };

        let current = rows.current_contents();
        assert_eq!(current.revision, Some(Revision(30)));
        assert!(current.items.is_empty());
        assert_eq!(current.additionals.len(), 1);
    }

    #[test]
    fn test_current_contents_empty_without_rows() {
        let current = OrderRows::default().current_contents();
        assert_eq!(current, OrderContents::default());
        assert!(current.revision.is_none());
    }

    #[test]
    fn test_current_contents_is_stable_across_reads() {
        let rows = OrderRows {
            items: vec![item(1, 2, 100, 10), item(3, 4, 25, 15)],
            additionals: vec![additional("shipping", 15)],
        };
        assert_eq!(rows.current_contents(), rows.current_contents());
    }

    #[test]
    fn test_version_history_groups_by_revision() {
        let rows = OrderRows {
            items: vec![item(1, 2, 100, 10), item(1, 3, 100, 20)],
            additionals: vec![additional("shipping", 10)],
        };

        let history = rows.version_history();
        assert_eq!(history.keys().copied().collect::<Vec<_>>(), vec![Revision(10), Revision(20)]);
        assert_eq!(history[&Revision(10)].items.len(), 1);
        assert_eq!(history[&Revision(10)].additionals.len(), 1);
        assert!(history[&Revision(20)].additionals.is_empty());
    }

    #[test]
    fn test_items_total_ignores_additionals() {
        let contents = OrderContents {
            revision: Some(Revision(1)),
            items: vec![item(1, 2, 100, 1), item(2, 3, 10, 1)],
            additionals: vec![additional("shipping", 1)],
        };
        assert_eq!(contents.items_total(), 230);
    }

    #[test]
    fn test_totals_saturate_instead_of_overflowing() {
        let huge = item(1, i64::MAX / 2, 3, 1);
        assert_eq!(huge.checked_total(), None);
        assert_eq!(huge.total(), Money::MAX);

        let fits = item(2, i64::MAX / 2, 2, 1);
        assert_eq!(fits.checked_total(), Some(i64::MAX - 1));

        let contents = OrderContents {
            revision: Some(Revision(1)),
            items: vec![fits.clone(), fits],
            additionals: Vec::new(),
        };
        assert_eq!(contents.items_total(), Money::MAX);
    }

    #[test]
    fn test_additional_validation() {
        let r = Revision(1);

        let valid = OrderAdditional::from_raw(
            &raw(json!({"name": "pallet", "unit": "pcs", "quantity": 2, "price": 15000})),
            r,
        )
        .unwrap();
        assert_eq!(valid.quantity, 2);
        assert_eq!(valid.price, 15_000);

        let from_strings = OrderAdditional::from_raw(
            &raw(json!({"name": "pallet", "unit": "pcs", "quantity": "3", "price": "1200"})),
            r,
        )
        .unwrap();
        assert_eq!((from_strings.quantity, from_strings.price), (3, 1200));

        let zero_quantity = raw(json!({"name": "note", "unit": "pcs", "quantity": 0, "price": 0}));
        assert!(OrderAdditional::from_raw(&zero_quantity, r).is_some());

        let rejected = [
            json!({"name": "", "unit": "pcs", "quantity": 1, "price": 1}),
            json!({"name": 7, "unit": "pcs", "quantity": 1, "price": 1}),
            json!({"name": "x", "quantity": 1, "price": 1}),
            json!({"name": "x", "unit": "pcs", "quantity": -1, "price": 1}),
            json!({"name": "x", "unit": "pcs", "quantity": "many", "price": 1}),
            json!({"name": "x", "unit": "pcs", "quantity": 1}),
            json!({"name": "x", "unit": "pcs", "quantity": 1, "price": "free"}),
        ];
        for value in rejected {
            assert!(OrderAdditional::from_raw(&raw(value.clone()), r).is_none(), "{}", value);
        }
    }

    #[test]
    fn test_leading_integer_parsing() {
        assert_eq!(leading_integer("12 pcs"), Some(12));
        assert_eq!(leading_integer("  -4"), Some(-4));
        assert_eq!(leading_integer("+8"), Some(8));
        assert_eq!(leading_integer("pcs"), None);
        assert_eq!(leading_integer(""), None);
    }
}

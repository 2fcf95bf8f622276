//! Cart Aggregate
//!
//! Every operation takes the current cart by reference and returns the next
//! cart. The input value is never touched, which is what lets the service
//! layer compare before/after carts and skip redundant writes.

use serde::{Deserialize, Serialize};
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, ProductId, Quantity};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Price at the moment the product was first added.
    pub unit_price: Money,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl CartLine {
    pub fn snapshot(product: &Product) -> Self {
        Self {
            product_id: product.id().clone(),
            quantity: Quantity::ONE,
            unit_price: product.price(),
            name: product.name().to_string(),
            image: product.image().map(str::to_string),
            category: product.category().map(str::to_string),
        }
    }

    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub count: u64,
    pub total: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Builds a cart from stored lines, folding any repeated product into its first line.
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut merged: Vec<CartLine> = Vec::new();
        for line in lines {
            match merged.iter_mut().find(|l| l.product_id == line.product_id) {
                Some(existing) => {
                    let sum = i64::from(existing.quantity.value()) + i64::from(line.quantity.value());
                    existing.quantity = Quantity::clamped(sum);
                }
                None => merged.push(line),
            }
        }
        Self { lines: merged }
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> { self.lines.iter().find(|l| &l.product_id == product_id) }
    pub fn quantity_of(&self, product_id: &ProductId) -> Option<Quantity> { self.line(product_id).map(|l| l.quantity) }
    pub fn into_lines(self) -> Vec<CartLine> { self.lines }

    /// Adds one unit of `product`. An existing line keeps its position and its original price snapshot.
    pub fn add_item(&self, product: &Product) -> Cart {
        let mut lines = self.lines.clone();
        match lines.iter_mut().find(|l| &l.product_id == product.id()) {
            Some(existing) => existing.quantity = existing.quantity.increment(),
            None => lines.push(CartLine::snapshot(product)),
        }
        Cart { lines }
    }

    /// Sets an absolute quantity, clamped to at least one. Unknown products leave the cart as it is.
    pub fn set_quantity(&self, product_id: &ProductId, quantity: i64) -> Cart {
        let quantity = Quantity::clamped(quantity);
        let lines = self.lines.iter().cloned().map(|mut l| {
            if &l.product_id == product_id { l.quantity = quantity; }
            l
        }).collect();
        Cart { lines }
    }

    pub fn remove_item(&self, product_id: &ProductId) -> Cart {
        Cart { lines: self.lines.iter().filter(|l| &l.product_id != product_id).cloned().collect() }
    }

    pub fn clear(&self) -> Cart { Cart::new() }

    /// Takes `ordered`'s quantities out of this cart. Lines left with no units are dropped.
    pub fn subtract(&self, ordered: &Cart) -> Cart {
        let lines = self.lines.iter().filter_map(|l| {
            let taken = ordered.quantity_of(&l.product_id).map_or(0, |q| q.value());
            let left = l.quantity.value().saturating_sub(taken);
            (left > 0).then(|| CartLine { quantity: Quantity::clamped(i64::from(left)), ..l.clone() })
        }).collect();
        Cart { lines }
    }

    pub fn totals(&self) -> CartTotals {
        self.lines.iter().fold(CartTotals::default(), |acc, l| CartTotals {
            count: acc.count + u64::from(l.quantity.value()),
            total: acc.total.add(l.line_total()),
        })
    }
}

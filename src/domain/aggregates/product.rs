//! Product Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::domain::value_objects::{Money, ProductId, ValueError};

/// Catalog product as the storefront sees it when a shopper adds it to the cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Money,
    image: Option<String>,
    category: Option<String>,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: Decimal) -> Result<Self, ProductError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(ProductError::MissingName); }
        Ok(Self { id, name, price: Money::new(price)?, image: None, category: None })
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.image = Some(url.into()); self }
    pub fn with_category(mut self, category: impl Into<String>) -> Self { self.category = Some(category.into()); self }

    pub fn id(&self) -> &ProductId { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn price(&self) -> Money { self.price }
    pub fn image(&self) -> Option<&str> { self.image.as_deref() }
    pub fn category(&self) -> Option<&str> { self.category.as_deref() }

    pub fn update_price(&mut self, price: Decimal) -> Result<(), ProductError> {
        self.price = Money::new(price)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error(transparent)]
    Value(#[from] ValueError),
}

//! Read-only catalog view used at checkout.

use serde::{Deserialize, Serialize};

use crate::{Money, ProductId};

/// The game a product tops up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRef {
    pub slug: String,
    pub name: String,
    /// Game code understood by the provider's nickname lookup.
    pub code: String,
}

/// A product as resolved for checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub is_active: bool,
    /// Service code the provider delivers this product under.
    pub provider_code: String,
    pub game: GameRef,
}

impl CheckoutProduct {
    /// Price charged per unit: the discount price when set, else the list price.
    pub fn effective_price(&self) -> Money {
        self.discount_price.unwrap_or(self.price)
    }

    /// Item description sent to the payment gateway.
    pub fn item_description(&self) -> String {
        format!("{} - {}", self.game.name, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(discount: Option<i64>) -> CheckoutProduct {
        CheckoutProduct {
            id: ProductId::new("ml-86"),
            name: "86 Diamonds".to_string(),
            price: Money::new(20000),
            discount_price: discount.map(Money::new),
            is_active: true,
            provider_code: "ML86".to_string(),
            game: GameRef {
                slug: "mobile-legends".to_string(),
                name: "Mobile Legends".to_string(),
                code: "mobilelegends".to_string(),
            },
        }
    }

    #[test]
    fn test_effective_price_prefers_discount() {
        assert_eq!(product(None).effective_price(), Money::new(20000));
        assert_eq!(product(Some(14000)).effective_price(), Money::new(14000));
    }

    #[test]
    fn test_item_description() {
        assert_eq!(
            product(None).item_description(),
            "Mobile Legends - 86 Diamonds"
        );
    }
}

//! Product lookup for checkout.

use domain::{CheckoutProduct, ProductId};
use order_store::CatalogStore;

use crate::error::{Result, SagaError};

/// Resolves sellable products from the catalog.
#[derive(Debug, Clone)]
pub struct CatalogService<C> {
    store: C,
}

impl<C: CatalogStore> CatalogService<C> {
    pub fn new(store: C) -> Self {
        Self { store }
    }

    /// Returns the product if it exists and is for sale.
    #[tracing::instrument(skip(self))]
    pub async fn product_for_checkout(&self, id: &ProductId) -> Result<CheckoutProduct> {
        let product = self
            .store
            .get_product_for_checkout(id)
            .await
            .map_err(|e| SagaError::OrderCreationFailed(format!("catalog lookup failed: {e}")))?;

        match product {
            Some(product) if product.is_active => Ok(product),
            Some(_) => {
                tracing::debug!("product is inactive");
                Err(SagaError::ProductUnavailable(id.clone()))
            }
            None => Err(SagaError::ProductUnavailable(id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{GameRef, Money};
    use order_store::InMemoryCatalogStore;

    fn product(id: &str, is_active: bool) -> CheckoutProduct {
        CheckoutProduct {
            id: ProductId::new(id),
            name: "86 Diamonds".to_string(),
            price: Money::new(16000),
            discount_price: None,
            is_active,
            provider_code: "ML86".to_string(),
            game: GameRef {
                slug: "mobile-legends".to_string(),
                name: "Mobile Legends".to_string(),
                code: "mobilelegends".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_active_product_is_returned() {
        let catalog = CatalogService::new(InMemoryCatalogStore::with_products([product(
            "ml-86", true,
        )]));

        let found = catalog
            .product_for_checkout(&ProductId::new("ml-86"))
            .await
            .unwrap();
        assert_eq!(found.provider_code, "ML86");
    }

    #[tokio::test]
    async fn test_missing_and_inactive_are_unavailable() {
        let catalog = CatalogService::new(InMemoryCatalogStore::with_products([product(
            "ml-off", false,
        )]));

        let inactive = catalog.product_for_checkout(&ProductId::new("ml-off")).await;
        assert!(matches!(inactive, Err(SagaError::ProductUnavailable(_))));

        let missing = catalog.product_for_checkout(&ProductId::new("nope")).await;
        assert!(matches!(missing, Err(SagaError::ProductUnavailable(_))));
    }
}

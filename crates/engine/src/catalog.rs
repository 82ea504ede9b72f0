//! Catalog collaborator boundary.
//!
//! Product, store, and warehouse identity is owned elsewhere; the engine
//! consumes it through this trait. [`StaticCatalog`] is the in-memory
//! implementation used by tests and local wiring.

use std::collections::HashMap;

use ladle_core::{ProductId, StoreId, WarehouseId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catalog lookup failure.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog service could not answer.
    #[error("catalog lookup failed: {0}")]
    Lookup(String),
}

/// Product identity as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Product ID.
    pub id: ProductId,
    /// Stock keeping unit.
    pub sku: String,
    /// Unit of measure (e.g. "kg", "tray").
    pub unit: String,
    /// Shelf life in days, used at intake to derive expiry dates.
    pub shelf_life_days: i32,
    /// Inactive products cannot be ordered.
    pub is_active: bool,
}

/// Read-only catalog operations consumed from the collaborator.
#[allow(async_fn_in_trait)]
pub trait Catalog: Send + Sync {
    /// Look up a product by id.
    async fn product(&self, id: ProductId) -> Result<Option<ProductInfo>, CatalogError>;

    /// The central warehouse all orders are fulfilled from.
    async fn central_warehouse(&self) -> Result<WarehouseId, CatalogError>;

    /// A store's internal warehouse, if the store exists.
    async fn store_warehouse(&self, store_id: StoreId)
        -> Result<Option<WarehouseId>, CatalogError>;
}

/// Fixed catalog for tests and local development.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    products: HashMap<ProductId, ProductInfo>,
    central_warehouse: WarehouseId,
    store_warehouses: HashMap<StoreId, WarehouseId>,
}

impl StaticCatalog {
    /// Create a catalog with the given central warehouse.
    #[must_use]
    pub fn new(central_warehouse: WarehouseId) -> Self {
        Self {
            products: HashMap::new(),
            central_warehouse,
            store_warehouses: HashMap::new(),
        }
    }

    /// Register a product.
    #[must_use]
    pub fn with_product(mut self, product: ProductInfo) -> Self {
        self.products.insert(product.id, product);
        self
    }

    /// Register a store and its internal warehouse.
    #[must_use]
    pub fn with_store(mut self, store_id: StoreId, warehouse_id: WarehouseId) -> Self {
        self.store_warehouses.insert(store_id, warehouse_id);
        self
    }
}

impl Catalog for StaticCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<ProductInfo>, CatalogError> {
        Ok(self.products.get(&id).cloned())
    }

    async fn central_warehouse(&self) -> Result<WarehouseId, CatalogError> {
        Ok(self.central_warehouse)
    }

    async fn store_warehouse(
        &self,
        store_id: StoreId,
    ) -> Result<Option<WarehouseId>, CatalogError> {
        Ok(self.store_warehouses.get(&store_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_catalog_lookups() {
        let catalog = StaticCatalog::new(WarehouseId::new(1))
            .with_product(ProductInfo {
                id: ProductId::new(10),
                sku: "DOUGH-01".to_string(),
                unit: "kg".to_string(),
                shelf_life_days: 14,
                is_active: true,
            })
            .with_store(StoreId::new(5), WarehouseId::new(50));

        assert_eq!(catalog.central_warehouse().await.expect("central"), WarehouseId::new(1));
        assert!(catalog.product(ProductId::new(10)).await.expect("product").is_some());
        assert!(catalog.product(ProductId::new(99)).await.expect("product").is_none());
        assert_eq!(
            catalog.store_warehouse(StoreId::new(5)).await.expect("store"),
            Some(WarehouseId::new(50))
        );
        assert_eq!(catalog.store_warehouse(StoreId::new(6)).await.expect("store"), None);
    }
}

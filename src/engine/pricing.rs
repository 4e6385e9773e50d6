use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::config::PricingConfig;
use crate::error::AppError;
use crate::models::catalog::MenuItem;
use crate::models::order::OrderItem;

#[derive(Debug, Clone, Deserialize)]
pub struct LineItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedItems {
    pub items: Vec<OrderItem>,
    pub subtotal: i64,
}

/// Server-side pricing; client-submitted prices are never consulted.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn max_delivery_km(&self) -> f64 {
        self.config.max_delivery_km
    }

    /// Prices each line from `catalog`, which must only hold the target
    /// restaurant's items.
    pub fn compute_subtotal(
        &self,
        lines: &[LineItemRequest],
        catalog: &HashMap<Uuid, MenuItem>,
    ) -> Result<PricedItems, AppError> {
        if lines.is_empty() {
            return Err(AppError::Validation("order must contain at least one item".to_string()));
        }

        let mut items = Vec::with_capacity(lines.len());
        let mut subtotal: i64 = 0;

        for line in lines {
            if line.quantity == 0 {
                return Err(AppError::Validation(format!(
                    "quantity for {} must be at least 1",
                    line.menu_item_id
                )));
            }

            let menu_item = catalog
                .get(&line.menu_item_id)
                .ok_or_else(|| AppError::ItemNotFound(line.menu_item_id.to_string()))?;

            if !menu_item.available {
                return Err(AppError::ItemUnavailable(menu_item.name.clone()));
            }

            let item = OrderItem {
                menu_item_id: menu_item.id,
                name: menu_item.name.clone(),
                quantity: line.quantity,
                unit_price: menu_item.price,
            };

            subtotal = menu_item
                .price
                .checked_mul(i64::from(line.quantity))
                .and_then(|line_total| subtotal.checked_add(line_total))
                .ok_or_else(|| AppError::Validation("order total is too large".to_string()))?;
            items.push(item);
        }

        Ok(PricedItems { items, subtotal })
    }

    /// `min(base + per_km * distance, max)`, in minor units. Pickup orders pay nothing.
    pub fn compute_delivery_fee(&self, distance_km: Option<f64>) -> i64 {
        let Some(distance_km) = distance_km else {
            return 0;
        };

        let variable = (self.config.per_km_rate as f64 * distance_km.max(0.0)).round() as i64;
        self.config
            .base_fee
            .saturating_add(variable)
            .min(self.config.max_fee)
    }
}

//! Start-up catalog, courier and wallet data loaded from a JSON file.

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::catalog::{MenuItem, Restaurant};
use crate::models::driver::DriverProfile;
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub restaurants: Vec<Restaurant>,
    #[serde(default)]
    pub menu_items: Vec<MenuItem>,
    #[serde(default)]
    pub drivers: Vec<DriverProfile>,
    #[serde(default)]
    pub wallets: Vec<WalletSeed>,
}

#[derive(Debug, Deserialize)]
pub struct WalletSeed {
    pub user_id: Uuid,
    pub balance: i64,
}

impl Seed {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|err| AppError::Internal(format!("invalid seed file: {err}")))
    }

    pub fn apply(self, store: &Store) -> Result<(), AppError> {
        let counts = (
            self.restaurants.len(),
            self.menu_items.len(),
            self.drivers.len(),
            self.wallets.len(),
        );

        for restaurant in self.restaurants {
            store.insert_restaurant(restaurant);
        }
        for item in self.menu_items {
            if !store.restaurants.contains_key(&item.restaurant_id) {
                return Err(AppError::Internal(format!(
                    "menu item {} references unknown restaurant {}",
                    item.id, item.restaurant_id
                )));
            }
            store.insert_menu_item(item);
        }
        for driver in self.drivers {
            store.insert_driver(driver)?;
        }
        for wallet in self.wallets {
            store.wallets.insert(wallet.user_id, wallet.balance);
        }

        info!(
            restaurants = counts.0,
            menu_items = counts.1,
            drivers = counts.2,
            wallets = counts.3,
            "seed data loaded"
        );
        Ok(())
    }
}

pub async fn load(path: &str, store: &Store) -> Result<(), AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::Internal(format!("failed to read seed file {path}: {err}")))?;

    Seed::from_json(&raw)?.apply(store)
}

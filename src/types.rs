//! Wire records shared with the storefront backend.
//!
//! DESIGN
//! ======
//! Field names follow the backend's JSON exactly (`snake_case`, with the
//! catalogue's `basePrice`/`priceModifier` as the only camelCase outliers).
//! Most user fields default when absent so a minimal callback blob such as
//! `{"username":"X","role":"client"}` is still a usable record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// USER
// =============================================================================

/// Access level of a storefront account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Booster,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Booster => "booster",
            Self::Admin => "admin",
        }
    }

    /// Admins only.
    #[must_use]
    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }

    /// Boosters, and admins as a superset of boosters.
    #[must_use]
    pub fn is_booster(self) -> bool {
        matches!(self, Self::Booster | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "booster" => Ok(Self::Booster),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Authenticated storefront user as issued by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Backend user id.
    #[serde(default)]
    pub id: String,
    /// Discord account id the user signed in with.
    #[serde(default)]
    pub discord_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    /// Avatar image URL, if the Discord account has one.
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl User {
    /// `username#1234`, or just the username when there is no discriminator.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

// =============================================================================
// ORDERS
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    PriorityFarm,
    LordBoosting,
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority-farm" => Ok(Self::PriorityFarm),
            "lord-boosting" => Ok(Self::LordBoosting),
            other => Err(format!("unknown service type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterClass {
    Duelist,
    Vanguard,
    Strategist,
}

impl CharacterClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duelist => "duelist",
            Self::Vanguard => "vanguard",
            Self::Strategist => "strategist",
        }
    }
}

impl FromStr for CharacterClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duelist" => Ok(Self::Duelist),
            "vanguard" => Ok(Self::Vanguard),
            "strategist" => Ok(Self::Strategist),
            other => Err(format!("unknown character class: {other}")),
        }
    }
}

/// A boosting order as stored by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub discord_username: String,
    pub service_type: ServiceType,
    pub character_id: String,
    pub character_name: String,
    pub character_class: CharacterClass,
    #[serde(default)]
    pub character_icon: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub booster_id: Option<String>,
    #[serde(default)]
    pub booster_username: Option<String>,
    /// Completion percentage, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    pub price: f64,
    pub payment_method: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_eta")]
    pub eta: String,
    #[serde(default)]
    pub ticket_channel_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_eta() -> String {
    "TBD".to_owned()
}

/// Body of `POST /api/orders`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub service_type: ServiceType,
    pub character_id: String,
    pub character_name: String,
    pub character_class: CharacterClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_icon: Option<String>,
    pub price: f64,
    pub payment_method: String,
}

/// Body of `PATCH /api/orders/{id}`. Only the fields that are set are sent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl OrderPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One page of `GET /api/admin/orders`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdminOrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

/// Entry of `GET /api/admin/boosters`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booster {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub orders_completed: u64,
}

// =============================================================================
// CATALOGUE
// =============================================================================

/// Entry of `GET /api/services`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "priceModifier")]
    pub price_modifier: i64,
}

/// Entry of `GET /api/characters/{class}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(rename = "basePrice")]
    pub base_price: i64,
    #[serde(default)]
    pub icon: Option<String>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

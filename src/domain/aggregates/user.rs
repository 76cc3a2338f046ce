//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::Address;
use crate::domain::value_objects::{Email, ImageBlob};
use crate::store::{Collection, Document};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub default_address: Option<Address>,
    #[serde(default)]
    pub notifications: NotificationPreferences,
    pub avatar: Option<ImageBlob>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] Customer, Admin }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub order_updates: bool,
    pub promotions: bool,
    pub newsletter: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self { Self { order_updates: true, promotions: false, newsletter: false } }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;
    fn id(&self) -> Uuid { self.id }
}

impl User {
    pub fn create(email: Email, name: impl Into<String>, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), email, name: name.into(), phone: None, password_hash, role, default_address: None,
            notifications: NotificationPreferences::default(), avatar: None, created_at: now, updated_at: now, last_login_at: None,
        }
    }

    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// What the API returns for a user. Never carries the password hash or avatar bytes.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub default_address: Option<Address>,
    pub notifications: NotificationPreferences,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id, email: u.email.to_string(), name: u.name.clone(), phone: u.phone.clone(), role: u.role,
            default_address: u.default_address.clone(), notifications: u.notifications,
            avatar_url: u.avatar.as_ref().map(|_| format!("/api/users/{}/avatar", u.id)),
            created_at: u.created_at, last_login_at: u.last_login_at,
        }
    }
}

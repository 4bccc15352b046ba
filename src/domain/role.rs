//! Roles and the permission table consulted before every gated action.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Account role.
///
/// `Management` is the dashboard tier granted to staff; it carries exactly the
/// admin permission set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Management,
    #[default]
    User,
    Guest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "catalog:read")]
    CatalogRead,
    #[serde(rename = "orders:create")]
    OrdersCreate,
    #[serde(rename = "notifications:subscribe")]
    NotificationsSubscribe,
    #[serde(rename = "orders:read_own")]
    OrdersReadOwn,
    #[serde(rename = "profile:read")]
    ProfileRead,
    #[serde(rename = "checkout:quote")]
    CheckoutQuote,
    #[serde(rename = "catalog:write")]
    CatalogWrite,
    #[serde(rename = "catalog:stock")]
    CatalogStock,
    #[serde(rename = "orders:read_all")]
    OrdersReadAll,
    #[serde(rename = "orders:manage")]
    OrdersManage,
    #[serde(rename = "users:read")]
    UsersRead,
    #[serde(rename = "users:manage_roles")]
    UsersManageRoles,
    #[serde(rename = "dashboard:view")]
    DashboardView,
}

const GUEST: &[Permission] = &[
    Permission::CatalogRead,
    Permission::OrdersCreate,
    Permission::NotificationsSubscribe,
];

const USER: &[Permission] = &[
    Permission::OrdersReadOwn,
    Permission::ProfileRead,
    Permission::CheckoutQuote,
];

const ADMIN: &[Permission] = &[
    Permission::CatalogWrite,
    Permission::CatalogStock,
    Permission::OrdersReadAll,
    Permission::OrdersManage,
    Permission::UsersRead,
    Permission::UsersManageRoles,
    Permission::DashboardView,
];

/// Permission set for a role. Tiers are cumulative: admin ⊇ user ⊇ guest.
pub fn permissions_for(role: Role) -> BTreeSet<Permission> {
    let tiers: &[&[Permission]] = match role {
        Role::Guest => &[GUEST],
        Role::User => &[GUEST, USER],
        Role::Admin | Role::Management => &[GUEST, USER, ADMIN],
    };
    tiers.iter().flat_map(|t| t.iter().copied()).collect()
}

impl Role {
    pub fn allows(self, permission: Permission) -> bool {
        permissions_for(self).contains(&permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Management => "management",
            Self::User => "user",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "management" => Ok(Self::Management),
            "user" => Ok(Self::User),
            "guest" => Ok(Self::Guest),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

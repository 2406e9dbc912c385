//! Caller identity as resolved by the external authentication gateway.

use std::str::FromStr;

use common::UserId;
use serde::{Deserialize, Serialize};

/// Role attached to an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    StoreOwner,
    Staff,
    Admin,
    /// Authenticated but restricted; may browse, may not place orders.
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::StoreOwner => "store_owner",
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "store_owner" | "owner" => Ok(Role::StoreOwner),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            "guest" => Ok(Role::Guest),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Guests are authenticated but may not check out.
    pub fn can_place_orders(&self) -> bool {
        self.role != Role::Guest
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Customer".parse::<Role>().unwrap(), Role::Customer);
        assert_eq!("STORE_OWNER".parse::<Role>().unwrap(), Role::StoreOwner);
        assert_eq!("owner".parse::<Role>().unwrap(), Role::StoreOwner);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn role_display_round_trips_through_from_str() {
        for role in [
            Role::Customer,
            Role::StoreOwner,
            Role::Staff,
            Role::Admin,
            Role::Guest,
        ] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn guests_cannot_place_orders() {
        assert!(!Caller::new(UserId::new(), Role::Guest).can_place_orders());
        assert!(Caller::new(UserId::new(), Role::Customer).can_place_orders());
    }
}

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Account type. The numeric id travels in the JWT claims.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
pub enum Role {
    Admin = 1,
    Client = 2,
    Vendor = 3,
    Employee = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Client),
            3 => Some(Role::Vendor),
            4 => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ids_round_trip() {
        for role in [Role::Admin, Role::Client, Role::Vendor, Role::Employee] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(9), None);
    }

    #[test]
    fn parses_user_type_names() {
        assert_eq!(Role::from_str("Vendor").unwrap(), Role::Vendor);
        assert!(Role::from_str("vendor").is_err());
        assert_eq!(serde_json::to_value(Role::Client).unwrap(), "Client");
    }
}

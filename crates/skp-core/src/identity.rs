use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub mod permissions {
    pub const ACHIEVEMENT_CREATE: &str = "achievement:create";
    pub const ACHIEVEMENT_READ: &str = "achievement:read";
    pub const ACHIEVEMENT_UPDATE: &str = "achievement:update";
    pub const ACHIEVEMENT_DELETE: &str = "achievement:delete";
    pub const ACHIEVEMENT_VERIFY: &str = "achievement:verify";
    pub const USER_MANAGE: &str = "user:manage";

    pub const ALL: &[&str] = &[
        ACHIEVEMENT_CREATE,
        ACHIEVEMENT_READ,
        ACHIEVEMENT_UPDATE,
        ACHIEVEMENT_DELETE,
        ACHIEVEMENT_VERIFY,
        USER_MANAGE,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Advisor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Advisor => "advisor",
            Role::Admin => "admin",
        }
    }

    /// Accepts the canonical names plus the campus aliases used by the
    /// account directory (`mahasiswa`, `dosen_wali`, `lecturer`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" | "mahasiswa" => Some(Role::Student),
            "advisor" | "lecturer" | "dosen_wali" => Some(Role::Advisor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verified caller as produced by the token service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub permissions: BTreeSet<String>,
}

impl Identity {
    pub fn new<I, S>(user_id: Uuid, role: Role, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id,
            role,
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_aliases_collapse() {
        assert_eq!(Role::parse("mahasiswa"), Some(Role::Student));
        assert_eq!(Role::parse("Dosen_Wali"), Some(Role::Advisor));
        assert_eq!(Role::parse("lecturer"), Some(Role::Advisor));
        assert_eq!(Role::parse(" admin "), Some(Role::Admin));
        assert_eq!(Role::parse("guest"), None);
    }

    #[test]
    fn permission_lookup() {
        let id = Identity::new(
            Uuid::new_v4(),
            Role::Student,
            [permissions::ACHIEVEMENT_CREATE],
        );
        assert!(id.has_permission("achievement:create"));
        assert!(!id.has_permission(permissions::ACHIEVEMENT_VERIFY));
    }
}

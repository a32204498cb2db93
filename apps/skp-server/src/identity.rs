use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use skp_core::{permissions, Identity, Role};

use crate::directory::DirectoryFile;
use crate::responses::ApiError;
use crate::AppState;

const MAX_TOKEN_PER_USER: usize = 16;

/// Permissions granted when a directory entry does not list its own.
pub fn default_permissions(role: Role) -> Vec<&'static str> {
    match role {
        Role::Student => vec![
            permissions::ACHIEVEMENT_CREATE,
            permissions::ACHIEVEMENT_READ,
            permissions::ACHIEVEMENT_UPDATE,
            permissions::ACHIEVEMENT_DELETE,
        ],
        Role::Advisor => vec![permissions::ACHIEVEMENT_READ, permissions::ACHIEVEMENT_VERIFY],
        Role::Admin => permissions::ALL.to_vec(),
    }
}

/// Bearer token fingerprints mapped to identities.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_token: HashMap<String, Arc<Identity>>,
    diagnostics: Vec<String>,
}

impl IdentityRegistry {
    pub fn from_directory(file: &DirectoryFile) -> Self {
        let mut registry = Self::default();
        for user in &file.users {
            if user.disabled {
                continue;
            }
            let Some(role) = Role::parse(&user.role) else {
                registry
                    .diagnostics
                    .push(format!("user `{}` skipped: unknown role {}", user.username, user.role));
                continue;
            };
            let perms: Vec<String> = match &user.permissions {
                Some(list) => list.iter().map(|p| p.trim().to_string()).collect(),
                None => default_permissions(role)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            };
            let identity = Arc::new(Identity::new(user.id, role, perms));

            let mut tokens = Vec::new();
            for token in &user.token_sha256 {
                let trimmed = token.trim().to_ascii_lowercase();
                if !is_sha256_hex(&trimmed) {
                    registry.diagnostics.push(format!(
                        "user `{}` token ignored: invalid sha256",
                        user.username
                    ));
                    continue;
                }
                tokens.push(trimmed);
            }
            if tokens.len() > MAX_TOKEN_PER_USER {
                registry.diagnostics.push(format!(
                    "user `{}` token count exceeds limit ({})",
                    user.username, MAX_TOKEN_PER_USER
                ));
                continue;
            }
            for fp in tokens {
                if registry.by_token.contains_key(&fp) {
                    registry.diagnostics.push(format!(
                        "fingerprint collision for user `{}`; token skipped",
                        user.username
                    ));
                    continue;
                }
                registry.by_token.insert(fp, identity.clone());
            }
        }
        registry.load_env_tokens();
        for diag in &registry.diagnostics {
            warn!(target: "skp::http", "{diag}");
        }
        info!(
            target: "skp::http",
            tokens = registry.by_token.len(),
            "identity registry loaded"
        );
        registry
    }

    /// `SKP_ADMIN_TOKEN` / `SKP_ADMIN_TOKEN_SHA256` map to an operator admin
    /// with the nil user id.
    fn load_env_tokens(&mut self) {
        let admin = Arc::new(Identity::new(
            Uuid::nil(),
            Role::Admin,
            default_permissions(Role::Admin),
        ));
        if let Ok(value) = std::env::var("SKP_ADMIN_TOKEN") {
            if !value.trim().is_empty() {
                self.by_token
                    .insert(sha256_hex(value.trim()), admin.clone());
            }
        }
        if let Ok(hash) = std::env::var("SKP_ADMIN_TOKEN_SHA256") {
            let trimmed = hash.trim().to_ascii_lowercase();
            if is_sha256_hex(&trimmed) {
                self.by_token.insert(trimmed, admin);
            } else if !trimmed.is_empty() {
                self.diagnostics.push(
                    "SKP_ADMIN_TOKEN_SHA256 is not a valid 64-character hex digest; ignoring"
                        .into(),
                );
            }
        }
    }

    pub fn verify_token(&self, presented: &str) -> Option<Identity> {
        self.by_token
            .get(&sha256_hex(presented))
            .map(|identity| identity.as_ref().clone())
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.chars().all(|ch| ch.is_ascii_hexdigit())
}

pub fn sha256_hex(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn bearer(parts: &Parts) -> Result<&str, ApiError> {
    let raw = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthenticated("missing authorization header"))?
        .to_str()
        .map_err(|_| ApiError::unauthenticated("malformed authorization header"))?;
    match raw.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::unauthenticated(
            "authorization header must use the Bearer scheme",
        )),
    }
}

/// Caller resolved from `Authorization: Bearer <token>`.
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?;
        state
            .identities()
            .verify_token(token)
            .map(Authenticated)
            .ok_or_else(|| ApiError::unauthenticated("invalid or expired token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryUser;
    use crate::test_support::env;

    fn user(name: &str, role: &str, token: &str) -> DirectoryUser {
        DirectoryUser {
            id: Uuid::new_v4(),
            username: name.into(),
            full_name: name.into(),
            email: None,
            role: role.into(),
            permissions: None,
            token_sha256: vec![sha256_hex(token)],
            disabled: false,
        }
    }

    fn registry(users: Vec<DirectoryUser>) -> IdentityRegistry {
        let mut guard = env::guard();
        guard.remove("SKP_ADMIN_TOKEN");
        guard.remove("SKP_ADMIN_TOKEN_SHA256");
        IdentityRegistry::from_directory(&DirectoryFile {
            users,
            ..Default::default()
        })
    }

    #[test]
    fn tokens_resolve_to_role_defaults() {
        let alice = user("alice", "mahasiswa", "alice-token");
        let alice_id = alice.id;
        let reg = registry(vec![alice, user("budi", "dosen_wali", "budi-token")]);

        let student = reg.verify_token("alice-token").expect("alice");
        assert_eq!(student.user_id, alice_id);
        assert_eq!(student.role, Role::Student);
        assert!(student.has_permission(permissions::ACHIEVEMENT_CREATE));
        assert!(!student.has_permission(permissions::ACHIEVEMENT_VERIFY));

        let advisor = reg.verify_token("budi-token").expect("budi");
        assert!(advisor.has_permission(permissions::ACHIEVEMENT_VERIFY));
        assert!(reg.verify_token("nope").is_none());
    }

    #[test]
    fn explicit_permissions_override_defaults() {
        let mut u = user("readonly", "student", "ro");
        u.permissions = Some(vec![permissions::ACHIEVEMENT_READ.into()]);
        let reg = registry(vec![u]);
        let id = reg.verify_token("ro").unwrap();
        assert!(!id.has_permission(permissions::ACHIEVEMENT_CREATE));
    }

    #[test]
    fn bad_entries_are_reported_not_loaded() {
        let mut bad_hash = user("x", "student", "x");
        bad_hash.token_sha256 = vec!["zz".into()];
        let mut disabled = user("d", "student", "d");
        disabled.disabled = true;
        let reg = registry(vec![bad_hash, disabled, user("g", "guest", "g")]);
        assert!(reg.verify_token("d").is_none());
        assert!(reg.verify_token("g").is_none());
        assert_eq!(reg.diagnostics().len(), 2);
    }

    #[test]
    fn env_admin_token_is_accepted() {
        let mut guard = env::guard();
        guard.set("SKP_ADMIN_TOKEN", "ops-secret");
        guard.remove("SKP_ADMIN_TOKEN_SHA256");
        let reg = IdentityRegistry::from_directory(&DirectoryFile::default());
        let admin = reg.verify_token("ops-secret").expect("admin");
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.has_permission(permissions::USER_MANAGE));
    }
}

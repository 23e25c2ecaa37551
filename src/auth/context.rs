use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::claims::AccessClaims;

/// Permission that grants every other permission.
pub const WILDCARD_PERMISSION: &str = "*";

/// Flat set of permission strings. Membership is exact; there is no hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet {
    permissions: HashSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_wildcard(&self) -> bool {
        self.contains(WILDCARD_PERMISSION)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            permissions: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-request identity derived from a verified access token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub organization_id: Option<i64>,
    pub is_super_admin: bool,
    pub permissions: PermissionSet,
    pub roles: Vec<i64>,
}

impl UserContext {
    pub fn from_claims(claims: AccessClaims) -> Self {
        let payload = claims.payload;
        Self {
            user_id: payload.sub,
            organization_id: payload.organization_id,
            is_super_admin: payload.is_super_admin,
            permissions: payload.permissions.into_iter().collect(),
            roles: payload.role_ids,
        }
    }

    /// Organization the caller is confined to; `None` for super-admins, who are unscoped.
    pub fn scoped_organization(&self) -> Option<i64> {
        if self.is_super_admin {
            None
        } else {
            self.organization_id
        }
    }
}

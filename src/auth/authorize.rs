//! Permission checks and organization scoping.
//!
//! Pure policy: no IO, no panics. Super-admins bypass every check here.

use serde_json::Value;
use thiserror::Error;

use super::context::UserContext;

/// Default field carrying a row's organization in JSON payloads.
pub const ORGANIZATION_FIELD: &str = "organizationId";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("missing permission '{0}'")]
    MissingPermission(String),

    #[error("missing any of permissions [{}]", .0.join(", "))]
    MissingAnyPermission(Vec<String>),

    #[error("organization scope does not cover this resource")]
    OrganizationScope,
}

pub fn authorize(ctx: &UserContext, permission: &str) -> Result<(), AuthzError> {
    if ctx.is_super_admin || ctx.permissions.has_wildcard() || ctx.permissions.contains(permission)
    {
        Ok(())
    } else {
        Err(AuthzError::MissingPermission(permission.to_string()))
    }
}

/// Passes when at least one of `permissions` is held. An empty list never passes.
pub fn authorize_any(ctx: &UserContext, permissions: &[&str]) -> Result<(), AuthzError> {
    if ctx.is_super_admin || ctx.permissions.has_wildcard() {
        return Ok(());
    }
    if permissions.iter().any(|p| ctx.permissions.contains(p)) {
        Ok(())
    } else {
        Err(AuthzError::MissingAnyPermission(
            permissions.iter().map(|p| p.to_string()).collect(),
        ))
    }
}

/// Passes when every one of `permissions` is held; reports the first missing one.
pub fn authorize_all(ctx: &UserContext, permissions: &[&str]) -> Result<(), AuthzError> {
    permissions
        .iter()
        .try_for_each(|permission| authorize(ctx, permission))
}

pub fn check_organization_access(ctx: &UserContext, target_organization_id: i64) -> bool {
    if ctx.is_super_admin {
        return true;
    }
    ctx.organization_id == Some(target_organization_id)
}

/// Write-side guard: a context without an organization never passes.
pub fn require_organization_access(
    ctx: &UserContext,
    target_organization_id: i64,
) -> Result<(), AuthzError> {
    if check_organization_access(ctx, target_organization_id) {
        Ok(())
    } else {
        Err(AuthzError::OrganizationScope)
    }
}

/// Scope an untyped payload to the caller's organization.
///
/// Arrays keep only object rows whose `field` matches; any other value is
/// treated as a single row and either passes through or becomes `null`.
pub fn apply_organization_filter(ctx: &UserContext, data: Value, field: &str) -> Value {
    if ctx.is_super_admin {
        return data;
    }
    let Some(organization_id) = ctx.organization_id else {
        return match data {
            Value::Array(_) => Value::Array(Vec::new()),
            _ => Value::Null,
        };
    };

    match data {
        Value::Array(rows) => Value::Array(
            rows.into_iter()
                .filter(|row| row_matches(row, field, organization_id))
                .collect(),
        ),
        row if row_matches(&row, field, organization_id) => row,
        _ => Value::Null,
    }
}

fn row_matches(row: &Value, field: &str, organization_id: i64) -> bool {
    match row.get(field) {
        Some(Value::Number(n)) => n.as_i64() == Some(organization_id),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok() == Some(organization_id),
        _ => false,
    }
}

/// Typed rows that belong to one organization.
pub trait OrganizationScoped {
    fn organization_id(&self) -> Option<i64>;
}

pub fn filter_rows<T: OrganizationScoped>(ctx: &UserContext, rows: Vec<T>) -> Vec<T> {
    if ctx.is_super_admin {
        return rows;
    }
    match ctx.organization_id {
        Some(organization_id) => rows
            .into_iter()
            .filter(|row| row.organization_id() == Some(organization_id))
            .collect(),
        None => Vec::new(),
    }
}

pub fn filter_one<T: OrganizationScoped>(ctx: &UserContext, row: T) -> Option<T> {
    if ctx.is_super_admin {
        return Some(row);
    }
    match (ctx.organization_id, row.organization_id()) {
        (Some(mine), Some(theirs)) if mine == theirs => Some(row),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::PermissionSet;
    use serde_json::json;

    fn ctx(organization_id: Option<i64>, super_admin: bool, permissions: &[&str]) -> UserContext {
        UserContext {
            user_id: "1".into(),
            organization_id,
            is_super_admin: super_admin,
            permissions: permissions.iter().copied().collect::<PermissionSet>(),
            roles: vec![],
        }
    }

    fn rows() -> Value {
        json!([
            {"id": 1, "organizationId": 1},
            {"id": 2, "organizationId": 2},
            {"id": 3, "organizationId": "1"},
            {"id": 4}
        ])
    }

    #[test]
    fn super_admin_always_passes() {
        let admin = ctx(None, true, &[]);
        assert!(authorize(&admin, "anything:at-all").is_ok());
        assert!(authorize_any(&admin, &[]).is_ok());
        assert!(authorize_all(&admin, &["a", "b"]).is_ok());
        assert!(check_organization_access(&admin, 99));
    }

    #[test]
    fn wildcard_passes() {
        let wild = ctx(Some(1), false, &["*"]);
        assert!(authorize(&wild, "recipient:delete").is_ok());
    }

    #[test]
    fn exact_membership_only() {
        let reader = ctx(Some(1), false, &["recipient:read"]);
        assert!(authorize(&reader, "recipient:read").is_ok());
        assert_eq!(
            authorize(&reader, "recipient"),
            Err(AuthzError::MissingPermission("recipient".into()))
        );
    }

    #[test]
    fn empty_permission_list_denies() {
        let nobody = ctx(Some(1), false, &[]);
        assert!(authorize(&nobody, "recipient:read").is_err());
        assert!(authorize_any(&nobody, &[]).is_err());
    }

    #[test]
    fn any_and_all_variants() {
        let user = ctx(Some(1), false, &["a", "b"]);
        assert!(authorize_any(&user, &["x", "b"]).is_ok());
        assert!(authorize_any(&user, &["x", "y"]).is_err());
        assert!(authorize_all(&user, &["a", "b"]).is_ok());
        assert_eq!(
            authorize_all(&user, &["a", "c", "d"]),
            Err(AuthzError::MissingPermission("c".into()))
        );
    }

    #[test]
    fn organization_access() {
        let scoped = ctx(Some(1), false, &["*"]);
        assert!(check_organization_access(&scoped, 1));
        assert!(!check_organization_access(&scoped, 2));

        let unscoped = ctx(None, false, &["*"]);
        assert!(!check_organization_access(&unscoped, 1));
        assert_eq!(
            require_organization_access(&unscoped, 1),
            Err(AuthzError::OrganizationScope)
        );
    }

    #[test]
    fn super_admin_filter_is_identity() {
        let admin = ctx(Some(5), true, &[]);
        assert_eq!(apply_organization_filter(&admin, rows(), ORGANIZATION_FIELD), rows());
        let single = json!({"id": 2, "organizationId": 2});
        assert_eq!(
            apply_organization_filter(&admin, single.clone(), ORGANIZATION_FIELD),
            single
        );
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let scoped = ctx(Some(1), false, &[]);
        assert_eq!(
            apply_organization_filter(&scoped, rows(), ORGANIZATION_FIELD),
            json!([{"id": 1, "organizationId": 1}, {"id": 3, "organizationId": "1"}])
        );
    }

    #[test]
    fn cross_organization_request_is_empty_not_error() {
        let scoped = ctx(Some(1), false, &[]);
        let theirs = json!([{"id": 9, "organizationId": 2}]);
        assert_eq!(
            apply_organization_filter(&scoped, theirs, ORGANIZATION_FIELD),
            json!([])
        );
        assert_eq!(
            apply_organization_filter(&scoped, json!({"id": 9, "organizationId": 2}), ORGANIZATION_FIELD),
            Value::Null
        );
    }

    #[test]
    fn no_organization_yields_empty_or_null() {
        let unscoped = ctx(None, false, &["*"]);
        assert_eq!(apply_organization_filter(&unscoped, rows(), ORGANIZATION_FIELD), json!([]));
        assert_eq!(
            apply_organization_filter(&unscoped, json!({"id": 1, "organizationId": 1}), ORGANIZATION_FIELD),
            Value::Null
        );
    }

    #[test]
    fn custom_field_name() {
        let scoped = ctx(Some(4), false, &[]);
        let data = json!([{"orgId": 4}, {"organizationId": 4}]);
        assert_eq!(apply_organization_filter(&scoped, data, "orgId"), json!([{"orgId": 4}]));
    }

    struct Row(Option<i64>);

    impl OrganizationScoped for Row {
        fn organization_id(&self) -> Option<i64> {
            self.0
        }
    }

    #[test]
    fn typed_filters() {
        let scoped = ctx(Some(1), false, &[]);
        let kept = filter_rows(&scoped, vec![Row(Some(1)), Row(Some(2)), Row(None)]);
        assert_eq!(kept.len(), 1);
        assert!(filter_one(&scoped, Row(Some(2))).is_none());
        assert!(filter_one(&scoped, Row(Some(1))).is_some());

        let unscoped = ctx(None, false, &[]);
        assert!(filter_rows(&unscoped, vec![Row(Some(1))]).is_empty());
        assert!(filter_one(&unscoped, Row(None)).is_none());

        let admin = ctx(None, true, &[]);
        assert_eq!(filter_rows(&admin, vec![Row(None), Row(Some(3))]).len(), 2);
    }
}

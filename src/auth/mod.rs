pub mod authorize;
pub mod claims;
pub mod codec;
pub mod context;
pub mod resolver;
pub mod revocation;

pub use authorize::{
    apply_organization_filter, authorize, authorize_all, authorize_any, check_organization_access,
    filter_one, filter_rows, require_organization_access, AuthzError, OrganizationScoped,
    ORGANIZATION_FIELD,
};
pub use claims::{AccessClaims, AccessPayload, RefreshClaims, RefreshPayload, TokenUse};
pub use codec::{InvalidToken, TokenCodec, TokenError, TokenSettings};
pub use context::{PermissionSet, UserContext, WILDCARD_PERMISSION};
pub use resolver::{IdentityResolver, ResolveError, TokenIdentityResolver};
pub use revocation::{
    InMemoryRevocationList, InMemorySessionRegistry, RevocationStore, SessionRegistry,
};

/// Extract the credential from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

// handlers/public/auth/mod.rs - Token acquisition and lifecycle endpoints
//
// These run through the pipeline with authentication disabled; the edge gate
// lists them as public paths.

use serde::Deserialize;

pub mod login; // POST /api/auth/login
pub mod refresh; // POST /api/auth/refresh
pub mod revoke; // POST /api/auth/revoke

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Middleware: CORS only; the edge gate skips credential checks for these paths

pub mod auth;
pub mod health;

// handlers/protected/mod.rs - Protected handlers (bearer authentication required)
//
// Security Level: access token verified at the edge gate, identity resolved
// again per request by the pipeline
// Route Prefix: /api/*

pub mod recipients; // /api/recipients[/:id]
pub mod reports; // /api/reports/*
pub mod session; // /api/auth/me

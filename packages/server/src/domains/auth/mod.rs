//! Auth domain - admin tokens for roster management
//!
//! Responsibilities:
//! - Signing operator tokens (agents_cli gen-token)
//! - Verifying them for admin-only routes

pub mod jwt;

pub use jwt::{Claims, JwtService, ADMIN_ROLE};

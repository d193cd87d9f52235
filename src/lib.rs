//! MuseDock - a multi-tenant content service
//!
//! Every tenant is a site served on its own domain with pages, a blog
//! and a revision history for all content. A superadmin panel manages
//! tenants and their admin accounts.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

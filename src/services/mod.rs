//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They:
//! - enforce validation and tenant scoping
//! - record revisions for every content save
//! - keep the public cache in step with writes

pub mod auth;
pub mod blog_category;
pub mod blog_post;
pub mod blog_tag;
pub mod content;
pub mod diff;
pub mod maintenance;
pub mod page;
pub mod password;
pub mod rate_limiter;
pub mod revision;
pub mod tenant;

pub use auth::{AuthError, AuthService, LoginInput};
pub use blog_category::BlogCategoryService;
pub use blog_post::BlogPostService;
pub use blog_tag::BlogTagService;
pub use content::{generate_slug, ContentError};
pub use maintenance::{MaintenanceService, PlatformStats};
pub use page::PageService;
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use revision::RevisionService;
pub use tenant::{TenantError, TenantService};

//! Database repositories
//!
//! One repository per entity, each a trait plus an sqlx implementation
//! that dispatches on the configured driver.

pub mod admin;
pub mod blog_category;
pub mod blog_post;
pub mod blog_tag;
pub mod page;
pub mod revision;
pub mod session;
pub mod slug;
pub mod tenant;

pub use admin::{AdminRepository, EmailTaken, SqlxAdminRepository};
pub use blog_category::{BlogCategoryRepository, SqlxBlogCategoryRepository};
pub use blog_post::{BlogPostRepository, SqlxBlogPostRepository};
pub use blog_tag::{BlogTagRepository, SqlxBlogTagRepository};
pub use page::{PageRepository, SqlxPageRepository};
pub use revision::{RestoreTarget, RevisionRepository, SqlxRevisionRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use slug::{SlugRepository, SlugTaken, SqlxSlugRepository};
pub use tenant::{SqlxTenantRepository, TenantRepository};

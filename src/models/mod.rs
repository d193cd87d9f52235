//! Data models
//!
//! Database entities, API inputs and internal transfer types for
//! tenants, admins, pages, the blog and content revisions.

mod admin;
mod blog_category;
mod blog_post;
mod blog_tag;
mod content;
mod page;
mod revision;
mod session;
mod slug;
mod tenant;

pub use admin::{Admin, AdminRole, CreateAdminInput};
pub use blog_category::{BlogCategory, CategoryTree, CreateCategoryInput, UpdateCategoryInput};
pub use blog_post::{BlogPost, CreatePostInput, PublicPostFilter, UpdatePostInput};
pub use blog_tag::{BlogTag, TagInput, TagWithCount};
pub use content::{ContentStatus, ListParams, PagedResult};
pub use page::{ContentFilter, CreatePageInput, Page, UpdatePageInput, DEFAULT_PAGE_TEMPLATE};
pub use revision::{
    Actor, FieldChange, NewRevision, RecordOutcome, Revision, RevisionDiff, RevisionKind, RevisionRef,
    RevisionSnapshot, RevisionSummary, RevisionType,
};
pub use session::Session;
pub use slug::{Slug, SlugModule};
pub use tenant::{CreateTenantInput, Tenant, TenantStatus, UpdateTenantInput};

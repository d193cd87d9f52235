//! Database layer
//!
//! SQLite (default, single file) and MySQL are both supported behind the
//! `DatabasePool` trait; repositories pick the SQL dialect at runtime from
//! `DatabasePool::driver`.
//!
//! ```ignore
//! use musedock::config::DatabaseConfig;
//! use musedock::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

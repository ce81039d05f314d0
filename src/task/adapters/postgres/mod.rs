//! `PostgreSQL` adapters for task and task file persistence.

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

mod file_repository;
mod models;
mod schema;
mod task_repository;

pub use file_repository::PostgresTaskFileRepository;
pub use task_repository::PostgresTaskRepository;

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

use crate::error::AppResult;

const PRAGMAS: &[&str] =
    &["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL", "PRAGMA cache_size=-64000"];

pub async fn connect_and_migrate(database_url: &str) -> AppResult<DatabaseConnection> {
    let mut opts = ConnectOptions::new(database_url);
    opts.sqlx_logging(false);
    if database_url.contains(":memory:") {
        // Each pooled connection would otherwise open its own empty database.
        opts.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opts).await?;

    for pragma in PRAGMAS {
        db.execute(Statement::from_string(db.get_database_backend(), pragma.to_string())).await?;
    }

    Migrator::up(&db, None).await?;
    tracing::debug!("database migrations applied");
    Ok(db)
}

#[cfg(test)]
pub(crate) async fn memory() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:").await.expect("in-memory database")
}

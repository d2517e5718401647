use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("accounts_db")]
pub struct AccountsDb(sqlx::PgPool);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

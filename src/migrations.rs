//! Database migrations.
//!
//! SQLx embedded migrations, one set per service. The services never
//! share a schema; each binary runs only its own migrator.

use sqlx::PgPool;

static VERIFICATION_MIGRATOR: sqlx::migrate::Migrator =
    sqlx::migrate!("migrations/verification");
static CERTIFICATE_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/certificate");

pub async fn run_verification(pool: &PgPool) -> anyhow::Result<()> {
    VERIFICATION_MIGRATOR.run(pool).await?;
    Ok(())
}

pub async fn run_certificate(pool: &PgPool) -> anyhow::Result<()> {
    CERTIFICATE_MIGRATOR.run(pool).await?;
    Ok(())
}

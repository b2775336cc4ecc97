use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::Result,
    model::{
        notification::{NewNotification, Notification},
        profile::{ClientProfile, ProviderProfile},
        user::UserType,
    },
};

pub async fn connect(config: &AppConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;
    info!(max_connections = config.database_max_connections, "Connected to Postgres");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

pub const CLIENT_PROFILE_COLUMNS: &str = "user_id, company_name, vat_number, fiscal_code, phone, address, city, \
     province, postal_code, industry_sector, employees_count, created_at, updated_at";

pub const PROVIDER_PROFILE_COLUMNS: &str = "user_id, business_name, vat_number, description, phone, website, \
     address, city, province, postal_code, region, latitude, longitude, service_radius_km, verified, \
     created_at, updated_at";

/// Creates the empty profile matching `kind`. Existing profiles are kept.
pub async fn ensure_profile(tx: &mut Transaction<'_, Postgres>, user_id: Uuid, kind: UserType) -> Result<()> {
    match kind {
        UserType::Client => {
            sqlx::query("INSERT INTO client_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        UserType::Provider => {
            sqlx::query("INSERT INTO provider_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        UserType::Admin => {}
    }
    Ok(())
}

pub async fn find_client_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<ClientProfile>> {
    let query = format!("SELECT {CLIENT_PROFILE_COLUMNS} FROM client_profiles WHERE user_id = $1");
    Ok(sqlx::query_as::<_, ClientProfile>(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn find_provider_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<ProviderProfile>> {
    let query = format!("SELECT {PROVIDER_PROFILE_COLUMNS} FROM provider_profiles WHERE user_id = $1");
    Ok(sqlx::query_as::<_, ProviderProfile>(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn insert_notification(tx: &mut Transaction<'_, Postgres>, notification: &NewNotification) -> Result<Notification> {
    let row = sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications (id, user_id, kind, title, message, booking_id)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, user_id, kind, title, message, booking_id, read, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.booking_id)
    .fetch_one(&mut *tx)
    .await?;
    Ok(row)
}

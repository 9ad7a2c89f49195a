use sqlx::SqliteConnection;

use crate::{db_types::WorkerProfile, traits::OrderFlowError};

/// The eligibility filter of dispatch: approved workers who serve the order's city and
/// district and are currently open for pushes. A flat membership test, no ranking.
pub async fn list_eligible_workers(
    city: &str,
    district: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, OrderFlowError> {
    let ids: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT worker_profiles.worker_id
        FROM worker_profiles
            JOIN worker_districts ON worker_districts.worker_id = worker_profiles.worker_id
        WHERE worker_profiles.city = $1
          AND worker_districts.district = $2
          AND worker_profiles.approved = 1
          AND worker_profiles.available = 1
        ORDER BY worker_profiles.worker_id ASC"#,
    )
    .bind(city)
    .bind(district)
    .fetch_all(conn)
    .await?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}

pub async fn is_approved(worker_id: i64, conn: &mut SqliteConnection) -> Result<bool, OrderFlowError> {
    let approved: Option<(bool,)> =
        sqlx::query_as("SELECT approved FROM worker_profiles WHERE worker_id = $1")
            .bind(worker_id)
            .fetch_optional(conn)
            .await?;
    Ok(approved.map(|(a,)| a).unwrap_or(false))
}

pub async fn fetch_worker_profile(
    worker_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<WorkerProfile>, OrderFlowError> {
    let profile: Option<(i64, String, bool, bool)> = sqlx::query_as(
        "SELECT worker_id, city, available, approved FROM worker_profiles WHERE worker_id = $1",
    )
    .bind(worker_id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some((worker_id, city, available, approved)) = profile else {
        return Ok(None);
    };
    let districts: Vec<(String,)> =
        sqlx::query_as("SELECT district FROM worker_districts WHERE worker_id = $1 ORDER BY district ASC")
            .bind(worker_id)
            .fetch_all(conn)
            .await?;
    let districts = districts.into_iter().map(|(d,)| d).collect();
    Ok(Some(WorkerProfile { worker_id, city, districts, available, approved }))
}

/// Writes an eligibility record. The directory is owned by the external profile-management
/// collaborator; this write path exists for that collaborator and for test setups.
pub async fn upsert_worker_profile(profile: &WorkerProfile, conn: &mut SqliteConnection) -> Result<(), OrderFlowError> {
    sqlx::query(
        r#"
            INSERT INTO worker_profiles (worker_id, city, available, approved) VALUES ($1, $2, $3, $4)
            ON CONFLICT (worker_id) DO UPDATE
                SET city = excluded.city,
                    available = excluded.available,
                    approved = excluded.approved,
                    updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(profile.worker_id)
    .bind(&profile.city)
    .bind(profile.available)
    .bind(profile.approved)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM worker_districts WHERE worker_id = $1")
        .bind(profile.worker_id)
        .execute(&mut *conn)
        .await?;
    for district in &profile.districts {
        sqlx::query("INSERT INTO worker_districts (worker_id, district) VALUES ($1, $2)")
            .bind(profile.worker_id)
            .bind(district)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

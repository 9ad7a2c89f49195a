//! Fixtures for tests: eligibility records and role grants.
use crate::{
    db_types::{Role, WorkerProfile},
    sqlite::db::workers,
    traits::AuthManagement,
    SqliteDatabase,
};

/// Writes an eligibility record the way the external profile collaborator would, and grants
/// the medic role.
pub async fn seed_worker(db: &SqliteDatabase, worker_id: i64, city: &str, districts: &[&str], approved: bool) {
    let profile = WorkerProfile {
        worker_id,
        city: city.to_string(),
        districts: districts.iter().map(|d| d.to_string()).collect(),
        available: true,
        approved,
    };
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    workers::upsert_worker_profile(&profile, &mut conn).await.expect("Error seeding worker profile");
    db.assign_roles(worker_id, &[Role::Medic]).await.expect("Error granting medic role");
}

pub async fn seed_client(db: &SqliteDatabase, client_id: i64) {
    db.assign_roles(client_id, &[Role::Client]).await.expect("Error granting client role");
}

pub async fn seed_admin(db: &SqliteDatabase, admin_id: i64) {
    db.assign_roles(admin_id, &[Role::Admin]).await.expect("Error granting admin role");
}

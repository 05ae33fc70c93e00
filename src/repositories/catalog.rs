use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::Test;
use crate::schemas::test::{TestConfig, TestMetadata, TestSection};

const COLUMNS: &str =
    "id, metadata, config, sections, is_active, created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!("SELECT {COLUMNS} FROM tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_many_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<Test>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Test>(&format!("SELECT {COLUMNS} FROM tests WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) async fn exists_by_catalog_key(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tests WHERE metadata->>'id' = $1)")
        .bind(key)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list_active_practice(pool: &PgPool) -> Result<Vec<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "SELECT {COLUMNS} FROM tests
         WHERE is_active = TRUE AND (metadata->>'is_practice')::boolean IS TRUE
         ORDER BY metadata->>'title'"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tests WHERE is_active = TRUE").fetch_one(pool).await
}

pub(crate) struct CreateTest<'a> {
    pub(crate) id: &'a str,
    pub(crate) metadata: &'a TestMetadata,
    pub(crate) config: &'a TestConfig,
    pub(crate) sections: &'a [TestSection],
    pub(crate) is_active: bool,
    pub(crate) created_by: Option<&'a str>,
    pub(crate) created_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateTest<'_>) -> Result<Test, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "INSERT INTO tests (id, metadata, config, sections, is_active, created_by, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(Json(params.metadata))
    .bind(Json(params.config))
    .bind(Json(params.sections))
    .bind(params.is_active)
    .bind(params.created_by)
    .bind(params.created_at)
    .fetch_one(pool)
    .await
}

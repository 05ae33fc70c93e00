use anyhow::Context;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::test::TestDefinition;
use crate::services::catalog;

pub(crate) async fn ensure_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    let email = admin.first_admin_email.trim().to_lowercase();
    if email.is_empty() {
        tracing::warn!("FIRST_ADMIN_EMAIL not configured; skipping admin creation");
        return Ok(());
    }

    let now = primitive_now_utc();

    if let Some(user) = repositories::users::find_by_email(state.db(), &email).await? {
        if user.role == UserRole::Admin && user.is_active {
            tracing::info!("Default admin already up to date");
        } else {
            repositories::users::promote_to_admin(state.db(), &user.id, now).await?;
            tracing::info!(email = %email, "Promoted default admin");
        }
        return Ok(());
    }

    repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: &email,
            name: &admin.first_admin_name,
            role: UserRole::Admin,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    tracing::info!(email = %email, "Created default admin");
    Ok(())
}

/// Inserts catalog definitions from `CATALOG_SEED_PATH` whose key is not stored yet.
/// Returns how many were inserted.
pub(crate) async fn seed_catalog(state: &AppState) -> anyhow::Result<usize> {
    let Some(path) = state.settings().admin().catalog_seed_path.as_deref() else {
        return Ok(0);
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog seed {path}"))?;
    let definitions: Vec<TestDefinition> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid catalog seed {path}"))?;

    let mut inserted = 0;
    for definition in definitions {
        if let Err(err) = catalog::validate_definition(&definition) {
            tracing::warn!(error = %err, "Skipping invalid catalog entry");
            continue;
        }

        let key = definition.metadata.id.clone();
        if repositories::catalog::exists_by_catalog_key(state.db(), &key).await? {
            continue;
        }

        repositories::catalog::create(
            state.db(),
            repositories::catalog::CreateTest {
                id: &Uuid::new_v4().to_string(),
                metadata: &definition.metadata,
                config: &definition.config,
                sections: &definition.sections,
                is_active: definition.is_active,
                created_by: None,
                created_at: primitive_now_utc(),
            },
        )
        .await
        .with_context(|| format!("Failed to insert catalog entry {key}"))?;
        inserted += 1;
    }

    tracing::info!(path, inserted, "Catalog seed applied");
    Ok(inserted)
}

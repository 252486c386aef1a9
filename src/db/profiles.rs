use sqlx::SqlitePool;

use super::models::UserRow;
use crate::error::Result;

pub async fn find_user(pool: &SqlitePool, user_id: &str) -> Result<Option<UserRow>> {
    let user = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, phone_number, name, language, latitude, longitude,
               address, state, district, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::types::Language;

    /// Inserts a profile; `location` is (lat, lon).
    pub async fn insert_user(
        pool: &SqlitePool,
        id: &str,
        language: &str,
        location: Option<(f64, f64)>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO users (id, phone_number, language, latitude, longitude, state, district, created_at)
            VALUES (?, ?, ?, ?, ?, 'Maharashtra', 'Pune', 0)
            "#,
        )
        .bind(id)
        .bind(format!("+91{id}"))
        .bind(language)
        .bind(location.map(|l| l.0))
        .bind(location.map(|l| l.1))
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn finds_existing_user() {
        let pool = memory_pool().await;
        insert_user(&pool, "u1", "hi", Some((18.5204, 73.8567))).await;

        let user = find_user(&pool, "u1").await.unwrap().unwrap();
        assert_eq!(user.farm_location(), Some((18.5204, 73.8567)));
        assert_eq!(user.preferred_language(), Language::Hi);
        assert_eq!(user.district.as_deref(), Some("Pune"));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let pool = memory_pool().await;
        assert!(find_user(&pool, "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incomplete_profile_has_no_location() {
        let pool = memory_pool().await;
        insert_user(&pool, "u2", "xx", None).await;
        let user = find_user(&pool, "u2").await.unwrap().unwrap();
        assert_eq!(user.farm_location(), None);
        assert_eq!(user.preferred_language(), Language::En);
    }
}

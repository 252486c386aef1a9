/// Row types for the `users` table (see migrations/0001_users.sql).
use crate::types::Language;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub language: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub created_at: i64,
}

impl UserRow {
    /// Farm location as (lat, lon). None until the farm profile is complete.
    pub fn farm_location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn preferred_language(&self) -> Language {
        Language::from_code(&self.language)
    }
}

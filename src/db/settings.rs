use anyhow::Result;
use sqlx::{query, query_as, sqlite::SqlitePool};
use tokio::sync::watch;

use crate::domain::{DispatchLimits, LimitsUpdate};

const CAP_HOUR_KEY: &str = "capHour";
const CAP_DAY_KEY: &str = "capDay";

#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = query_as(r#"SELECT value FROM settings WHERE key = ?1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        query(
            r#"INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        Ok(self.get(key).await?.and_then(|v| v.trim().parse().ok()))
    }
}

pub struct LimitsStore {
    repo: SettingsRepository,
    sender: watch::Sender<DispatchLimits>,
}

impl LimitsStore {
    pub async fn load(repo: SettingsRepository, defaults: DispatchLimits) -> Result<Self> {
        let per_hour = match repo.get_u32(CAP_HOUR_KEY).await? {
            Some(value) => value,
            None => {
                repo.set(CAP_HOUR_KEY, &defaults.per_hour.to_string()).await?;
                defaults.per_hour
            }
        };
        let per_day = match repo.get_u32(CAP_DAY_KEY).await? {
            Some(value) => value,
            None => {
                repo.set(CAP_DAY_KEY, &defaults.per_day.to_string()).await?;
                defaults.per_day
            }
        };

        let (sender, _) = watch::channel(DispatchLimits { per_hour, per_day });
        Ok(Self { repo, sender })
    }

    pub fn current(&self) -> DispatchLimits {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DispatchLimits> {
        self.sender.subscribe()
    }

    pub async fn update(&self, update: LimitsUpdate) -> Result<DispatchLimits> {
        let next = self.current().merged(update);
        if let Some(per_hour) = update.per_hour {
            self.repo.set(CAP_HOUR_KEY, &per_hour.to_string()).await?;
        }
        if let Some(per_day) = update.per_day {
            self.repo.set(CAP_DAY_KEY, &per_day.to_string()).await?;
        }
        self.sender.send_replace(next);
        tracing::info!(
            target: "db",
            per_hour = next.per_hour,
            per_day = next.per_day,
            "dispatch limits updated"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn seeds_defaults_and_persists_updates() {
        let (pool, _dir) = test_pool().await;
        let repo = SettingsRepository::new(pool.clone());
        let store = LimitsStore::load(repo.clone(), DispatchLimits::default())
            .await
            .unwrap();
        assert_eq!(store.current(), DispatchLimits { per_hour: 25, per_day: 75 });
        assert_eq!(repo.get("capHour").await.unwrap().as_deref(), Some("25"));

        let mut rx = store.subscribe();
        store
            .update(LimitsUpdate {
                per_hour: Some(10),
                per_day: None,
            })
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), DispatchLimits { per_hour: 10, per_day: 75 });

        let reloaded = LimitsStore::load(repo, DispatchLimits { per_hour: 1, per_day: 1 })
            .await
            .unwrap();
        assert_eq!(reloaded.current(), DispatchLimits { per_hour: 10, per_day: 75 });
    }
}

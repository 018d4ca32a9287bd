use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, MIGRATOR};
    use crate::connect_with_settings;

    const MANAGED_TABLES: &[&str] = &[
        "clients",
        "masters",
        "services",
        "appointments",
        "notes",
        "reminders",
        "segments",
        "sms_messages",
        "conversation_turns",
        "business_settings",
    ];

    async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
        sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .expect("load tables")
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .filter(|name| MANAGED_TABLES.contains(&name.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn migrations_create_all_managed_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let mut expected: Vec<String> =
            MANAGED_TABLES.iter().map(|name| name.to_string()).collect();
        expected.sort();
        assert_eq!(table_names(&pool).await, expected);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(table_names(&pool).await.is_empty());

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(table_names(&pool).await.len(), MANAGED_TABLES.len());
    }
}

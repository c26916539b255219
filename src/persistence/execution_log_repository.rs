use tracing::{debug, error};

use super::models::{symbol_list_json, ExecutionLogRow};
use super::{DatabaseError, DbPool};
use crate::domain::entities::tracking::ExecutionLog;

/// Storage of daily batch execution logs
#[derive(Clone)]
pub struct ExecutionLogRepository {
    pool: DbPool,
}

impl ExecutionLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new log, returning its id.
    pub async fn insert(&self, log: &ExecutionLog) -> Result<i64, DatabaseError> {
        let id = sqlx::query(
            r#"
            INSERT INTO daily_execution_log (
                execution_date, execution_type, status, total_symbols,
                successful_predictions, failed_predictions,
                symbols_processed, symbols_succeeded, symbols_failed,
                duration_ms, error_message, created_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(log.execution_date)
        .bind(log.execution_type.as_str())
        .bind(log.status.as_str())
        .bind(log.total_symbols as i64)
        .bind(log.successful_predictions as i64)
        .bind(log.failed_predictions as i64)
        .bind(symbol_list_json(&log.symbols_processed)?)
        .bind(symbol_list_json(&log.symbols_succeeded)?)
        .bind(symbol_list_json(&log.symbols_failed)?)
        .bind(log.duration_ms)
        .bind(&log.error_message)
        .bind(log.created_at)
        .bind(log.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(date = %log.execution_date, error = %e, "Failed to create execution log");
            DatabaseError::QueryError(format!("Failed to create execution log: {}", e))
        })?
        .last_insert_rowid();

        debug!(id, date = %log.execution_date, status = %log.status, "Created execution log");
        Ok(id)
    }

    /// Persist the mutable fields of an existing log.
    pub async fn update(&self, log: &ExecutionLog) -> Result<(), DatabaseError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE daily_execution_log
            SET status = ?1, successful_predictions = ?2, failed_predictions = ?3,
                symbols_succeeded = ?4, symbols_failed = ?5, duration_ms = ?6,
                error_message = ?7, completed_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(log.status.as_str())
        .bind(log.successful_predictions as i64)
        .bind(log.failed_predictions as i64)
        .bind(symbol_list_json(&log.symbols_succeeded)?)
        .bind(symbol_list_json(&log.symbols_failed)?)
        .bind(log.duration_ms)
        .bind(&log.error_message)
        .bind(log.completed_at)
        .bind(log.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(id = log.id, error = %e, "Failed to update execution log");
            DatabaseError::QueryError(format!("Failed to update execution log: {}", e))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!(
                "Execution log not found: {}",
                log.id
            )));
        }

        debug!(id = log.id, status = %log.status, "Updated execution log");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<ExecutionLog>, DatabaseError> {
        let row = sqlx::query_as::<_, ExecutionLogRow>("SELECT * FROM daily_execution_log WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to get execution log: {}", e)))?;

        row.map(ExecutionLog::try_from).transpose()
    }

    /// Most recently created log.
    pub async fn latest(&self) -> Result<Option<ExecutionLog>, DatabaseError> {
        let row = sqlx::query_as::<_, ExecutionLogRow>(
            "SELECT * FROM daily_execution_log ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to get latest execution log: {}", e)))?;

        row.map(ExecutionLog::try_from).transpose()
    }

    /// Most recent logs first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ExecutionLog>, DatabaseError> {
        let rows = sqlx::query_as::<_, ExecutionLogRow>(
            "SELECT * FROM daily_execution_log ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to list execution logs: {}", e)))?;

        rows.into_iter().map(ExecutionLog::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::tracking::{ExecutionStatus, ExecutionType};
    use crate::persistence::test_pool;
    use chrono::{NaiveDate, Utc};

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_update_and_read_back() {
        let repo = ExecutionLogRepository::new(test_pool().await);
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let mut log = ExecutionLog::new(date, ExecutionType::Manual, &symbols(&["A", "B", "C"]), Utc::now());
        log.start().unwrap();
        log.id = repo.insert(&log).await.unwrap();

        let stored = repo.get(log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);
        assert_eq!(stored.symbols_processed, symbols(&["A", "B", "C"]));

        log.finish(symbols(&["A", "C"]), symbols(&["B"]), 42, Utc::now()).unwrap();
        repo.update(&log).await.unwrap();

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, log.id);
        assert_eq!(latest.status, ExecutionStatus::Completed);
        assert_eq!(latest.successful_predictions, 2);
        assert_eq!(latest.symbols_failed, symbols(&["B"]));
        assert_eq!(latest.duration_ms, Some(42));
        assert!(latest.error_message.unwrap().contains("Partial success"));
        assert!(latest.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_log_fails() {
        let repo = ExecutionLogRepository::new(test_pool().await);
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let mut log = ExecutionLog::new(date, ExecutionType::Auto, &[], Utc::now());
        log.id = 99;
        assert!(repo.update(&log).await.is_err());
        assert!(repo.latest().await.unwrap().is_none());
        assert!(repo.recent(5).await.unwrap().is_empty());
    }
}

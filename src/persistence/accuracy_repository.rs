//! Accuracy Repository
//!
//! Read-only aggregates over prediction_tracking. Symbols without any
//! reconciled prediction report zero counts and `None` averages.

use chrono::{Duration, NaiveDate};
use sqlx::Row;

use super::models::{AccuracySummaryRow, DailyAccuracyRow};
use super::{DatabaseError, DbPool};
use crate::domain::entities::tracking::{AccuracySummary, DailyAccuracy};

/// Minimum reconciled predictions for a symbol to rank as a top performer.
pub const MIN_RECONCILED_FOR_RANKING: i64 = 5;

/// Aggregate columns shared by the per-symbol queries. Direction accuracy is
/// the percentage of reconciled rows whose direction was right.
const SUMMARY_COLUMNS: &str = r#"
    COUNT(*) AS total_predictions,
    COUNT(actual_close) AS predictions_with_actual,
    AVG(accuracy_mape) AS average_accuracy_mape,
    AVG(CASE
        WHEN direction_correct IS NULL THEN NULL
        WHEN direction_correct THEN 100.0
        ELSE 0.0
    END) AS direction_accuracy,
    AVG(confidence) AS average_confidence,
    MIN(accuracy_mape) AS best_accuracy,
    MAX(accuracy_mape) AS worst_accuracy,
    MAX(prediction_date) AS last_prediction_date
"#;

/// Totals across every symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverallTotals {
    pub total_symbols: i64,
    pub total_predictions: i64,
    pub predictions_with_actual: i64,
    pub overall_accuracy_mape: Option<f64>,
    pub overall_direction_accuracy: Option<f64>,
}

#[derive(Clone)]
pub struct AccuracyRepository {
    pool: DbPool,
}

impl AccuracyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn summary(&self, symbol: &str) -> Result<AccuracySummary, DatabaseError> {
        let sql = format!(
            "SELECT ?1 AS symbol, {} FROM prediction_tracking WHERE symbol = ?1",
            SUMMARY_COLUMNS
        );
        let row = sqlx::query_as::<_, AccuracySummaryRow>(&sql)
            .bind(symbol)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to get accuracy summary: {}", e)))?;

        row.try_into()
    }

    /// One summary per tracked symbol, ordered by symbol.
    pub async fn all_summaries(&self) -> Result<Vec<AccuracySummary>, DatabaseError> {
        let sql = format!(
            "SELECT symbol, {} FROM prediction_tracking GROUP BY symbol ORDER BY symbol",
            SUMMARY_COLUMNS
        );
        let rows = sqlx::query_as::<_, AccuracySummaryRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to list accuracy summaries: {}", e)))?;

        rows.into_iter().map(AccuracySummary::try_from).collect()
    }

    pub async fn overall(&self) -> Result<OverallTotals, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(DISTINCT symbol) AS total_symbols,
                COUNT(*) AS total_predictions,
                COUNT(actual_close) AS predictions_with_actual,
                AVG(accuracy_mape) AS overall_accuracy_mape,
                AVG(CASE
                    WHEN direction_correct IS NULL THEN NULL
                    WHEN direction_correct THEN 100.0
                    ELSE 0.0
                END) AS overall_direction_accuracy
            FROM prediction_tracking
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to get overall accuracy: {}", e)))?;

        Ok(OverallTotals {
            total_symbols: row.try_get("total_symbols")?,
            total_predictions: row.try_get("total_predictions")?,
            predictions_with_actual: row.try_get("predictions_with_actual")?,
            overall_accuracy_mape: row.try_get("overall_accuracy_mape")?,
            overall_direction_accuracy: row.try_get("overall_direction_accuracy")?,
        })
    }

    /// Per-day accuracy for the `days` days ending at `end`, optionally for
    /// one symbol. Days without predictions are absent.
    pub async fn daily_trends(
        &self,
        symbol: Option<&str>,
        days: u32,
        end: NaiveDate,
    ) -> Result<Vec<DailyAccuracy>, DatabaseError> {
        let start = end - Duration::days(days.saturating_sub(1) as i64);
        let rows = sqlx::query_as::<_, DailyAccuracyRow>(
            r#"
            SELECT
                prediction_date,
                AVG(accuracy_mape) AS average_accuracy_mape,
                AVG(CASE
                    WHEN direction_correct IS NULL THEN NULL
                    WHEN direction_correct THEN 100.0
                    ELSE 0.0
                END) AS direction_accuracy,
                COUNT(*) AS total_predictions,
                COUNT(actual_close) AS predictions_with_actual
            FROM prediction_tracking
            WHERE prediction_date >= ?1 AND prediction_date <= ?2
              AND (?3 IS NULL OR symbol = ?3)
            GROUP BY prediction_date
            ORDER BY prediction_date
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to get accuracy trends: {}", e)))?;

        rows.into_iter().map(DailyAccuracy::try_from).collect()
    }

    /// Symbols with at least five reconciled predictions, best MAPE first,
    /// ties broken by higher direction accuracy.
    pub async fn top_performers(&self, limit: u32) -> Result<Vec<AccuracySummary>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT symbol, {}
            FROM prediction_tracking
            GROUP BY symbol
            HAVING COUNT(actual_close) >= ?1
            ORDER BY average_accuracy_mape ASC, direction_accuracy DESC, symbol ASC
            LIMIT ?2
            "#,
            SUMMARY_COLUMNS
        );
        let rows = sqlx::query_as::<_, AccuracySummaryRow>(&sql)
            .bind(MIN_RECONCILED_FOR_RANKING)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to get top performers: {}", e)))?;

        rows.into_iter().map(AccuracySummary::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::prediction::Direction;
    use crate::domain::entities::tracking::{ActualPriceUpdate, CreatePrediction};
    use crate::persistence::{test_pool, PredictionRepository};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    async fn seed(repo: &PredictionRepository, symbol: &str, day: u32, mape: Option<f64>, correct: Option<bool>) {
        repo.upsert(&CreatePrediction {
            symbol: symbol.to_string(),
            prediction_date: d(day),
            predicted_price: Some(100.0),
            predicted_direction: Some(Direction::Up),
            confidence: Some(0.5),
            reference_price: Some(99.0),
            market_was_open: true,
        })
        .await
        .unwrap();

        if let Some(mape) = mape {
            let update = ActualPriceUpdate {
                actual_close: 100.0,
                accuracy_mape: Some(mape),
                direction_correct: correct,
            };
            repo.update_actual(symbol, d(day), &update).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_summary_for_unknown_symbol_is_empty() {
        let repo = AccuracyRepository::new(test_pool().await);
        let summary = repo.summary("NVDA").await.unwrap();
        assert_eq!(summary.symbol, "NVDA");
        assert_eq!(summary.total_predictions, 0);
        assert_eq!(summary.predictions_with_actual, 0);
        assert_eq!(summary.average_accuracy_mape, None);
        assert_eq!(summary.direction_accuracy, None);
        assert_eq!(summary.last_prediction_date, None);
    }

    #[tokio::test]
    async fn test_summary_aggregates() {
        let pool = test_pool().await;
        let predictions = PredictionRepository::new(pool.clone());
        let repo = AccuracyRepository::new(pool);

        seed(&predictions, "AAPL", 4, Some(1.0), Some(true)).await;
        seed(&predictions, "AAPL", 5, Some(3.0), Some(false)).await;
        seed(&predictions, "AAPL", 6, None, None).await;

        let summary = repo.summary("AAPL").await.unwrap();
        assert_eq!(summary.total_predictions, 3);
        assert_eq!(summary.predictions_with_actual, 2);
        assert_eq!(summary.average_accuracy_mape, Some(2.0));
        assert_eq!(summary.direction_accuracy, Some(50.0));
        assert_eq!(summary.best_accuracy, Some(1.0));
        assert_eq!(summary.worst_accuracy, Some(3.0));
        assert_eq!(summary.last_prediction_date, Some(d(6)));

        let overall = repo.overall().await.unwrap();
        assert_eq!(overall.total_symbols, 1);
        assert_eq!(overall.total_predictions, 3);
        assert_eq!(overall.overall_direction_accuracy, Some(50.0));
    }

    #[tokio::test]
    async fn test_overall_on_empty_table() {
        let repo = AccuracyRepository::new(test_pool().await);
        assert_eq!(repo.overall().await.unwrap(), OverallTotals::default());
        assert!(repo.all_summaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_performers_requires_five_reconciled() {
        let pool = test_pool().await;
        let predictions = PredictionRepository::new(pool.clone());
        let repo = AccuracyRepository::new(pool);

        for day in 1..=5 {
            seed(&predictions, "AAPL", day, Some(2.0), Some(true)).await;
            seed(&predictions, "MSFT", day, Some(2.0), Some(day % 2 == 0)).await;
            seed(&predictions, "TSLA", day, Some(1.0), Some(false)).await;
        }
        // four reconciled only
        for day in 1..=4 {
            seed(&predictions, "NVDA", day, Some(0.1), Some(true)).await;
        }
        seed(&predictions, "NVDA", 5, None, None).await;

        let top = repo.top_performers(10).await.unwrap();
        let symbols: Vec<&str> = top.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["TSLA", "AAPL", "MSFT"]);

        assert_eq!(repo.top_performers(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_daily_trends() {
        let pool = test_pool().await;
        let predictions = PredictionRepository::new(pool.clone());
        let repo = AccuracyRepository::new(pool);

        seed(&predictions, "AAPL", 4, Some(1.0), Some(true)).await;
        seed(&predictions, "MSFT", 4, Some(3.0), Some(true)).await;
        seed(&predictions, "AAPL", 6, None, None).await;
        seed(&predictions, "AAPL", 1, Some(5.0), Some(false)).await;

        let trends = repo.daily_trends(None, 3, d(6)).await.unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].date, d(4));
        assert_eq!(trends[0].average_accuracy_mape, Some(2.0));
        assert_eq!(trends[0].total_predictions, 2);
        assert_eq!(trends[1].predictions_with_actual, 0);

        let aapl = repo.daily_trends(Some("AAPL"), 10, d(6)).await.unwrap();
        assert_eq!(aapl.len(), 3);
        assert_eq!(aapl[1].average_accuracy_mape, Some(1.0));
    }
}

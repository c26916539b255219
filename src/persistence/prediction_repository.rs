//! Prediction Repository
//!
//! Upsert, lookup, reconciliation and history listing over
//! prediction_tracking.

use chrono::{NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, error};

use super::models::PredictionRow;
use super::{DatabaseError, DbPool};
use crate::domain::entities::tracking::{
    ActualPriceUpdate, CreatePrediction, PredictionHistoryQuery, PredictionRecord,
};

#[derive(Clone)]
pub struct PredictionRepository {
    pool: DbPool,
}

impl PredictionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite the prediction fields of `(symbol, prediction_date)`.
    /// Accuracy fields of an existing row are left untouched.
    pub async fn upsert(&self, prediction: &CreatePrediction) -> Result<PredictionRecord, DatabaseError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, PredictionRow>(
            r#"
            INSERT INTO prediction_tracking (
                symbol, prediction_date, predicted_price, predicted_direction,
                confidence, reference_price, market_was_open,
                prediction_timestamp, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)
            ON CONFLICT(symbol, prediction_date) DO UPDATE SET
                predicted_price = excluded.predicted_price,
                predicted_direction = excluded.predicted_direction,
                confidence = excluded.confidence,
                reference_price = excluded.reference_price,
                market_was_open = excluded.market_was_open,
                prediction_timestamp = excluded.prediction_timestamp,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&prediction.symbol)
        .bind(prediction.prediction_date)
        .bind(prediction.predicted_price)
        .bind(prediction.predicted_direction.map(|d| d.as_str()))
        .bind(prediction.confidence)
        .bind(prediction.reference_price)
        .bind(prediction.market_was_open)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!(symbol = %prediction.symbol, error = %e, "Failed to upsert prediction");
            DatabaseError::QueryError(format!("Failed to upsert prediction: {}", e))
        })?;

        debug!(symbol = %row.symbol, date = %row.prediction_date, id = row.id, "Upserted prediction");
        row.try_into()
    }

    pub async fn get(
        &self,
        symbol: &str,
        prediction_date: NaiveDate,
    ) -> Result<Option<PredictionRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, PredictionRow>(
            "SELECT * FROM prediction_tracking WHERE symbol = ?1 AND prediction_date = ?2",
        )
        .bind(symbol)
        .bind(prediction_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("Failed to get prediction: {}", e)))?;

        row.map(PredictionRecord::try_from).transpose()
    }

    /// Writes the realized close and accuracy fields.
    /// Returns `false` when no row exists for the pair.
    pub async fn update_actual(
        &self,
        symbol: &str,
        prediction_date: NaiveDate,
        update: &ActualPriceUpdate,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"
            UPDATE prediction_tracking
            SET actual_close = ?1, accuracy_mape = ?2, direction_correct = ?3,
                actual_price_timestamp = ?4, updated_at = ?4
            WHERE symbol = ?5 AND prediction_date = ?6
            "#,
        )
        .bind(update.actual_close)
        .bind(update.accuracy_mape)
        .bind(update.direction_correct)
        .bind(now)
        .bind(symbol)
        .bind(prediction_date)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(symbol = %symbol, date = %prediction_date, error = %e, "Failed to update actual price");
            DatabaseError::QueryError(format!("Failed to update actual price: {}", e))
        })?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Filtered, ordered and paginated listing. Every filter value is bound;
    /// ordering comes from a closed set of columns.
    pub async fn history(&self, query: &PredictionHistoryQuery) -> Result<Vec<PredictionRecord>, DatabaseError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM prediction_tracking WHERE 1 = 1");

        if let Some(symbol) = &query.symbol {
            builder.push(" AND symbol = ").push_bind(symbol.clone());
        }
        if let Some(start) = query.start_date {
            builder.push(" AND prediction_date >= ").push_bind(start);
        }
        if let Some(end) = query.end_date {
            builder.push(" AND prediction_date <= ").push_bind(end);
        }

        builder
            .push(" ORDER BY ")
            .push(query.order_by.column())
            .push(" ")
            .push(query.order_dir.keyword())
            .push(", id ")
            .push(query.order_dir.keyword());

        if query.limit > 0 {
            builder.push(" LIMIT ").push_bind(query.limit as i64);
            if query.offset > 0 {
                builder.push(" OFFSET ").push_bind(query.offset as i64);
            }
        } else if query.offset > 0 {
            builder.push(" LIMIT -1 OFFSET ").push_bind(query.offset as i64);
        }

        let rows = builder
            .build_query_as::<PredictionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to query prediction history: {}", e)))?;

        rows.into_iter().map(PredictionRecord::try_from).collect()
    }

    /// Reconciled predictions in `[start, end]`, optionally limited to `symbols`.
    pub async fn reconciled_in_range(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PredictionRecord>, DatabaseError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT * FROM prediction_tracking WHERE actual_close IS NOT NULL AND prediction_date >= ",
        );
        builder.push_bind(start);
        builder.push(" AND prediction_date <= ").push_bind(end);

        if !symbols.is_empty() {
            builder.push(" AND symbol IN (");
            let mut separated = builder.separated(", ");
            for symbol in symbols {
                separated.push_bind(symbol.clone());
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY prediction_date ASC, symbol ASC");

        let rows = builder
            .build_query_as::<PredictionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("Failed to query accuracy range: {}", e)))?;

        rows.into_iter().map(PredictionRecord::try_from).collect()
    }
}

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::debug;

use super::models::CalendarRow;
use super::DbPool;
use crate::domain::entities::tracking::{CalendarDay, US_MARKET};
use crate::domain::errors::CalendarError;
use crate::domain::repositories::CalendarOverrides;

/// market_calendar backed overrides for the US market
#[derive(Clone)]
pub struct CalendarRepository {
    pool: DbPool,
}

impl CalendarRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalendarOverrides for CalendarRepository {
    async fn get(&self, date: NaiveDate) -> Result<Option<CalendarDay>, CalendarError> {
        let row = sqlx::query_as::<_, CalendarRow>(
            r#"
            SELECT date, is_market_open, holiday_name, market_type
            FROM market_calendar
            WHERE date = ?1 AND market_type = ?2
            "#,
        )
        .bind(date)
        .bind(US_MARKET)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CalendarError::Storage(e.to_string()))?;

        Ok(row.map(CalendarDay::from))
    }

    async fn upsert(&self, day: &CalendarDay) -> Result<(), CalendarError> {
        sqlx::query(
            r#"
            INSERT INTO market_calendar (date, is_market_open, holiday_name, market_type, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(date, market_type) DO UPDATE SET
                is_market_open = excluded.is_market_open,
                holiday_name = excluded.holiday_name
            "#,
        )
        .bind(day.date)
        .bind(day.is_market_open)
        .bind(&day.holiday_name)
        .bind(&day.market_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| CalendarError::Storage(format!("failed to add calendar day: {}", e)))?;

        debug!(date = %day.date, open = day.is_market_open, "Stored calendar override");
        Ok(())
    }

    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>, CalendarError> {
        let rows = sqlx::query_as::<_, CalendarRow>(
            r#"
            SELECT date, is_market_open, holiday_name, market_type
            FROM market_calendar
            WHERE date >= ?1 AND date <= ?2 AND market_type = ?3
            ORDER BY date
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(US_MARKET)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CalendarError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(CalendarDay::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::TradingCalendar;
    use crate::persistence::test_pool;
    use std::sync::Arc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_date() {
        let repo = CalendarRepository::new(test_pool().await);
        repo.upsert(&CalendarDay::holiday(d(2024, 3, 5), "Closure")).await.unwrap();
        assert!(!repo.get(d(2024, 3, 5)).await.unwrap().unwrap().is_market_open);

        let mut reopened = CalendarDay::holiday(d(2024, 3, 5), "Closure");
        reopened.is_market_open = true;
        repo.upsert(&reopened).await.unwrap();

        let stored = repo.get(d(2024, 3, 5)).await.unwrap().unwrap();
        assert!(stored.is_market_open);
        assert_eq!(stored.holiday_name.as_deref(), Some("Closure"));
        assert_eq!(repo.range(d(2024, 1, 1), d(2024, 12, 31)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_calendar_over_database() {
        let repo = Arc::new(CalendarRepository::new(test_pool().await));
        let calendar = TradingCalendar::new(repo.clone());

        calendar.initialize_year(2025).await.unwrap();
        let stored = calendar.calendar_range(d(2025, 1, 1), d(2025, 12, 31)).await.unwrap();
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[0].date, d(2025, 1, 1));

        assert!(!calendar.is_open(d(2025, 4, 18)).await.unwrap()); // Good Friday
        assert!(calendar.is_open(d(2025, 4, 17)).await.unwrap());
    }
}

//! Calendar Overrides Trait
//!
//! Sparse storage of exceptions to the computed trading calendar. Only days
//! that differ from the default rules (or that were explicitly recorded as
//! holidays) are stored, keyed by `(date, market_type)`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::entities::tracking::CalendarDay;
use crate::domain::errors::CalendarError;

#[async_trait]
pub trait CalendarOverrides: Send + Sync {
    /// Override stored for `date`, if any.
    async fn get(&self, date: NaiveDate) -> Result<Option<CalendarDay>, CalendarError>;

    /// Insert or replace the override for `day.date`.
    async fn upsert(&self, day: &CalendarDay) -> Result<(), CalendarError>;

    /// Overrides in `[start, end]`, ordered by date.
    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>, CalendarError>;
}

/// Process-local overrides, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryCalendarOverrides {
    days: RwLock<BTreeMap<NaiveDate, CalendarDay>>,
}

impl InMemoryCalendarOverrides {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarOverrides for InMemoryCalendarOverrides {
    async fn get(&self, date: NaiveDate) -> Result<Option<CalendarDay>, CalendarError> {
        Ok(self.days.read().await.get(&date).cloned())
    }

    async fn upsert(&self, day: &CalendarDay) -> Result<(), CalendarError> {
        self.days.write().await.insert(day.date, day.clone());
        Ok(())
    }

    async fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>, CalendarError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .days
            .read()
            .await
            .range(start..=end)
            .map(|(_, day)| day.clone())
            .collect())
    }
}

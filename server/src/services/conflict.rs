use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Schedule, TimeWindow};
use crate::store::Store;
use crate::utils::AppResult;

/// Finds schedules of a theater whose `[start, end)` overlaps a window.
///
/// Used for early, friendly rejection; the store repeats the check under
/// the theater lock when it writes.
#[derive(Clone)]
pub struct ScheduleConflictDetector {
    store: Arc<dyn Store>,
}

impl ScheduleConflictDetector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn conflicts(
        &self,
        theater_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<Vec<Schedule>> {
        Ok(self
            .store
            .schedules_overlapping(theater_id, window, exclude)
            .await?)
    }

    pub async fn has_conflict(
        &self,
        theater_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> AppResult<bool> {
        Ok(!self.conflicts(theater_id, window, exclude).await?.is_empty())
    }
}

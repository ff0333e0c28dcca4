//! Daily log operations on top of the store.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{DailyLog, LogAction, LogData, LogPatch, LogSummary};
use crate::auth::model::Session;
use crate::clock::Clock;
use crate::error::{DatabaseError, LogError};
use crate::store::{Database, LogWrite};

/// Get-or-create, update, and history access for daily logs.
pub struct LogService {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
}

fn store_error(op: &'static str, e: DatabaseError) -> LogError {
    warn!(op, error = %e, "Log store failure");
    LogError::Store(e)
}

impl LogService {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Return the caller's record for today, creating a default one on first
    /// access. `None` when nobody is signed in.
    pub async fn get_or_create_today(
        &self,
        session: &Session,
    ) -> Result<Option<DailyLog>, LogError> {
        let Some(user) = session.identity() else {
            return Ok(None);
        };
        let today = self.clock.today();

        if let Some(existing) = self
            .db
            .get_log_by_date(user.id, today)
            .await
            .map_err(|e| store_error("get_or_create_today", e))?
        {
            return Ok(Some(existing));
        }

        let log = self
            .db
            .insert_log_if_absent(user.id, today, &LogData::default())
            .await
            .map_err(|e| store_error("get_or_create_today", e))?;
        info!(log_id = %log.id, user_id = %user.id, date = %today, "Created daily log");
        Ok(Some(log))
    }

    /// Replace a record's payload wholesale.
    ///
    /// With `expected_revision` set the write only lands if nobody else has
    /// written since that revision.
    pub async fn update_log(
        &self,
        id: Uuid,
        log_data: LogData,
        expected_revision: Option<i64>,
    ) -> Result<DailyLog, LogError> {
        let outcome = self
            .db
            .update_log_data(id, &log_data, expected_revision)
            .await
            .map_err(|e| store_error("update_log", e))?;
        write_result(id, expected_revision, outcome)
    }

    /// Summaries of the caller's records, newest first. Empty when nobody is
    /// signed in.
    pub async fn list_history(&self, session: &Session) -> Result<Vec<LogSummary>, LogError> {
        let Some(user) = session.identity() else {
            return Ok(Vec::new());
        };
        self.db
            .list_log_summaries(user.id)
            .await
            .map_err(|e| store_error("list_history", e))
    }

    pub async fn get_log(&self, id: Uuid) -> Result<Option<DailyLog>, LogError> {
        self.db
            .get_log(id)
            .await
            .map_err(|e| store_error("get_log", e))
    }

    /// Merge the present fields of `patch` over the stored payload.
    pub async fn patch_log(
        &self,
        id: Uuid,
        patch: LogPatch,
        expected_revision: Option<i64>,
    ) -> Result<DailyLog, LogError> {
        let current = self.load_for_write(id, expected_revision).await?;
        if patch.is_empty() {
            return Ok(current);
        }
        let revision = current.revision;
        let merged = patch.merge_into(current.log_data);
        self.update_log(id, merged, Some(revision)).await
    }

    /// Apply one form edit. An edit that changes nothing returns the current
    /// record without writing.
    pub async fn apply_action(
        &self,
        id: Uuid,
        action: LogAction,
        expected_revision: Option<i64>,
    ) -> Result<DailyLog, LogError> {
        let mut current = self.load_for_write(id, expected_revision).await?;
        if !current.log_data.apply(&action) {
            debug!(log_id = %id, ?action, "Action left log unchanged");
            return Ok(current);
        }
        let revision = current.revision;
        self.update_log(id, std::mem::take(&mut current.log_data), Some(revision))
            .await
    }

    /// Read a record ahead of a read-modify-write, checking the caller's
    /// revision up front.
    async fn load_for_write(
        &self,
        id: Uuid,
        expected_revision: Option<i64>,
    ) -> Result<DailyLog, LogError> {
        let current = self.get_log(id).await?.ok_or(LogError::NotFound { id })?;
        if let Some(expected) = expected_revision {
            if expected != current.revision {
                return Err(LogError::Conflict {
                    id,
                    expected,
                    actual: current.revision,
                });
            }
        }
        Ok(current)
    }
}

fn write_result(
    id: Uuid,
    expected_revision: Option<i64>,
    outcome: LogWrite,
) -> Result<DailyLog, LogError> {
    match outcome {
        LogWrite::Updated(log) => {
            debug!(log_id = %id, revision = log.revision, "Updated daily log");
            Ok(log)
        }
        LogWrite::Missing => Err(LogError::NotFound { id }),
        LogWrite::RevisionMismatch { actual } => {
            let expected = expected_revision.unwrap_or_default();
            info!(log_id = %id, expected, actual, "Rejected stale log write");
            Err(LogError::Conflict {
                id,
                expected,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::auth::model::Identity;
    use crate::clock::FixedClock;
    use crate::logs::model::ListSection;
    use crate::store::LibSqlBackend;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn test_setup(today: NaiveDate) -> (Arc<dyn Database>, LogService, Session) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user = db.insert_user("a@example.com", "salt$hash").await.unwrap();
        let service = LogService::new(Arc::clone(&db), Arc::new(FixedClock::new(today)));
        (db, service, Session(Some(user.identity())))
    }

    #[tokio::test]
    async fn today_requires_a_session() {
        let (_db, service, _session) = test_setup(date(2024, 6, 5)).await;
        let log = service
            .get_or_create_today(&Session::anonymous())
            .await
            .unwrap();
        assert!(log.is_none());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;

        let first = service.get_or_create_today(&session).await.unwrap().unwrap();
        let second = service.get_or_create_today(&session).await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.date, date(2024, 6, 5));
        assert_eq!(first.revision, 1);
        assert_eq!(first.log_data, LogData::default());
    }

    #[tokio::test]
    async fn concurrent_first_access_converges() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;

        let (a, b) = tokio::join!(
            service.get_or_create_today(&session),
            service.get_or_create_today(&session)
        );
        assert_eq!(a.unwrap().unwrap().id, b.unwrap().unwrap().id);
        assert_eq!(service.list_history(&session).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_update_fetch_scenario() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;

        let log = service.get_or_create_today(&session).await.unwrap().unwrap();
        let mut data = log.log_data.clone();
        data.accomplished = vec!["shipped feature X".to_string()];
        service.update_log(log.id, data, None).await.unwrap();

        let fetched = service.get_log(log.id).await.unwrap().unwrap();
        assert_eq!(fetched.log_data.accomplished, vec!["shipped feature X"]);
        assert!(fetched.log_data.in_progress.is_empty());
        assert!(!fetched.log_data.cleanup.desk_reset);
        assert_eq!(fetched.log_data.shutdown_ritual, "");
        assert_eq!(fetched.revision, 2);
    }

    #[tokio::test]
    async fn update_missing_log_is_not_found() {
        let (_db, service, _session) = test_setup(date(2024, 6, 5)).await;
        let id = Uuid::new_v4();
        let err = service
            .update_log(id, LogData::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::NotFound { id: missing } if missing == id));
        assert!(service.get_log(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;
        let log = service.get_or_create_today(&session).await.unwrap().unwrap();

        let updated = service
            .update_log(log.id, LogData::default(), Some(1))
            .await
            .unwrap();
        assert_eq!(updated.revision, 2);

        let err = service
            .update_log(log.id, LogData::default(), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_empty_when_signed_out() {
        let (db, service, session) = test_setup(date(2024, 6, 5)).await;
        let user_id = session.identity().unwrap().id;
        for d in [date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 2)] {
            db.insert_log_if_absent(user_id, d, &LogData::default())
                .await
                .unwrap();
        }

        let dates: Vec<_> = service
            .list_history(&session)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.date)
            .collect();
        assert_eq!(dates, vec![date(2024, 1, 3), date(2024, 1, 2), date(2024, 1, 1)]);

        assert!(service
            .list_history(&Session::anonymous())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn history_is_scoped_to_the_caller() {
        let (db, service, session) = test_setup(date(2024, 6, 5)).await;
        service.get_or_create_today(&session).await.unwrap();

        let other = db.insert_user("b@example.com", "salt$hash").await.unwrap();
        let other_session = Session(Some(Identity {
            id: other.id,
            email: other.email,
        }));
        assert!(service.list_history(&other_session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_merges_present_fields() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;
        let log = service.get_or_create_today(&session).await.unwrap().unwrap();
        let mut data = LogData::default();
        data.in_progress = vec!["refactor".to_string()];
        service.update_log(log.id, data, None).await.unwrap();

        let patched = service
            .patch_log(
                log.id,
                LogPatch {
                    accomplished: Some(vec!["tests".to_string()]),
                    ..Default::default()
                },
                Some(2),
            )
            .await
            .unwrap();
        assert_eq!(patched.log_data.accomplished, vec!["tests"]);
        assert_eq!(patched.log_data.in_progress, vec!["refactor"]);
        assert_eq!(patched.revision, 3);

        let err = service
            .patch_log(log.id, LogPatch::default(), Some(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::Conflict { actual: 3, .. }));
    }

    #[tokio::test]
    async fn empty_patch_does_not_write() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;
        let log = service.get_or_create_today(&session).await.unwrap().unwrap();
        let same = service
            .patch_log(log.id, LogPatch::default(), None)
            .await
            .unwrap();
        assert_eq!(same.revision, 1);
    }

    #[tokio::test]
    async fn actions_write_only_when_something_changes() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;
        let log = service.get_or_create_today(&session).await.unwrap().unwrap();

        let add = LogAction::AddItem {
            section: ListSection::InProgress,
            value: " refactor ".to_string(),
        };
        let after_add = service.apply_action(log.id, add.clone(), None).await.unwrap();
        assert_eq!(after_add.log_data.in_progress, vec!["refactor"]);
        assert_eq!(after_add.revision, 2);

        let after_dup = service.apply_action(log.id, add, None).await.unwrap();
        assert_eq!(after_dup.revision, 2);
    }

    #[tokio::test]
    async fn reasoning_survives_remove_item_but_not_remove_in_progress() {
        let (_db, service, session) = test_setup(date(2024, 6, 5)).await;
        let log = service.get_or_create_today(&session).await.unwrap().unwrap();

        for action in [
            LogAction::AddItem {
                section: ListSection::InProgress,
                value: "a".to_string(),
            },
            LogAction::AddItem {
                section: ListSection::InProgress,
                value: "b".to_string(),
            },
            LogAction::SetReasoning {
                item: "a".to_string(),
                reason: "blocked on review".to_string(),
            },
            LogAction::SetReasoning {
                item: "b".to_string(),
                reason: "ran out of time".to_string(),
            },
            LogAction::RemoveItem {
                section: ListSection::InProgress,
                value: "a".to_string(),
            },
            LogAction::RemoveInProgress {
                item: "b".to_string(),
            },
        ] {
            service.apply_action(log.id, action, None).await.unwrap();
        }

        let stored = service.get_log(log.id).await.unwrap().unwrap().log_data;
        assert!(stored.in_progress.is_empty());
        assert_eq!(
            stored.not_done_reasoning.get("a").map(String::as_str),
            Some("blocked on review")
        );
        assert!(!stored.not_done_reasoning.contains_key("b"));
    }

    #[tokio::test]
    async fn action_on_missing_log_is_not_found() {
        let (_db, service, _session) = test_setup(date(2024, 6, 5)).await;
        let err = service
            .apply_action(
                Uuid::new_v4(),
                LogAction::SetShutdownRitual {
                    text: "done".to_string(),
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::NotFound { .. }));
    }
}

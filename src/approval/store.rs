//! Approval workflow
//!
//! Persists requests in the `approval_requests` table of the administrative
//! store and drives the `pending -> approved | declined` transition.
//!
//! Approval runs the stored statement against its target database. A
//! statement that fails to execute still resolves the request, as
//! `declined`, and the caller gets the execution error.
//!
//! Approve and decline of one request id are serialised by a per-id lock,
//! and the terminal update only matches a row that is still `pending`, so a
//! statement is executed at most once.

use super::models::{ApprovalRequest, ApprovalStatus};
use crate::db::queries::{
    CREATE_APPROVAL_REQUESTS, GET_APPROVAL_REQUEST, INSERT_APPROVAL_REQUEST,
    LIST_APPROVAL_REQUESTS, RESOLVE_APPROVAL_REQUEST,
};
use crate::db::{Datastore, QueryOutcome, SqlParam};
use crate::error::AppError;
use crate::snapshot::SnapshotService;
use crate::statement::target_table;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

pub struct ApprovalWorkflow {
    store: Arc<dyn Datastore>,
    snapshots: SnapshotService,
    admin_db: String,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn Datastore>, admin_db: impl Into<String>) -> Self {
        Self {
            snapshots: SnapshotService::new(store.clone()),
            store,
            admin_db: admin_db.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ensure_schema(&self) -> Result<(), AppError> {
        self.store
            .execute(Some(&self.admin_db), CREATE_APPROVAL_REQUESTS, &[])?;
        Ok(())
    }

    /// Record a statement for review and return its id. The target table is
    /// snapshotted first when it can be determined; a failed snapshot leaves
    /// the request without one.
    pub fn submit(&self, user: &str, sql: &str, target_db: &str) -> Result<i64, AppError> {
        let snapshot_path = match target_table(sql) {
            Some(table) => match self.snapshots.snapshot(target_db, &table) {
                Ok(artifact) => {
                    info!(
                        "Snapshot of {}.{} captured at {}: {} rows, sha256 {}",
                        target_db,
                        table,
                        artifact.captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                        artifact.row_count,
                        artifact.checksum
                    );
                    Some(artifact.path.to_string_lossy().into_owned())
                }
                Err(e) => {
                    warn!("No snapshot for request on {}.{}: {}", target_db, table, e);
                    None
                }
            },
            None => {
                debug!("No target table found in submitted statement");
                None
            }
        };

        let submitted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let outcome = self.store.execute(
            Some(&self.admin_db),
            INSERT_APPROVAL_REQUEST,
            &[
                text(user),
                text(sql),
                SqlParam::Text(submitted_at),
                text(target_db),
                snapshot_path.map_or(SqlParam::Null, SqlParam::Text),
            ],
        )?;

        let id = match outcome {
            QueryOutcome::Ack(ack) => ack.last_insert_id,
            QueryOutcome::Rows(_) => {
                return Err(AppError::Internal("insert returned rows".to_string()));
            }
        };

        info!("Approval request {} submitted by '{}' for '{}'", id, user, target_db);
        Ok(id)
    }

    /// Every request, most recent first
    pub fn list(&self) -> Result<Vec<ApprovalRequest>, AppError> {
        self.store
            .execute(Some(&self.admin_db), LIST_APPROVAL_REQUESTS, &[])?
            .into_rows()
            .iter()
            .map(ApprovalRequest::from_row)
            .collect()
    }

    pub fn get(&self, id: i64) -> Result<Option<ApprovalRequest>, AppError> {
        self.store
            .execute(Some(&self.admin_db), GET_APPROVAL_REQUEST, &[SqlParam::Integer(id)])?
            .into_rows()
            .first()
            .map(ApprovalRequest::from_row)
            .transpose()
    }

    /// Execute a pending request's statement and resolve it.
    ///
    /// Fails with `NotFound` for an unknown id and `AlreadyProcessed` for a
    /// resolved one, without side effects. A statement that fails leaves the
    /// request `declined` with `approver` recorded and returns `Execution`.
    /// A request resolved by another writer while its statement ran yields
    /// `AlreadyProcessed` and keeps that writer's outcome.
    pub fn approve(&self, id: i64, approver: &str) -> Result<(), AppError> {
        self.with_request_lock(id, || {
            let request = self
                .get(id)?
                .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

            if request.status.is_terminal() {
                return Err(AppError::AlreadyProcessed("Request already processed".to_string()));
            }

            let execution = self
                .store
                .execute(request.target_db.as_deref(), &request.sql, &[]);

            let status = if execution.is_ok() {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Declined
            };
            let resolved = self.resolve(id, status, approver)?;

            match execution {
                Ok(_) if resolved => {
                    info!("Request {} approved by '{}'", id, approver);
                    Ok(())
                }
                Ok(_) => {
                    error!("Request {} was executed but resolved elsewhere first", id);
                    Err(AppError::AlreadyProcessed("Request already processed".to_string()))
                }
                Err(e) => {
                    if !resolved {
                        warn!("Request {} was resolved elsewhere during approval", id);
                    }
                    error!("Request {} declined after failed execution: {}", id, e);
                    Err(AppError::Execution(format!(
                        "Failed to execute SQL; request declined. Error: {}",
                        e
                    )))
                }
            }
        })
    }

    /// Decline a pending request. A request that is unknown or already
    /// resolved is left untouched and the call still succeeds.
    pub fn decline(&self, id: i64, decliner: &str) -> Result<(), AppError> {
        self.with_request_lock(id, || {
            if self.resolve(id, ApprovalStatus::Declined, decliner)? {
                info!("Request {} declined by '{}'", id, decliner);
            } else {
                warn!("Decline of request {} by '{}' changed nothing", id, decliner);
            }
            Ok(())
        })
    }

    /// Terminal update of a still-pending row; false when no row matched
    fn resolve(&self, id: i64, status: ApprovalStatus, reviewer: &str) -> Result<bool, AppError> {
        let outcome = self.store.execute(
            Some(&self.admin_db),
            RESOLVE_APPROVAL_REQUEST,
            &[text(status.as_str()), text(reviewer), SqlParam::Integer(id)],
        )?;
        Ok(outcome.rows_affected() > 0)
    }

    fn with_request_lock<T>(
        &self,
        id: i64,
        f: impl FnOnce() -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| poisoned())?;
            locks.entry(id).or_default().clone()
        };

        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(poisoned()),
        };

        // Clones are only taken and released under the map lock, so the
        // count is exact here: the map's entry plus ours means no waiters.
        if let Ok(mut locks) = self.locks.lock() {
            if Arc::strong_count(&lock) <= 2 {
                locks.remove(&id);
            }
            drop(lock);
        }

        result
    }
}

fn text(value: &str) -> SqlParam {
    SqlParam::Text(value.to_string())
}

fn poisoned() -> AppError {
    AppError::Internal("approval lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SchemaDescription, SqliteStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<SqliteStore>,
        workflow: ApprovalWorkflow,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(dir.path()));
        store.ensure_database("admin").unwrap();
        store.ensure_database("shop").unwrap();
        store
            .execute(Some("shop"), "CREATE TABLE accounts (id INTEGER PRIMARY KEY, x INTEGER)", &[])
            .unwrap();
        store
            .execute(Some("shop"), "INSERT INTO accounts (x) VALUES (0), (0)", &[])
            .unwrap();

        let workflow = ApprovalWorkflow::new(store.clone(), "admin");
        workflow.ensure_schema().unwrap();
        Fixture {
            _dir: dir,
            store,
            workflow,
        }
    }

    fn request(f: &Fixture, id: i64) -> ApprovalRequest {
        f.workflow.get(id).unwrap().unwrap()
    }

    fn sum_x(f: &Fixture) -> i64 {
        let rows = f
            .store
            .execute(Some("shop"), "SELECT COALESCE(SUM(x), 0) AS total FROM accounts", &[])
            .unwrap()
            .into_rows();
        rows[0]["total"].as_i64().unwrap()
    }

    #[test]
    fn test_submit_creates_pending_request_with_snapshot() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE accounts SET x=1", "shop").unwrap();

        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Pending);
        assert_eq!(req.user, "test");
        assert_eq!(req.sql, "UPDATE accounts SET x=1");
        assert_eq!(req.target_db.as_deref(), Some("shop"));
        assert_eq!(req.approved_by, None);

        let path = req.snapshot_path.expect("snapshot taken");
        let rows: serde_json::Value =
            serde_json::from_slice(&std::fs::read(Path::new(&path)).unwrap()).unwrap();
        assert_eq!(rows, json!([{"id": 1, "x": 0}, {"id": 2, "x": 0}]));

        // Submission does not execute
        assert_eq!(sum_x(&f), 0);
    }

    #[test]
    fn test_submit_snapshots_quoted_target() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE \"Accounts\" SET x=1", "shop").unwrap();
        assert!(request(&f, id).snapshot_path.is_some());
    }

    #[test]
    fn test_ids_increase() {
        let f = fixture();
        let first = f.workflow.submit("test", "UPDATE accounts SET x=1", "shop").unwrap();
        let second = f.workflow.submit("test", "UPDATE accounts SET x=2", "shop").unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_submit_without_table_takes_no_snapshot() {
        let f = fixture();
        let id = f.workflow.submit("test", "SELECT * FROM accounts", "shop").unwrap();
        assert_eq!(request(&f, id).snapshot_path, None);
        assert!(!f.store.dbs_dir().join("backups").exists());
    }

    #[test]
    fn test_snapshot_failure_does_not_block() {
        let f = fixture();
        let missing_table = f.workflow.submit("test", "DELETE ghosts", "shop").unwrap();
        let missing_db = f.workflow.submit("test", "UPDATE accounts SET x=1", "nowhere").unwrap();

        assert_eq!(request(&f, missing_table).snapshot_path, None);
        assert_eq!(request(&f, missing_db).snapshot_path, None);
        assert_eq!(request(&f, missing_db).status, ApprovalStatus::Pending);
    }

    #[test]
    fn test_statement_text_is_stored_literally() {
        let f = fixture();
        let sql = "UPDATE accounts SET x = 1 WHERE 'a' = 'a'); DROP TABLE approval_requests; --";
        let id = f.workflow.submit("o'brien", sql, "shop").unwrap();

        let req = request(&f, id);
        assert_eq!(req.sql, sql);
        assert_eq!(req.user, "o'brien");
    }

    #[test]
    fn test_list_most_recent_first() {
        let f = fixture();
        let a = f.workflow.submit("test", "UPDATE accounts SET x=1", "shop").unwrap();
        let b = f.workflow.submit("test", "UPDATE accounts SET x=2", "shop").unwrap();
        let c = f.workflow.submit("test", "UPDATE accounts SET x=3", "shop").unwrap();

        let ids: Vec<i64> = f.workflow.list().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c, b, a]);
    }

    #[test]
    fn test_approve_executes_statement() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE accounts SET x=1", "shop").unwrap();

        f.workflow.approve(id, "admin").unwrap();

        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Approved);
        assert_eq!(req.approved_by.as_deref(), Some("admin"));
        assert_eq!(sum_x(&f), 2);
    }

    #[test]
    fn test_approve_unknown_request() {
        let f = fixture();
        let err = f.workflow.approve(999, "admin").unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Request not found"));
    }

    #[test]
    fn test_second_approve_is_rejected() {
        let f = fixture();
        let id = f
            .workflow
            .submit("test", "UPDATE accounts SET x = x + 1", "shop")
            .unwrap();

        f.workflow.approve(id, "admin").unwrap();
        let err = f.workflow.approve(id, "other").unwrap_err();

        assert!(matches!(err, AppError::AlreadyProcessed(_)));
        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Approved);
        assert_eq!(req.approved_by.as_deref(), Some("admin"));
        assert_eq!(sum_x(&f), 2);
    }

    #[test]
    fn test_failed_execution_declines() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE ghosts SET x=1", "shop").unwrap();

        let err = f.workflow.approve(id, "admin").unwrap_err();
        match err {
            AppError::Execution(msg) => {
                assert!(msg.starts_with("Failed to execute SQL; request declined. Error:"));
                assert!(msg.contains("no such table"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Declined);
        assert_eq!(req.approved_by.as_deref(), Some("admin"));
    }

    #[test]
    fn test_multi_statement_request_is_declined_untouched() {
        let f = fixture();
        let id = f
            .workflow
            .submit("test", "UPDATE accounts SET x = 1; DELETE FROM accounts", "shop")
            .unwrap();

        let err = f.workflow.approve(id, "admin").unwrap_err();
        assert!(matches!(err, AppError::Execution(_)));

        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Declined);
        assert_eq!(req.approved_by.as_deref(), Some("admin"));

        let rows = f
            .store
            .execute(Some("shop"), "SELECT id, x FROM accounts ORDER BY id", &[])
            .unwrap()
            .into_rows();
        assert_eq!(
            serde_json::to_value(rows).unwrap(),
            json!([{"id": 1, "x": 0}, {"id": 2, "x": 0}])
        );
    }

    /// Resolves every pending request in the admin store whenever a
    /// statement runs against "shop", as a second writer would
    struct RacingStore {
        inner: SqliteStore,
    }

    impl Datastore for RacingStore {
        fn resolve(&self, db_name: Option<&str>) -> Result<PathBuf, AppError> {
            self.inner.resolve(db_name)
        }

        fn execute(
            &self,
            db_name: Option<&str>,
            sql: &str,
            params: &[SqlParam],
        ) -> Result<QueryOutcome, AppError> {
            if db_name == Some("shop") {
                self.inner.execute(
                    Some("admin"),
                    "UPDATE approval_requests SET status = 'declined', approved_by = 'other' WHERE status = 'pending'",
                    &[],
                )?;
            }
            self.inner.execute(db_name, sql, params)
        }

        fn schema(&self, db_name: Option<&str>) -> Result<SchemaDescription, AppError> {
            self.inner.schema(db_name)
        }

        fn list_databases(&self) -> Result<Vec<String>, AppError> {
            self.inner.list_databases()
        }
    }

    #[test]
    fn test_approve_loses_to_concurrent_resolution() {
        let f = fixture();
        let racing = Arc::new(RacingStore {
            inner: SqliteStore::new(f.store.dbs_dir()),
        });
        let workflow = ApprovalWorkflow::new(racing, "admin");

        let id = workflow.submit("test", "UPDATE accounts SET x = 5", "shop").unwrap();
        let err = workflow.approve(id, "admin").unwrap_err();

        assert!(matches!(err, AppError::AlreadyProcessed(ref m) if m == "Request already processed"));
        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Declined);
        assert_eq!(req.approved_by.as_deref(), Some("other"));
    }

    #[test]
    fn test_approve_against_missing_database_declines() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE accounts SET x=1", "nowhere").unwrap();

        assert!(matches!(f.workflow.approve(id, "admin"), Err(AppError::Execution(_))));
        assert_eq!(request(&f, id).status, ApprovalStatus::Declined);
    }

    #[test]
    fn test_decline_pending() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE accounts SET x=1", "shop").unwrap();

        f.workflow.decline(id, "reviewer").unwrap();

        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Declined);
        assert_eq!(req.approved_by.as_deref(), Some("reviewer"));
        assert_eq!(sum_x(&f), 0);

        assert!(matches!(f.workflow.approve(id, "admin"), Err(AppError::AlreadyProcessed(_))));
        assert_eq!(sum_x(&f), 0);
    }

    #[test]
    fn test_decline_resolved_is_silent_noop() {
        let f = fixture();
        let id = f.workflow.submit("test", "UPDATE accounts SET x=1", "shop").unwrap();
        f.workflow.approve(id, "admin").unwrap();

        f.workflow.decline(id, "reviewer").unwrap();
        f.workflow.decline(12345, "reviewer").unwrap();

        let req = request(&f, id);
        assert_eq!(req.status, ApprovalStatus::Approved);
        assert_eq!(req.approved_by.as_deref(), Some("admin"));
    }

    #[test]
    fn test_concurrent_approvals_execute_once() {
        let f = fixture();
        let id = f
            .workflow
            .submit("test", "INSERT INTO accounts (x) VALUES (10)", "shop")
            .unwrap();

        let successes: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let workflow = &f.workflow;
                    scope.spawn(move || workflow.approve(id, &format!("reviewer{}", i)).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });

        assert_eq!(successes, 1);
        assert_eq!(sum_x(&f), 10);
        assert_eq!(request(&f, id).status, ApprovalStatus::Approved);
        assert!(f.workflow.locks.lock().unwrap().is_empty());
    }
}

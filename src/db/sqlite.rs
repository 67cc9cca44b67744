//! SQLite-backed datastore
//!
//! Each logical database is one `{name}.db` file inside the configured
//! directory.

use super::queries::{GET_COLUMNS, LIST_OBJECTS};
use super::{
    ColumnDescription, Datastore, QueryOutcome, Row, SchemaDescription, SqlParam, WriteAck,
};
use crate::error::AppError;
use crate::statement::classify;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Batch, Connection, OpenFlags, Statement};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DB_EXTENSION: &str = "db";

/// Busy timeout for a contended store
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Directory of named SQLite stores
pub struct SqliteStore {
    dbs_dir: PathBuf,
}

impl SqliteStore {
    pub fn new(dbs_dir: impl Into<PathBuf>) -> Self {
        Self {
            dbs_dir: dbs_dir.into(),
        }
    }

    pub fn dbs_dir(&self) -> &Path {
        &self.dbs_dir
    }

    /// Create the store directory and the named database file if missing.
    /// Only bootstrap code calls this; regular execution never creates files.
    pub fn ensure_database(&self, db_name: &str) -> Result<PathBuf, AppError> {
        std::fs::create_dir_all(&self.dbs_dir)?;
        let path = self.dbs_dir.join(Self::file_name(db_name)?);
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        Connection::open_with_flags(&path, flags)?;
        info!("Database ready: {}", path.display());
        Ok(path)
    }

    /// Normalise a logical name to its file name
    fn file_name(db_name: &str) -> Result<String, AppError> {
        let name = db_name.trim();
        if name.is_empty()
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
        {
            return Err(AppError::NotFound(format!("Invalid database name '{}'", db_name)));
        }
        let suffix = format!(".{}", DB_EXTENSION);
        if name.ends_with(&suffix) {
            Ok(name.to_string())
        } else {
            Ok(format!("{}{}", name, suffix))
        }
    }

    fn open(path: &Path) -> Result<Connection, AppError> {
        debug!("Opening connection to DB: {}", path.display());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| AppError::Execution(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| AppError::Execution(e.to_string()))?;
        Ok(conn)
    }

    /// Run one statement on a fresh connection to `path`
    fn execute_at(
        &self,
        path: &Path,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<QueryOutcome, AppError> {
        let conn = Self::open(path)?;
        debug!("Executing SQL: {}", sql);

        let result = run_statement(&conn, sql, params);
        drop(conn);
        debug!("Database connection closed");

        match result {
            Ok(outcome) => {
                match &outcome {
                    QueryOutcome::Rows(rows) => debug!("Query returned {} rows", rows.len()),
                    QueryOutcome::Ack(ack) => {
                        info!("Query executed and changes committed ({} rows)", ack.rows_affected)
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                error!("SQL execution error: {}", e);
                Err(e)
            }
        }
    }
}

impl Datastore for SqliteStore {
    fn resolve(&self, db_name: Option<&str>) -> Result<PathBuf, AppError> {
        let file = match db_name {
            Some(name) => Self::file_name(name)?,
            None => {
                let first = self.list_databases()?.into_iter().next().ok_or_else(|| {
                    AppError::NotFound(format!("No .db files found in {}", self.dbs_dir.display()))
                })?;
                Self::file_name(&first)?
            }
        };

        let path = self.dbs_dir.join(&file);
        if !path.is_file() {
            error!("Database file '{}' not found in {}", file, self.dbs_dir.display());
            return Err(AppError::NotFound(format!(
                "Database file '{}' not found in {}",
                file,
                self.dbs_dir.display()
            )));
        }
        Ok(path)
    }

    fn execute(
        &self,
        db_name: Option<&str>,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<QueryOutcome, AppError> {
        let path = self.resolve(db_name)?;
        self.execute_at(&path, sql, params)
    }

    fn schema(&self, db_name: Option<&str>) -> Result<SchemaDescription, AppError> {
        let path = self.resolve(db_name)?;
        let db = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let objects = self.execute_at(&path, LIST_OBJECTS, &[])?.into_rows();

        let mut main = Map::new();
        for object in objects {
            let name = text(&object, "name");
            let kind = text(&object, "type");

            let columns = match self.execute_at(&path, GET_COLUMNS, &[SqlParam::Text(name.clone())]) {
                Ok(outcome) => outcome
                    .into_rows()
                    .iter()
                    .map(|c| ColumnDescription {
                        name: text(c, "name"),
                        data_type: text(c, "type"),
                    })
                    .collect(),
                Err(e) => {
                    warn!("Columns unavailable for {} in {}: {}", name, db, e);
                    vec![ColumnDescription::unavailable()]
                }
            };

            main.insert(format!("{} ({})", name, kind), serde_json::to_value(columns)?);
        }

        let mut schemas = Map::new();
        schemas.insert("main".to_string(), Value::Object(main));
        info!("Schema fetched for DB: {}", db);

        Ok(SchemaDescription { db, schemas })
    }

    fn list_databases(&self) -> Result<Vec<String>, AppError> {
        let mut names: Vec<String> = std::fs::read_dir(&self.dbs_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == DB_EXTENSION))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Prepare the single statement in `sql`. Blank text and text holding more
/// than one statement are both rejected before anything runs.
fn prepare_single<'conn>(conn: &'conn Connection, sql: &str) -> Result<Statement<'conn>, AppError> {
    let mut batch = Batch::new(conn, sql);
    let stmt = batch
        .next()
        .map_err(execution)?
        .ok_or_else(|| AppError::Execution("Empty statement".to_string()))?;

    // A trailing statement that fails to prepare is still a second statement
    if !matches!(batch.next(), Ok(None)) {
        return Err(execution(rusqlite::Error::MultipleStatement));
    }
    Ok(stmt)
}

fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[SqlParam],
) -> Result<QueryOutcome, AppError> {
    let mut stmt = prepare_single(conn, sql)?;

    if classify(sql).is_read() {
        read_rows(&mut stmt, params).map(QueryOutcome::Rows).map_err(execution)
    } else {
        // Stepped to completion so writes that also return rows still commit
        let mut rows = stmt.query(params_from_iter(params.iter())).map_err(execution)?;
        while rows.next().map_err(execution)?.is_some() {}
        drop(rows);

        let rows_affected = usize::try_from(conn.changes()).unwrap_or(usize::MAX);
        Ok(QueryOutcome::Ack(WriteAck::new(rows_affected, conn.last_insert_rowid())))
    }
}

fn read_rows(stmt: &mut Statement<'_>, params: &[SqlParam]) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), to_json(row.get_ref(i)?));
        }
        result.push(record);
    }
    Ok(result)
}

fn execution(e: rusqlite::Error) -> AppError {
    AppError::Execution(e.to_string())
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

fn text(row: &Row, column: &str) -> String {
    row.get(column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_with(names: &[&str]) -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path());
        for name in names {
            store.ensure_database(name).unwrap();
        }
        (dir, store)
    }

    fn seed_items(store: &SqliteStore) {
        store
            .execute(Some("shop"), "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, raw BLOB)", &[])
            .unwrap();
        store
            .execute(
                Some("shop"),
                "INSERT INTO items (id, name, price, raw) VALUES (?1, ?2, ?3, ?4)",
                &[
                    SqlParam::Integer(1),
                    SqlParam::Text("pen".into()),
                    SqlParam::Real(1.5),
                    SqlParam::Blob(vec![1, 2]),
                ],
            )
            .unwrap();
        store
            .execute(Some("shop"), "INSERT INTO items (id, name) VALUES (2, 'cup')", &[])
            .unwrap();
    }

    #[test]
    fn test_read_returns_rows_in_order() {
        let (_dir, store) = store_with(&["shop"]);
        seed_items(&store);

        let rows = store
            .execute(Some("shop"), "select name, id from items order by id", &[])
            .unwrap()
            .into_rows();

        assert_eq!(rows.len(), 2);
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["name".to_string(), "id".to_string()]);
        assert_eq!(rows[1].get("name"), Some(&json!("cup")));
    }

    #[test]
    fn test_value_mapping() {
        let (_dir, store) = store_with(&["shop"]);
        seed_items(&store);

        let rows = store
            .execute(Some("shop"), "SELECT price, raw FROM items ORDER BY id", &[])
            .unwrap()
            .into_rows();

        assert_eq!(rows[0].get("price"), Some(&json!(1.5)));
        assert_eq!(rows[0].get("raw"), Some(&json!([1, 2])));
        assert_eq!(rows[1].get("price"), Some(&Value::Null));
    }

    #[test]
    fn test_write_returns_ack() {
        let (_dir, store) = store_with(&["shop"]);
        seed_items(&store);

        let outcome = store
            .execute(Some("shop"), "UPDATE items SET price = 2", &[])
            .unwrap();
        assert_eq!(outcome.rows_affected(), 2);
        assert!(matches!(outcome, QueryOutcome::Ack(_)));
    }

    #[test]
    fn test_write_with_returning_clause_commits() {
        let (_dir, store) = store_with(&["shop"]);
        seed_items(&store);

        let outcome = store
            .execute(Some("shop"), "INSERT INTO items (name) VALUES ('mug') RETURNING id", &[])
            .unwrap();
        match outcome {
            QueryOutcome::Ack(ack) => {
                assert_eq!(ack.rows_affected, 1);
                assert_eq!(ack.last_insert_id, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_name_with_extension_is_accepted() {
        let (_dir, store) = store_with(&["shop"]);
        assert!(store.resolve(Some("shop.db")).is_ok());
    }

    #[test]
    fn test_unknown_database_is_not_found() {
        let (_dir, store) = store_with(&["shop"]);
        let err = store.execute(Some("nope"), "SELECT 1", &[]).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_path_traversal_is_rejected() {
        let (_dir, store) = store_with(&["shop"]);
        assert!(matches!(store.resolve(Some("../shop")), Err(AppError::NotFound(_))));
        assert!(matches!(store.resolve(Some("..")), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_default_database_is_first_sorted() {
        let (_dir, store) = store_with(&["zeta", "alpha"]);
        let path = store.resolve(None).unwrap();
        assert!(path.ends_with("alpha.db"));
    }

    #[test]
    fn test_no_default_database() {
        let (_dir, store) = store_with(&[]);
        std::fs::create_dir_all(store.dbs_dir()).unwrap();
        assert!(matches!(store.resolve(None), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_execution_error_is_verbatim() {
        let (_dir, store) = store_with(&["shop"]);
        let err = store
            .execute(Some("shop"), "DELETE FROM missing", &[])
            .unwrap_err();
        match err {
            AppError::Execution(msg) => assert!(msg.contains("no such table"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_statements_fail() {
        let (_dir, store) = store_with(&["shop"]);
        let err = store
            .execute(Some("shop"), "CREATE TABLE a (x); CREATE TABLE b (y)", &[])
            .unwrap_err();
        assert!(matches!(err, AppError::Execution(_)));

        let objects = store
            .execute(Some("shop"), "SELECT name FROM sqlite_master", &[])
            .unwrap()
            .into_rows();
        assert!(objects.is_empty());
    }

    #[test]
    fn test_trailing_statement_is_not_dropped() {
        let (_dir, store) = store_with(&["shop"]);
        seed_items(&store);

        let err = store
            .execute(Some("shop"), "UPDATE items SET price = 9; DELETE FROM items", &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Multiple statements provided");

        let rows = store
            .execute(Some("shop"), "SELECT price FROM items ORDER BY id", &[])
            .unwrap()
            .into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("price"), Some(&json!(1.5)));

        let err = store
            .execute(Some("shop"), "SELECT 1; SELECT 2", &[])
            .unwrap_err();
        assert!(matches!(err, AppError::Execution(_)));
    }

    #[test]
    fn test_trailing_semicolon_and_comment_are_allowed() {
        let (_dir, store) = store_with(&["shop"]);
        let rows = store
            .execute(Some("shop"), "SELECT 1 AS n; -- done", &[])
            .unwrap()
            .into_rows();
        assert_eq!(rows[0].get("n"), Some(&json!(1)));
    }

    #[test]
    fn test_empty_statement_is_rejected() {
        let (_dir, store) = store_with(&["shop"]);
        for sql in ["   ", "-- only a comment", ""] {
            match store.execute(Some("shop"), sql, &[]).unwrap_err() {
                AppError::Execution(msg) => assert_eq!(msg, "Empty statement"),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_list_databases() {
        let (dir, store) = store_with(&["shop", "admin"]);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(store.list_databases().unwrap(), vec!["admin", "shop"]);
    }

    #[test]
    fn test_schema() {
        let (_dir, store) = store_with(&["shop"]);
        seed_items(&store);
        store
            .execute(Some("shop"), "CREATE VIEW cheap AS SELECT name FROM items WHERE price < 2", &[])
            .unwrap();

        let schema = store.schema(Some("shop")).unwrap();
        assert_eq!(schema.db, "shop.db");

        let main = schema.schemas.get("main").unwrap();
        assert_eq!(
            main.get("items (table)").unwrap(),
            &json!([
                {"name": "id", "type": "INTEGER"},
                {"name": "name", "type": "TEXT"},
                {"name": "price", "type": "REAL"},
                {"name": "raw", "type": "BLOB"}
            ])
        );
        let view = main.get("cheap (view)").unwrap();
        assert_eq!(view[0]["name"], json!("name"));
    }
}

use std::sync::Mutex;

use ddc_common::error::{AppError, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;

/// A single replica's durable document store. One SQLite file per process; CAS is serialized
/// through `BEGIN IMMEDIATE` so two concurrent callers racing on the same key can never both
/// observe a match.
pub struct DurableStore {
    conn: Mutex<Connection>,
}

impl DurableStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::Fatal(format!("opening kv store at {path}: {e}")))?;
        conn.execute_batch("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .map_err(|e| AppError::Fatal(format!("initializing kv schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("kv store mutex poisoned");
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| AppError::Fatal(format!("reading {key}: {e}")))?;
        raw.map(|s| serde_json::from_str(&s).map_err(AppError::from)).transpose()
    }

    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock().expect("kv store mutex poisoned");
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, raw],
        )
        .map_err(|e| AppError::Fatal(format!("writing {key}: {e}")))?;
        Ok(())
    }

    pub fn cas(&self, key: &str, old: &Option<Value>, new: &Value) -> Result<(bool, Option<Value>)> {
        let mut conn = self.conn.lock().expect("kv store mutex poisoned");
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Fatal(format!("starting cas transaction for {key}: {e}")))?;

        let current_raw: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| AppError::Fatal(format!("reading {key}: {e}")))?;
        let current: Option<Value> = current_raw
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(AppError::from)?;

        if current != *old {
            return Ok((false, current));
        }

        let new_raw = serde_json::to_string(new)?;
        tx.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, new_raw],
        )
        .map_err(|e| AppError::Fatal(format!("writing {key}: {e}")))?;
        tx.commit()
            .map_err(|e| AppError::Fatal(format!("committing cas for {key}: {e}")))?;
        Ok((true, Some(new.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tmp_store() -> DurableStore {
        DurableStore::open(":memory:").unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let s = tmp_store();
        s.put("k", &json!({"a": 1})).unwrap();
        assert_eq!(s.get("k").unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn missing_key_is_none() {
        let s = tmp_store();
        assert_eq!(s.get("missing").unwrap(), None);
    }

    #[test]
    fn cas_succeeds_on_matching_old() {
        let s = tmp_store();
        s.put("k", &json!(1)).unwrap();
        let (ok, _) = s.cas("k", &Some(json!(1)), &json!(2)).unwrap();
        assert!(ok);
        assert_eq!(s.get("k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn cas_fails_on_mismatched_old_and_reports_current() {
        let s = tmp_store();
        s.put("k", &json!(1)).unwrap();
        let (ok, current) = s.cas("k", &Some(json!(99)), &json!(2)).unwrap();
        assert!(!ok);
        assert_eq!(current, Some(json!(1)));
        assert_eq!(s.get("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn cas_on_absent_key_requires_none_old() {
        let s = tmp_store();
        let (ok, _) = s.cas("fresh", &None, &json!("v")).unwrap();
        assert!(ok);
        assert_eq!(s.get("fresh").unwrap(), Some(json!("v")));
    }
}

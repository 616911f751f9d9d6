//! SQLite plan store
//!
//! One connection per store, guarded by a mutex. Several stores (processes,
//! threads) may open the same file: WAL mode plus a busy timeout serializes
//! their writers, and every conditional write is `ON CONFLICT DO NOTHING` on
//! the `(owner_key, item_key)` primary key, so racing materializations of
//! the same baseline produce each row exactly once.

use super::keys::{self, ItemKey};
use super::{BatchWrite, FailedWrite, PlanStore};
use crate::baseline::Baseline;
use crate::calendar::YearMonth;
use crate::config::FinzConfig;
use crate::errors::{FinzError, Result};
use crate::records::{ActualSpend, Allocation, ForecastOverride, Period, Rubro, SpendSource};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Embedded schema SQL from FINZ_SCHEMA.sql
const SCHEMA_SQL: &str = include_str!("../../FINZ_SCHEMA.sql");

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database named in config, creating it if needed.
    pub fn open_with_config(cfg: &FinzConfig) -> Result<Self> {
        let path = cfg.resolved_db_path();
        Self::open(&path, Duration::from_millis(cfg.store.busy_timeout_ms))
    }

    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                FinzError::store_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            FinzError::store_with_source(format!("failed to open db at {}", path.display()), e)
        })?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| FinzError::store_with_source("failed to set busy timeout", e))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| FinzError::store_with_source("failed to configure sqlite pragmas", e))?;

        Self::apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "plan store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FinzError::store_with_source("failed to open in-memory db", e))?;
        Self::apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn apply_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| FinzError::store_with_source("failed to apply schema", e))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FinzError::internal("plan store connection mutex poisoned"))
    }

    /// Write every row that is absent in one IMMEDIATE transaction.
    ///
    /// A row that fails is recorded and the rest of the chunk still commits.
    fn insert_if_absent<T>(
        &self,
        rows: &[T],
        key_of: impl Fn(&T) -> ItemKey,
        insert: impl Fn(&Transaction<'_>, &ItemKey, &T) -> rusqlite::Result<usize>,
    ) -> Result<BatchWrite> {
        if rows.is_empty() {
            return Ok(BatchWrite::default());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| FinzError::store_with_source("failed to begin write transaction", e))?;

        let mut outcome = BatchWrite::default();
        for row in rows {
            let key = key_of(row);
            match insert(&tx, &key, row) {
                Ok(0) => outcome.skipped += 1,
                Ok(_) => outcome.written += 1,
                Err(e) => outcome.failed.push(FailedWrite {
                    key,
                    reason: e.to_string(),
                }),
            }
        }

        tx.commit()
            .map_err(|e| FinzError::store_with_source("failed to commit write transaction", e))?;
        Ok(outcome)
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn baseline_from_row(row: &Row<'_>) -> rusqlite::Result<Baseline> {
    let body: String = row.get(0)?;
    serde_json::from_str(&body).map_err(|e| conversion_error(0, e))
}

fn allocation_from_row(row: &Row<'_>) -> rusqlite::Result<Allocation> {
    let calendar_month: String = row.get(4)?;
    Ok(Allocation {
        project_id: row.get(0)?,
        baseline_id: row.get(1)?,
        rubro_id: row.get(2)?,
        month_index: row.get(3)?,
        calendar_month: calendar_month
            .parse::<YearMonth>()
            .map_err(|e| conversion_error(4, e))?,
        amount: row.get(5)?,
        source: row.get(6)?,
    })
}

fn rubro_from_row(row: &Row<'_>) -> rusqlite::Result<Rubro> {
    Ok(Rubro {
        project_id: row.get(0)?,
        baseline_id: row.get(1)?,
        canonical_rubro_id: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        taxonomy_found: row.get(5)?,
        source: row.get(6)?,
    })
}

fn override_from_row(row: &Row<'_>) -> rusqlite::Result<ForecastOverride> {
    let updated_at: String = row.get(5)?;
    Ok(ForecastOverride {
        project_id: row.get(0)?,
        rubro_id: row.get(1)?,
        month_index: row.get(2)?,
        amount: row.get(3)?,
        updated_by: row.get(4)?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| conversion_error(5, e))?
            .with_timezone(&Utc),
    })
}

fn actual_from_row(row: &Row<'_>) -> rusqlite::Result<ActualSpend> {
    let period: String = row.get(2)?;
    let source: String = row.get(4)?;
    Ok(ActualSpend {
        project_id: row.get(0)?,
        rubro_id: row.get(1)?,
        period: serde_json::from_str::<Period>(&period).map_err(|e| conversion_error(2, e))?,
        amount: row.get(3)?,
        source: SpendSource::parse(&source).ok_or_else(|| {
            conversion_error(
                4,
                FinzError::internal(format!("unknown spend source {source:?}")),
            )
        })?,
        external_ref: row.get(5)?,
    })
}

impl PlanStore for SqliteStore {
    fn put_baseline_if_absent(&self, baseline: &Baseline) -> Result<bool> {
        let body = serde_json::to_string(baseline)
            .map_err(|e| FinzError::internal(format!("failed to encode baseline: {e}")))?;
        let conn = self.lock()?;
        let changed = conn
            .execute(
                r#"
                INSERT INTO baselines
                    (owner_key, item_key, project_id, baseline_id, body_json, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(owner_key, item_key) DO NOTHING
                "#,
                params![
                    keys::project_key(&baseline.project_id),
                    keys::baseline_key(&baseline.baseline_id),
                    baseline.project_id,
                    baseline.baseline_id,
                    body,
                    now_stamp(),
                ],
            )
            .map_err(|e| {
                FinzError::store_with_source(
                    format!(
                        "failed to record baseline {} for project {}",
                        baseline.baseline_id, baseline.project_id
                    ),
                    e,
                )
            })?;
        Ok(changed > 0)
    }

    fn baseline(&self, project_id: &str, baseline_id: &str) -> Result<Option<Baseline>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT body_json FROM baselines WHERE owner_key = ?1 AND item_key = ?2",
            params![keys::project_key(project_id), keys::baseline_key(baseline_id)],
            baseline_from_row,
        )
        .optional()
        .map_err(|e| FinzError::store_with_source("failed to read baseline", e))
    }

    fn latest_baseline(&self, project_id: &str) -> Result<Option<Baseline>> {
        let conn = self.lock()?;
        conn.query_row(
            r#"
            SELECT body_json FROM baselines
            WHERE project_id = ?1
            ORDER BY recorded_at DESC, baseline_id DESC
            LIMIT 1
            "#,
            params![project_id],
            baseline_from_row,
        )
        .optional()
        .map_err(|e| FinzError::store_with_source("failed to read latest baseline", e))
    }

    fn put_allocations_if_absent(&self, rows: &[Allocation]) -> Result<BatchWrite> {
        self.insert_if_absent(rows, ItemKey::for_allocation, |tx, key, row| {
            tx.execute(
                r#"
                INSERT INTO allocations
                    (owner_key, item_key, project_id, baseline_id, rubro_id,
                     month_index, calendar_month, amount, source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(owner_key, item_key) DO NOTHING
                "#,
                params![
                    key.owner,
                    key.item,
                    row.project_id,
                    row.baseline_id,
                    row.rubro_id,
                    row.month_index,
                    row.calendar_month.to_string(),
                    row.amount,
                    row.source,
                ],
            )
        })
    }

    fn put_rubros_if_absent(&self, rows: &[Rubro]) -> Result<BatchWrite> {
        self.insert_if_absent(rows, ItemKey::for_rubro, |tx, key, row| {
            tx.execute(
                r#"
                INSERT INTO rubros
                    (owner_key, item_key, project_id, baseline_id, canonical_rubro_id,
                     description, category, taxonomy_found, source)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(owner_key, item_key) DO NOTHING
                "#,
                params![
                    key.owner,
                    key.item,
                    row.project_id,
                    row.baseline_id,
                    row.canonical_rubro_id,
                    row.description,
                    row.category,
                    row.taxonomy_found,
                    row.source,
                ],
            )
        })
    }

    fn existing_item_keys(&self, owner: &str, prefix: &str) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT item_key FROM allocations
                WHERE owner_key = ?1 AND substr(item_key, 1, length(?2)) = ?2
                UNION ALL
                SELECT item_key FROM rubros
                WHERE owner_key = ?1 AND substr(item_key, 1, length(?2)) = ?2
                "#,
            )
            .map_err(|e| FinzError::store_with_source("failed to prepare key scan", e))?;
        let keys = stmt
            .query_map(params![owner, prefix], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<BTreeSet<_>>>())
            .map_err(|e| FinzError::store_with_source("failed to scan item keys", e))?;
        Ok(keys)
    }

    fn allocations(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Allocation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT project_id, baseline_id, rubro_id, month_index,
                       calendar_month, amount, source
                FROM allocations
                WHERE project_id = ?1 AND baseline_id = ?2
                ORDER BY rubro_id, month_index
                "#,
            )
            .map_err(|e| FinzError::store_with_source("failed to prepare allocation read", e))?;
        stmt.query_map(params![project_id, baseline_id], allocation_from_row)
            .and_then(|rows| rows.collect())
            .map_err(|e| FinzError::store_with_source("failed to read allocations", e))
    }

    fn rubros(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Rubro>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT project_id, baseline_id, canonical_rubro_id, description,
                       category, taxonomy_found, source
                FROM rubros
                WHERE project_id = ?1 AND baseline_id = ?2
                ORDER BY canonical_rubro_id
                "#,
            )
            .map_err(|e| FinzError::store_with_source("failed to prepare rubro read", e))?;
        stmt.query_map(params![project_id, baseline_id], rubro_from_row)
            .and_then(|rows| rows.collect())
            .map_err(|e| FinzError::store_with_source("failed to read rubros", e))
    }

    fn put_forecast_override(&self, row: &ForecastOverride) -> Result<()> {
        let key = ItemKey::for_override(row);
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO forecast_overrides
                (owner_key, item_key, project_id, rubro_id, month_index,
                 amount, updated_by, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(owner_key, item_key) DO UPDATE SET
                amount = ?6,
                updated_by = ?7,
                updated_at = ?8
            "#,
            params![
                key.owner,
                key.item,
                row.project_id,
                row.rubro_id,
                row.month_index,
                row.amount,
                row.updated_by,
                row.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(|e| {
            FinzError::store_with_source(format!("failed to write forecast override {key}"), e)
        })?;
        Ok(())
    }

    fn forecast_overrides(&self, project_id: &str) -> Result<Vec<ForecastOverride>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT project_id, rubro_id, month_index, amount, updated_by, updated_at
                FROM forecast_overrides
                WHERE project_id = ?1
                ORDER BY rubro_id, month_index
                "#,
            )
            .map_err(|e| FinzError::store_with_source("failed to prepare override read", e))?;
        stmt.query_map(params![project_id], override_from_row)
            .and_then(|rows| rows.collect())
            .map_err(|e| FinzError::store_with_source("failed to read forecast overrides", e))
    }

    fn put_actual_if_absent(&self, row: &ActualSpend) -> Result<bool> {
        let key = ItemKey::for_actual(row);
        let period = serde_json::to_string(&row.period)
            .map_err(|e| FinzError::internal(format!("failed to encode period: {e}")))?;
        let conn = self.lock()?;
        let changed = conn
            .execute(
                r#"
                INSERT INTO actuals
                    (owner_key, item_key, project_id, rubro_id, period_json,
                     amount, source, external_ref)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(owner_key, item_key) DO NOTHING
                "#,
                params![
                    key.owner,
                    key.item,
                    row.project_id,
                    row.rubro_id,
                    period,
                    row.amount,
                    row.source.as_str(),
                    row.external_ref,
                ],
            )
            .map_err(|e| FinzError::store_with_source(format!("failed to write actual {key}"), e))?;
        Ok(changed > 0)
    }

    fn actuals(&self, project_id: &str) -> Result<Vec<ActualSpend>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT project_id, rubro_id, period_json, amount, source, external_ref
                FROM actuals
                WHERE project_id = ?1
                ORDER BY item_key
                "#,
            )
            .map_err(|e| FinzError::store_with_source("failed to prepare actuals read", e))?;
        stmt.query_map(params![project_id], actual_from_row)
            .and_then(|rows| rows.collect())
            .map_err(|e| FinzError::store_with_source("failed to read actuals", e))
    }
}

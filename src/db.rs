use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::model::RunResult;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id               INTEGER PRIMARY KEY,
            carrier          TEXT NOT NULL,
            started_at       TEXT NOT NULL,
            finished_at      TEXT NOT NULL,
            tasks_total      INTEGER NOT NULL,
            tasks_succeeded  INTEGER NOT NULL,
            tasks_empty      INTEGER NOT NULL,
            tasks_failed     INTEGER NOT NULL,
            tasks_cancelled  INTEGER NOT NULL,
            records          INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_runs_carrier ON runs(carrier);

        CREATE TABLE IF NOT EXISTS subsidies (
            id                 INTEGER PRIMARY KEY,
            run_id             INTEGER NOT NULL REFERENCES runs(id),
            plan_id            TEXT NOT NULL,
            plan_name          TEXT NOT NULL,
            plan_type          TEXT NOT NULL,
            subscription_type  TEXT NOT NULL,
            term               TEXT NOT NULL,
            manufacturer       TEXT NOT NULL,
            model_name         TEXT NOT NULL,
            capacity           TEXT NOT NULL,
            list_price         INTEGER NOT NULL,
            carrier_subsidy    INTEGER NOT NULL,
            additional_subsidy INTEGER NOT NULL,
            channel_subsidy    INTEGER NOT NULL,
            total_subsidy      INTEGER NOT NULL,
            purchase_price     INTEGER NOT NULL,
            effective_date     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subsidies_run ON subsidies(run_id);
        CREATE INDEX IF NOT EXISTS idx_subsidies_model ON subsidies(model_name);
        ",
    )?;
    Ok(())
}

/// Store a run and all its records atomically. Returns the run id.
pub fn save_run(conn: &Connection, result: &RunResult) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let s = &result.stats;
    tx.execute(
        "INSERT INTO runs
         (carrier, started_at, finished_at, tasks_total, tasks_succeeded, tasks_empty,
          tasks_failed, tasks_cancelled, records)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            result.carrier,
            result.started_at.to_rfc3339(),
            result.finished_at.to_rfc3339(),
            s.total,
            s.succeeded,
            s.empty,
            s.failed,
            s.cancelled,
            result.records.len(),
        ],
    )?;
    let run_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO subsidies
             (run_id, plan_id, plan_name, plan_type, subscription_type, term, manufacturer,
              model_name, capacity, list_price, carrier_subsidy, additional_subsidy,
              channel_subsidy, total_subsidy, purchase_price, effective_date)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        )?;
        for r in &result.records {
            stmt.execute(rusqlite::params![
                run_id, r.plan_id, r.plan_name, r.plan_type, r.subscription_type, r.term,
                r.manufacturer, r.model_name, r.capacity, r.list_price, r.carrier_subsidy,
                r.additional_subsidy, r.channel_subsidy, r.total_subsidy, r.purchase_price,
                r.effective_date,
            ])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

pub struct RunRow {
    pub id: i64,
    pub carrier: String,
    pub started_at: String,
    pub tasks_total: usize,
    pub tasks_succeeded: usize,
    pub tasks_empty: usize,
    pub tasks_failed: usize,
    pub tasks_cancelled: usize,
    pub records: usize,
}

/// Most recent runs first.
pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let sql = format!(
        "SELECT id, carrier, started_at, tasks_total, tasks_succeeded, tasks_empty,
                tasks_failed, tasks_cancelled, records
         FROM runs
         ORDER BY id DESC
         LIMIT {}",
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                carrier: row.get(1)?,
                started_at: row.get(2)?,
                tasks_total: row.get(3)?,
                tasks_succeeded: row.get(4)?,
                tasks_empty: row.get(5)?,
                tasks_failed: row.get(6)?,
                tasks_cancelled: row.get(7)?,
                records: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

//! File sinks: a JSON envelope and a spreadsheet-friendly CSV.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::model::{NormalizedRecord, RunResult, RunStats};

/// Excel only detects UTF-8 CSV with a byte-order mark.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Serialize)]
struct Envelope<'a> {
    crawled_at: DateTime<Local>,
    carrier: &'a str,
    total_records: usize,
    stats: &'a RunStats,
    data: &'a [NormalizedRecord],
}

/// `<carrier>_subsidy_<YYYYmmdd_HHMMSS>`, local time of the run start.
pub fn file_stem(result: &RunResult) -> String {
    format!(
        "{}_subsidy_{}",
        result.carrier,
        result.started_at.with_timezone(&Local).format("%Y%m%d_%H%M%S")
    )
}

pub fn write_json(dir: &Path, result: &RunResult) -> Result<PathBuf> {
    let path = prepare(dir, result, "json")?;
    let envelope = Envelope {
        crawled_at: result.finished_at.with_timezone(&Local),
        carrier: &result.carrier,
        total_records: result.records.len(),
        stats: &result.stats,
        data: &result.records,
    };
    let mut w = BufWriter::new(File::create(&path).with_context(|| format!("creating {}", path.display()))?);
    serde_json::to_writer_pretty(&mut w, &envelope)?;
    w.flush()?;
    Ok(path)
}

pub fn write_csv(dir: &Path, result: &RunResult) -> Result<PathBuf> {
    let path = prepare(dir, result, "csv")?;
    let mut w = BufWriter::new(File::create(&path).with_context(|| format!("creating {}", path.display()))?);
    w.write_all(UTF8_BOM)?;

    let header: Vec<String> = NormalizedRecord::COLUMNS.iter().map(|c| c.to_string()).collect();
    write_row(&mut w, &header)?;
    for record in &result.records {
        write_row(&mut w, &record.to_row())?;
    }
    w.flush()?;
    Ok(path)
}

fn prepare(dir: &Path, result: &RunResult, ext: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))?;
    Ok(dir.join(format!("{}.{}", file_stem(result), ext)))
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}

// src/store/mod.rs

pub mod parquet;

use anyhow::{Context, Result};
use duckdb::{Connection, ToSql};
use std::{fs, path::Path, time::Instant};
use tracing::info;

use crate::mapping::DictionaryEntry;
use crate::reconcile::{WideTable, FIXED_COLUMNS};

pub use self::parquet::export_parquet;

/// Open a DuckDB file, run `f`, and close the connection on every exit path.
pub fn with_connection<P, T, F>(path: P, f: F) -> Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(&mut Connection) -> Result<T>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let mut conn = Connection::open(path)
        .with_context(|| format!("opening DuckDB database {}", path.display()))?;
    let out = f(&mut conn);
    drop(conn);
    out
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Table names the outputs are written under.
#[derive(Debug, Clone)]
pub struct OutputTables<'a> {
    pub table: &'a str,
    pub dictionary: &'a str,
}

/// Replace the data dictionary and the unified table in one transaction.
/// Either both new tables are visible afterwards or neither is.
#[tracing::instrument(level = "info", skip(conn, dictionary, table), fields(records = table.len()))]
pub fn write_outputs(
    conn: &mut Connection,
    names: &OutputTables<'_>,
    dictionary: &[DictionaryEntry],
    table: &WideTable,
) -> Result<()> {
    let start = Instant::now();
    let value_columns = table.value_columns();
    let tx = conn.transaction().context("starting transaction")?;

    // 1) data dictionary
    let dict = quote_ident(names.dictionary);
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {dict};
         CREATE TABLE {dict} (
            category VARCHAR,
            column_name VARCHAR,
            description VARCHAR,
            start_year INTEGER,
            end_year INTEGER
         );"
    ))
    .context("recreating data dictionary")?;
    {
        let mut appender = tx
            .appender(names.dictionary)
            .context("opening dictionary appender")?;
        for d in dictionary {
            let category = d.category.as_str().to_string();
            appender.append_row([
                &category as &dyn ToSql,
                &d.column_name as &dyn ToSql,
                &d.description as &dyn ToSql,
                &d.start_year as &dyn ToSql,
                &d.end_year as &dyn ToSql,
            ])?;
        }
        appender.flush().context("flushing dictionary rows")?;
    }

    // 2) unified table: fixed columns then one DOUBLE per canonical name
    let tbl = quote_ident(names.table);
    let mut ddl: Vec<String> = vec![
        "inst_id VARCHAR".into(),
        "name VARCHAR".into(),
        "city VARCHAR".into(),
        "state VARCHAR".into(),
        "year INTEGER".into(),
    ];
    ddl.extend(value_columns.iter().map(|c| format!("{} DOUBLE", quote_ident(c))));
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {tbl};
         CREATE TABLE {tbl} ({});",
        ddl.join(", ")
    ))
    .context("recreating unified table")?;
    {
        let mut appender = tx.appender(names.table).context("opening table appender")?;
        for rec in &table.records {
            let cells: Vec<f64> = value_columns
                .iter()
                .map(|c| WideTable::cell(rec, c))
                .collect();
            let mut row: Vec<&dyn ToSql> = Vec::with_capacity(FIXED_COLUMNS.len() + cells.len());
            row.push(&rec.inst_id);
            row.push(&rec.name);
            row.push(&rec.city);
            row.push(&rec.state);
            row.push(&rec.year);
            row.extend(cells.iter().map(|v| v as &dyn ToSql));
            appender.append_row(row.as_slice())?;
        }
        appender.flush().context("flushing table rows")?;
    }

    // 3) lookup indexes
    tx.execute_batch(&format!(
        "CREATE INDEX {} ON {tbl}(inst_id);
         CREATE INDEX {} ON {tbl}(name);",
        quote_ident(&format!("idx_{}_inst_id", names.table)),
        quote_ident(&format!("idx_{}_name", names.table)),
    ))
    .context("creating indexes")?;

    tx.commit().context("committing outputs")?;
    info!(
        columns = FIXED_COLUMNS.len() + value_columns.len(),
        elapsed = ?start.elapsed(),
        "outputs written"
    );
    Ok(())
}

/// Row count of `table`.
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let n = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |r| r.get(0),
    )?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Category;
    use crate::reconcile::WideRecord;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn record(inst: &str, year: i32, values: &[(&str, f64)]) -> WideRecord {
        WideRecord {
            inst_id: inst.into(),
            name: format!("Institution {}", inst),
            city: "Springfield".into(),
            state: "IL".into(),
            year,
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn dictionary() -> Vec<DictionaryEntry> {
        vec![DictionaryEntry {
            category: Category::FundingSources,
            column_name: "src_federal_government".into(),
            description: "Source: Federal government - ".into(),
            start_year: 2010,
            end_year: 2015,
        }]
    }

    const NAMES: OutputTables<'static> = OutputTables {
        table: "institutions",
        dictionary: "data_dictionary",
    };

    #[test]
    fn writes_fixed_and_dynamic_columns_with_zero_fill() -> Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("out").join("herd.duckdb");
        let table = WideTable {
            records: vec![
                record("001", 2015, &[("src_federal_government", 500_000.0)]),
                record("002", 2015, &[("fed_biology_dod", 200_000.0)]),
            ],
        };

        with_connection(&db, |conn| write_outputs(conn, &NAMES, &dictionary(), &table))?;

        with_connection(&db, |conn| {
            assert_eq!(count_rows(conn, "institutions")?, 2);
            assert_eq!(count_rows(conn, "data_dictionary")?, 1);
            let (fed, src): (f64, f64) = conn.query_row(
                "SELECT fed_biology_dod, src_federal_government FROM institutions WHERE inst_id = '001'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            assert_eq!(fed, 0.0);
            assert_eq!(src, 500_000.0);
            let desc: String = conn.query_row(
                "SELECT description FROM data_dictionary WHERE column_name = 'src_federal_government'",
                [],
                |r| r.get(0),
            )?;
            assert_eq!(desc, "Source: Federal government - ");
            Ok(())
        })
    }

    #[test]
    fn rerun_replaces_previous_outputs() -> Result<()> {
        let dir = tempdir()?;
        let db = dir.path().join("herd.duckdb");
        let first = WideTable {
            records: vec![
                record("001", 2014, &[("agency_nasa", 1.0)]),
                record("002", 2014, &[("agency_nasa", 2.0)]),
            ],
        };
        let second = WideTable {
            records: vec![record("001", 2015, &[("src_federal_government", 3.0)])],
        };

        with_connection(&db, |conn| write_outputs(conn, &NAMES, &dictionary(), &first))?;
        with_connection(&db, |conn| write_outputs(conn, &NAMES, &dictionary(), &second))?;

        with_connection(&db, |conn| {
            assert_eq!(count_rows(conn, "institutions")?, 1);
            let gone = conn
                .prepare("SELECT agency_nasa FROM institutions")
                .is_err();
            assert!(gone, "stale column survived a rerun");
            Ok(())
        })
    }
}

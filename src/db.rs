use std::fmt;
use std::path::Path;

use log::debug;
use rusqlite::{Connection, OpenFlags, Row, types::Value, types::ValueRef};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn toggled(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("table '{table}' not found")]
    NotFound { table: String },
    #[error("sort column {index} out of range ({columns} columns)")]
    SortColumn { index: usize, columns: usize },
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Everything that determines the next page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub sort_column: usize,
    pub sort_dir: SortDir,
    /// Case-sensitive substring matched against every column; empty disables filtering
    pub search: String,
    pub offset: usize,
    pub page_size: usize,
}

impl QuerySpec {
    pub fn new(page_size: usize) -> Self {
        Self {
            sort_column: 0,
            sort_dir: SortDir::Asc,
            search: String::new(),
            offset: 0,
            page_size: page_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub rows: Vec<Vec<String>>,
    /// Rows matching the filter, ignoring LIMIT/OFFSET
    pub total_rows: usize,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open an existing database file. The viewer never writes, so the handle is read-only.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    #[cfg(test)]
    pub fn conn_for_tests(&self) -> &Connection {
        &self.conn
    }

    pub fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND substr(name, 1, 7) <> 'sqlite_' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn list_columns(&self, table: &str) -> Result<Vec<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", ident(table)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        // PRAGMA table_info yields nothing for a missing table rather than failing
        if columns.is_empty() {
            return Err(DbError::NotFound {
                table: table.to_string(),
            });
        }
        Ok(columns)
    }

    pub fn fetch_page(
        &self,
        table: &str,
        columns: &[String],
        spec: &QuerySpec,
    ) -> Result<Page, DbError> {
        let sort_col = columns
            .get(spec.sort_column)
            .ok_or(DbError::SortColumn {
                index: spec.sort_column,
                columns: columns.len(),
            })?;

        // The search term is the only user-supplied value; it is always bound as ?1
        let mut where_sql = String::new();
        let mut where_params: Vec<Value> = Vec::new();
        if !spec.search.is_empty() {
            let ors = columns
                .iter()
                .map(|c| format!("instr(CAST({} AS TEXT), ?1) > 0", ident(c)))
                .collect::<Vec<_>>()
                .join(" OR ");
            where_sql.push_str(" WHERE ");
            where_sql.push_str(&ors);
            where_params.push(Value::Text(spec.search.clone()));
        }

        // Reals are rendered by SQLite so the displayed text is exactly what the filter matched
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} {} LIMIT ? OFFSET ?",
            columns
                .iter()
                .map(|c| {
                    let c = ident(c);
                    format!("CASE typeof({c}) WHEN 'real' THEN CAST({c} AS TEXT) ELSE {c} END")
                })
                .collect::<Vec<_>>()
                .join(", "),
            ident(table),
            where_sql,
            ident(sort_col),
            spec.sort_dir.as_sql(),
        );
        let mut data_stmt = self.conn.prepare(&sql)?;

        let mut all_params = where_params.clone();
        all_params.push(Value::Integer(spec.page_size as i64));
        all_params.push(Value::Integer(spec.offset as i64));
        let rows = data_stmt
            .query_map(rusqlite::params_from_iter(all_params.iter()), |row| {
                row_to_strings(row, columns.len())
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Same predicate and parameters as the page query
        let count_sql = format!("SELECT COUNT(*) FROM {}{}", ident(table), where_sql);
        let total: i64 = self.conn.query_row(
            &count_sql,
            rusqlite::params_from_iter(where_params.iter()),
            |row| row.get(0),
        )?;

        debug!(
            "fetched {} rows of {} from {} (offset {}, page {}, sort {} {}, search {:?})",
            rows.len(),
            total,
            table,
            spec.offset,
            spec.page_size,
            sort_col,
            spec.sort_dir,
            spec.search
        );

        Ok(Page {
            rows,
            total_rows: total.max(0) as usize,
        })
    }
}

fn row_to_strings(row: &Row, ncols: usize) -> rusqlite::Result<Vec<String>> {
    let mut out = Vec::with_capacity(ncols);
    for i in 0..ncols {
        let v = row.get_ref(i)?;
        out.push(value_to_string(v));
    }
    Ok(out)
}

fn value_to_string(v: ValueRef<'_>) -> String {
    match v {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{f:?}"),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("0x{}", hex::encode(b)),
    }
}

// Quote identifiers with double-quotes, and escape inner quotes
fn ident(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

mod hex {
    pub fn encode(data: &[u8]) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut s = String::with_capacity(data.len() * 2);
        for &b in data {
            s.push(HEX[(b >> 4) as usize] as char);
            s.push(HEX[(b & 0xf) as usize] as char);
        }
        s
    }
}

use crate::domains::table::types::InsertOptions;
use crate::errors::{TableError, TableResult};
use crate::types::{Record, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{query, QueryBuilder, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::collections::HashSet;

/// A logical database table that can be read in full and appended to
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Identifier of this table inside an archive
    fn name(&self) -> &str;

    /// Declared column names, in table order
    async fn columns(&self) -> TableResult<Vec<String>>;

    /// Every current row
    async fn fetch(&self) -> TableResult<Vec<Record>>;

    /// Append `records`, honouring the table's own constraints
    async fn insert(&self, records: &[Record], options: &InsertOptions) -> TableResult<()>;
}

/// Column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    /// 1-based position in the primary key, 0 when not part of it
    pub primary_key: i64,
}

impl ColumnInfo {
    fn is_boolean(&self) -> bool {
        self.declared_type.contains("BOOL")
    }

    fn is_timestamp(&self) -> bool {
        self.declared_type.contains("DATETIME") || self.declared_type.contains("TIMESTAMP")
    }
}

/// Quote an SQL identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite-backed table source
#[derive(Debug, Clone)]
pub struct SqliteTable {
    pool: SqlitePool,
    table: String,
    identifier: String,
}

impl SqliteTable {
    pub fn new(pool: SqlitePool, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            pool,
            identifier: table.clone(),
            table,
        }
    }

    /// Use `identifier` instead of the table name inside archives.
    pub fn named(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub async fn column_info(&self) -> TableResult<Vec<ColumnInfo>> {
        let rows = query(&format!("PRAGMA table_info({})", quote_ident(&self.table)))
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(TableError::NotFound(self.table.clone()));
        }

        rows.iter()
            .map(|row| -> TableResult<ColumnInfo> {
                Ok(ColumnInfo {
                    name: row.try_get::<String, _>("name")?,
                    declared_type: row.try_get::<String, _>("type")?.to_ascii_uppercase(),
                    primary_key: row.try_get::<i64, _>("pk")?,
                })
            })
            .collect()
    }

    /// `ORDER BY` clause giving a stable row order. Ordinary tables use their
    /// rowid under an alias no column shadows; WITHOUT ROWID tables use their
    /// primary key; views keep the order SQLite returns.
    async fn order_clause(&self, columns: &[ColumnInfo]) -> TableResult<String> {
        let entry = query(
            "SELECT type, sql FROM sqlite_master WHERE name = ? COLLATE NOCASE \
             UNION ALL \
             SELECT type, sql FROM sqlite_temp_master WHERE name = ? COLLATE NOCASE",
        )
        .bind(self.table.as_str())
        .bind(self.table.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(entry) = entry else {
            return Ok(String::new());
        };
        if entry.try_get::<String, _>("type")? == "view" {
            return Ok(String::new());
        }

        let ddl = entry.try_get::<Option<String>, _>("sql")?.unwrap_or_default();
        let without_rowid = ddl
            .to_ascii_uppercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .contains("WITHOUT ROWID");

        if !without_rowid {
            let taken: HashSet<String> = columns.iter().map(|c| c.name.to_ascii_lowercase()).collect();
            if let Some(alias) = ["rowid", "_rowid_", "oid"].into_iter().find(|a| !taken.contains(*a)) {
                return Ok(format!(" ORDER BY {}", alias));
            }
        }

        Ok(primary_key_order(columns))
    }

    fn decode_cell(row: &SqliteRow, idx: usize, column: &ColumnInfo) -> TableResult<Value> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_string();

        if column.is_boolean() && storage == "INTEGER" {
            return Ok(Value::Boolean(row.try_get::<bool, _>(idx)?));
        }
        if column.is_timestamp() && storage == "TEXT" {
            let text: String = row.try_get(idx)?;
            return Ok(parse_timestamp(&text).map(Value::Timestamp).unwrap_or(Value::Text(text)));
        }

        let value = match storage.as_str() {
            "INTEGER" => Value::Integer(row.try_get::<i64, _>(idx)?),
            "REAL" => Value::Float(row.try_get::<f64, _>(idx)?),
            "TEXT" => Value::Text(row.try_get::<String, _>(idx)?),
            "BLOB" => Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
            other => {
                return Err(TableError::Decode {
                    column: column.name.clone(),
                    reason: format!("unsupported storage class {}", other),
                })
            }
        };
        Ok(value)
    }
}

fn primary_key_order(columns: &[ColumnInfo]) -> String {
    let mut key: Vec<&ColumnInfo> = columns.iter().filter(|c| c.primary_key > 0).collect();
    if key.is_empty() {
        return String::new();
    }
    key.sort_by_key(|c| c.primary_key);
    let key = key.iter().map(|c| quote_ident(&c.name)).collect::<Vec<_>>().join(", ");
    format!(" ORDER BY {}", key)
}

/// RFC 3339 first, then SQLite's `CURRENT_TIMESTAMP` layout (taken as UTC).
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl TableSource for SqliteTable {
    fn name(&self) -> &str {
        &self.identifier
    }

    async fn columns(&self) -> TableResult<Vec<String>> {
        Ok(self.column_info().await?.into_iter().map(|c| c.name).collect())
    }

    async fn fetch(&self) -> TableResult<Vec<Record>> {
        let columns = self.column_info().await?;
        let select_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let order = self.order_clause(&columns).await?;
        let sql = format!("SELECT {} FROM {}{}", select_list, quote_ident(&self.table), order);

        let rows = query(&sql).fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                record.insert(column.name.clone(), Self::decode_cell(row, idx, column)?);
            }
            records.push(record);
        }

        log::debug!("Fetched {} rows from {}", records.len(), self.table);
        Ok(records)
    }

    async fn insert(&self, records: &[Record], options: &InsertOptions) -> TableResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let known: HashSet<String> = self.columns().await?.into_iter().collect();
        let verb = options.insert_verb();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let mut fields = Vec::with_capacity(record.len());
            for (name, value) in record {
                if known.contains(name) {
                    fields.push((name, value));
                } else if !options.ignore_extra_fields {
                    return Err(TableError::UnknownColumn {
                        table: self.table.clone(),
                        column: name.clone(),
                    });
                }
            }

            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("{} INTO {}", verb, quote_ident(&self.table)));

            if fields.is_empty() {
                builder.push(" DEFAULT VALUES");
            } else {
                builder.push(" (");
                {
                    let mut names = builder.separated(", ");
                    for (name, _) in &fields {
                        names.push(quote_ident(name));
                    }
                }
                builder.push(") VALUES (");
                {
                    let mut values = builder.separated(", ");
                    for (_, value) in &fields {
                        match value {
                            Value::Null => values.push_bind(None::<String>),
                            Value::Boolean(b) => values.push_bind(*b),
                            Value::Integer(i) => values.push_bind(*i),
                            Value::Float(f) => values.push_bind(*f),
                            Value::Text(s) => values.push_bind(s.clone()),
                            Value::Bytes(bytes) => values.push_bind(bytes.clone()),
                            Value::Timestamp(ts) => values.push_bind(ts.to_rfc3339()),
                        };
                    }
                }
                builder.push(")");
            }

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        log::debug!("Inserted {} records into {}", records.len(), self.table);
        Ok(())
    }
}

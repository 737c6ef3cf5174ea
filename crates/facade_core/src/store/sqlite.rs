//! SQLite document store.
//!
//! # Responsibility
//! - Persist entity documents in the `documents` table as JSON bodies.
//! - Render [`QueryBuilder`] descriptions into parameterized SQL.
//!
//! # Invariants
//! - Construction rejects connections whose schema is not fully migrated.
//! - `apply` runs inside a single transaction; any error rolls back.
//! - Field names and aliases are validated before being spliced into SQL.

use super::{ChangeSet, Document, DocumentStore, StoreError, StoreResult};
use crate::db::migrations::{current_user_version, latest_version};
use crate::model::entity::{EntityId, PropertyMap, ID_FIELD};
use crate::query::{is_valid_field_name, Comparison, QueryBuilder};
use log::{debug, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Transaction};
use serde_json::Value;

const DOCUMENTS_TABLE: &str = "documents";
const REQUIRED_COLUMNS: &[&str] = &["entity", "id", "body", "created_at", "updated_at"];

/// SQLite-backed document store borrowing a migrated connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    /// Wraps a connection returned by [`crate::db::open_db`] or
    /// [`crate::db::open_db_in_memory`].
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }
}

impl DocumentStore for SqliteStore<'_> {
    fn query(&self, query: &QueryBuilder) -> StoreResult<Vec<Document>> {
        let alias = checked_alias(query)?;
        let (mut sql, mut binds) = render_select(query, &format!("{alias}.id, {alias}.body"))?;

        let mut order_terms = query
            .ordering()
            .iter()
            .map(|(field, direction)| {
                Ok(format!("{} {}", field_expr(alias, field)?, direction.as_sql()))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        order_terms.push(format!("{alias}.id ASC"));
        sql.push_str(&format!(" ORDER BY {}", order_terms.join(", ")));

        match query.max_results() {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(SqlValue::Integer(to_sql_int(limit)));
            }
            None => sql.push_str(" LIMIT -1 OFFSET ?"),
        }
        binds.push(SqlValue::Integer(to_sql_int(query.first_result())));

        debug!(
            "event=store_query module=store status=start entity={} conditions={}",
            query.collection(),
            query.conditions().len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id: EntityId = row.get(0)?;
            let body: String = row.get(1)?;
            documents.push(Document {
                id,
                body: parse_body(query.collection(), id, &body)?,
            });
        }

        Ok(documents)
    }

    fn count(&self, query: &QueryBuilder) -> StoreResult<u64> {
        let (sql, binds) = render_select(query, "COUNT(*)")?;
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        u64::try_from(count).map_err(|_| StoreError::InvalidData(format!("negative count {count}")))
    }

    fn apply(&self, changes: &ChangeSet) -> StoreResult<Vec<EntityId>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut assigned = Vec::with_capacity(changes.inserts.len());

        for insert in &changes.inserts {
            let id = match insert.id {
                Some(id) => id,
                None => next_id(&tx, insert.entity)?,
            };
            let inserted = tx.execute(
                "INSERT INTO documents (entity, id, body) VALUES (?1, ?2, ?3);",
                params![insert.entity, id, encode_body(&insert.body)?],
            );
            match inserted {
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    warn!(
                        "event=store_apply module=store status=error entity={} id={id} error_code=conflict",
                        insert.entity
                    );
                    return Err(StoreError::Conflict {
                        entity: insert.entity,
                        id,
                    });
                }
                other => {
                    other?;
                }
            }
            assigned.push(id);
        }

        for update in &changes.updates {
            let changed = tx.execute(
                "UPDATE documents
                 SET
                    body = ?3,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE entity = ?1 AND id = ?2;",
                params![update.entity, update.id, encode_body(&update.body)?],
            )?;
            if changed == 0 {
                return Err(StoreError::Missing {
                    entity: update.entity,
                    id: update.id,
                });
            }
        }

        for delete in &changes.deletes {
            tx.execute(
                "DELETE FROM documents WHERE entity = ?1 AND id = ?2;",
                params![delete.entity, delete.id],
            )?;
        }

        tx.commit()?;
        Ok(assigned)
    }
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [DOCUMENTS_TABLE],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Err(StoreError::MissingRequiredTable(DOCUMENTS_TABLE));
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let columns = stmt
        .query_map([DOCUMENTS_TABLE], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(column) = REQUIRED_COLUMNS
        .iter()
        .copied()
        .find(|column| !columns.iter().any(|name| name == column))
    {
        return Err(StoreError::MissingRequiredColumn {
            table: DOCUMENTS_TABLE,
            column,
        });
    }

    Ok(())
}

fn checked_alias(query: &QueryBuilder) -> StoreResult<&str> {
    let alias = query.alias();
    if is_valid_field_name(alias) {
        Ok(alias)
    } else {
        Err(StoreError::InvalidField(alias.to_string()))
    }
}

/// Renders `SELECT <projection> FROM documents <alias> WHERE ...` with binds.
fn render_select(query: &QueryBuilder, projection: &str) -> StoreResult<(String, Vec<SqlValue>)> {
    let alias = checked_alias(query)?;
    let mut sql = format!("SELECT {projection} FROM documents {alias} WHERE {alias}.entity = ?");
    let mut binds = vec![SqlValue::Text(query.collection().to_string())];

    for condition in query.conditions() {
        let column = field_expr(alias, &condition.field)?;
        match (condition.comparison, &condition.value) {
            (Comparison::Eq, Value::Null) => sql.push_str(&format!(" AND {column} IS NULL")),
            (Comparison::Ne, Value::Null) => sql.push_str(&format!(" AND {column} IS NOT NULL")),
            (_, Value::Null) => sql.push_str(" AND 0"),
            (Comparison::Ne, value) => {
                binds.push(to_sql_value(&condition.field, value)?);
                let guard = type_guard(alias, &condition.field, value);
                sql.push_str(&format!(
                    " AND ({column} IS NULL OR NOT {guard} OR {column} != ?)"
                ));
            }
            (comparison, value) => {
                binds.push(to_sql_value(&condition.field, value)?);
                let guard = type_guard(alias, &condition.field, value);
                sql.push_str(&format!(" AND {guard} AND {column} {} ?", comparison.as_sql()));
            }
        }
    }

    Ok((sql, binds))
}

fn field_expr(alias: &str, field: &str) -> StoreResult<String> {
    if field == ID_FIELD {
        return Ok(format!("{alias}.id"));
    }
    if !is_valid_field_name(field) {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(format!("json_extract({alias}.body, '$.{field}')"))
}

/// Predicate holding when the stored field has the JSON type of `value`.
///
/// SQLite orders values of different types instead of rejecting the
/// comparison, so a text field would otherwise satisfy `> 18`.
fn type_guard(alias: &str, field: &str, value: &Value) -> String {
    if field == ID_FIELD {
        return if value.is_number() { "1" } else { "0" }.to_string();
    }
    let types = match value {
        Value::Bool(_) => "IN ('true', 'false')",
        Value::Number(_) => "IN ('integer', 'real')",
        _ => "= 'text'",
    };
    format!("json_type({alias}.body, '$.{field}') {types}")
}

fn to_sql_value(field: &str, value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(integer), _) => Ok(SqlValue::Integer(integer)),
            (None, Some(real)) => Ok(SqlValue::Real(real)),
            (None, None) => Err(unsupported(field, value)),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => Err(unsupported(field, value)),
    }
}

fn unsupported(field: &str, value: &Value) -> StoreError {
    StoreError::UnsupportedValue {
        field: field.to_string(),
        value: value.clone(),
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn next_id(tx: &Transaction<'_>, entity: &'static str) -> StoreResult<EntityId> {
    let last: Option<EntityId> = tx
        .query_row(
            "SELECT MAX(id) FROM documents WHERE entity = ?1;",
            [entity],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    let last_id = last.unwrap_or(0);
    last_id
        .checked_add(1)
        .ok_or(StoreError::IdsExhausted { entity, last_id })
}

fn encode_body(body: &PropertyMap) -> StoreResult<String> {
    serde_json::to_string(body)
        .map_err(|err| StoreError::InvalidData(format!("cannot encode document body: {err}")))
}

fn parse_body(entity: &str, id: EntityId, text: &str) -> StoreResult<PropertyMap> {
    serde_json::from_str(text).map_err(|err| {
        StoreError::InvalidData(format!(
            "invalid body for `{entity}` document {id} in documents.body: {err}"
        ))
    })
}

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};

use crate::errors::{ToolError, ToolResult};
use crate::models::tool::ToolDefinition;
use crate::toolbox::ToolHandler;

/// Result rows are bounded so the payload stays small enough to feed back
/// into the conversation.
const MAX_RESULT_ROWS: usize = 1000;

const NO_RESULTS: &str = "The query returned no results. Try a different question.";

/// The local, read-only sales dataset. Single owner of the connection for
/// the process lifetime; handlers may run concurrently, so access goes
/// through the mutex and never holds it across an await.
pub struct SalesData {
    conn: Mutex<Connection>,
}

impl SalesData {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open sales database at {}", path.display()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Enumerate table schemas plus the distinct values of the reporting
    /// dimensions. Every enumeration is ordered, so the description is
    /// stable across calls for the same dataset.
    pub fn schema_description(&self) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let mut description = String::new();

        let mut tables_stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let tables: Vec<String> = tables_stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        for table in &tables {
            let mut columns_stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
            let columns: Vec<String> = columns_stmt
                .query_map([], |row| {
                    let name: String = row.get(1)?;
                    let kind: String = row.get(2)?;
                    Ok(format!("{name}: ({kind})"))
                })?
                .collect::<rusqlite::Result<_>>()?;
            description.push_str(&format!(
                "Table {table} Schema: Columns: {}\n",
                columns.join(", ")
            ));
        }

        if tables.iter().any(|table| table == "sales") {
            description.push_str(&format!(
                "Regions: {}\n",
                distinct_values(&conn, "region")?.join(", ")
            ));
            description.push_str(&format!(
                "Product Types: {}\n",
                distinct_values(&conn, "product_type")?.join(", ")
            ));
            description.push_str(&format!(
                "Product Categories: {}\n",
                distinct_values(&conn, "main_category")?.join(", ")
            ));
            description.push_str(&format!(
                "Reporting Years: {}\n",
                distinct_values(&conn, "year")?.join(", ")
            ));
        }

        Ok(description)
    }

    /// Execute one read-only query and serialize the result table. Failures
    /// come back as structured payloads, never as errors: the remote agent
    /// consumes them as the tool result and may self-correct.
    pub fn execute_query(&self, query: &str) -> String {
        tracing::debug!(query, "executing sales query");

        if !is_read_only(query) {
            return error_payload("Only a single read-only SELECT statement is permitted.", query);
        }

        let conn = self.conn.lock().unwrap();
        match run_query(&conn, query) {
            Ok(None) => NO_RESULTS.to_string(),
            Ok(Some(table)) => table.to_string(),
            Err(e) => error_payload(&e.to_string(), query),
        }
    }
}

fn distinct_values(conn: &Connection, column: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare(&format!("SELECT DISTINCT {column} FROM sales ORDER BY {column}"))?;
    let values = stmt
        .query_map([], |row| {
            Ok(match row.get_ref(0)? {
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                _ => String::new(),
            })
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(values)
}

/// The dataset is shared for the whole run, so destructive statements are
/// rejected up front; the connection is additionally opened read-only.
fn is_read_only(query: &str) -> bool {
    let mut statements = query.trim().trim_end_matches(';').split(';');
    let first = statements.next().unwrap_or("").trim_start();
    if statements.any(|rest| !rest.trim().is_empty()) {
        return false;
    }
    let keyword = first
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(keyword.as_str(), "select" | "with")
}

fn run_query(conn: &Connection, query: &str) -> rusqlite::Result<Option<Value>> {
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut table = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next()? {
        if table.len() == MAX_RESULT_ROWS {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(match row.get_ref(index)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => json!(i),
                ValueRef::Real(f) => json!(f),
                ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
                ValueRef::Blob(b) => json!(format!("<{} byte blob>", b.len())),
            });
        }
        table.push(Value::Array(values));
    }

    if table.is_empty() {
        return Ok(None);
    }

    let mut payload = json!({"columns": columns, "rows": table});
    if truncated {
        payload["truncated"] = json!(true);
    }
    Ok(Some(payload))
}

fn error_payload(message: &str, query: &str) -> String {
    json!({"error": message, "query": query}).to_string()
}

/// The one local capability declared to the agent: answer questions about
/// the sales dataset by running a SQLite query the model has written.
pub struct FetchSalesData {
    data: SalesData,
    definition: ToolDefinition,
}

impl FetchSalesData {
    pub const NAME: &'static str = "fetch_sales_data";

    pub fn new(data: SalesData) -> Self {
        let definition = ToolDefinition::function(
            Self::NAME,
            "This function is used to answer user questions about sales data by \
             executing SQLite queries against the database.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The input should be a well-formed SQLite query to \
                             extract information based on the user's question. The query \
                             result will be returned as a JSON object."
                    }
                },
                "required": ["query"]
            }),
        );
        Self { data, definition }
    }
}

#[async_trait]
impl ToolHandler for FetchSalesData {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, arguments: Value) -> ToolResult<String> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidParameters("missing required string parameter 'query'".into())
            })?;
        Ok(self.data.execute_query(query))
    }
}

#[cfg(test)]
pub(crate) fn seeded() -> SalesData {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE sales (
             region TEXT NOT NULL,
             product_type TEXT NOT NULL,
             main_category TEXT NOT NULL,
             year INTEGER NOT NULL,
             amount REAL NOT NULL,
             shipping_cost REAL NOT NULL
         );
         INSERT INTO sales VALUES
             ('EUROPE', 'TENT', 'CAMPING', 2023, 100.0, 10.0),
             ('EUROPE', 'BACKPACK', 'CAMPING', 2023, 50.5, 5.0),
             ('NORTH AMERICA', 'TENT', 'CAMPING', 2024, 200.0, 20.0);",
    )
    .unwrap();
    SalesData {
        conn: Mutex::new(conn),
    }
}

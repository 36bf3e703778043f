use std::fmt;

use serde::{Deserialize, Serialize};

/// Column definition returned by a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryColumn {
    /// Column name as declared in the result schema.
    pub name: String,
    /// BigQuery type name (e.g. "STRING", "INT64", "FLOAT64", "TIMESTAMP").
    pub data_type: String,
}

/// Execution metadata for a completed query job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    /// Server-side job identifier.
    pub job_id: String,
    /// Total rows produced by the job (may exceed the rows fetched).
    pub total_rows: u64,
    /// Bytes billed for scanning.
    pub bytes_processed: u64,
    /// Whether the result was served from the query cache.
    pub cache_hit: bool,
}

/// Structured result set from a query job.
///
/// Rows are JSON objects keyed by column name, in result order, with values
/// decoded to native JSON types where the schema allows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultSet {
    /// Column definitions in result-set order.
    pub columns: Vec<QueryColumn>,
    /// Row data, one object per row.
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Query execution metadata.
    pub metadata: QueryMetadata,
}

/// On-demand pricing: $6.25 per TB scanned.
const DOLLARS_PER_BYTE: f64 = 6.25 / (1024.0 * 1024.0 * 1024.0 * 1024.0);

impl QueryResultSet {
    /// Returns the number of fetched rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of columns in the result schema.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if no rows were fetched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Retrieves the value at the given row index and column name.
    ///
    /// Returns `None` if the row index is out of bounds or the column name
    /// does not exist; SQL NULL comes back as `Some(&Value::Null)`.
    pub fn get_value(&self, row: usize, col: &str) -> Option<&serde_json::Value> {
        self.rows.get(row)?.get(col)
    }

    /// Estimates the query cost in USD from bytes processed.
    pub fn cost_estimate_usd(&self) -> f64 {
        if self.metadata.cache_hit {
            return 0.0;
        }
        self.metadata.bytes_processed as f64 * DOLLARS_PER_BYTE
    }
}

fn cell_display(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "NULL".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl fmt::Display for QueryResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty result set)");
        }

        // Compute column widths (minimum = header length).
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.name.len()).collect();
        for row in &self.rows {
            for (i, col) in self.columns.iter().enumerate() {
                let cell_len = cell_display(row.get(&col.name)).len();
                if cell_len > widths[i] {
                    widths[i] = cell_len;
                }
            }
        }

        // Header row.
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:<width$}", col.name, width = widths[i])?;
        }
        writeln!(f)?;

        // Separator.
        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                write!(f, "-+-")?;
            }
            write!(f, "{}", "-".repeat(*w))?;
        }
        writeln!(f)?;

        // Data rows.
        for row in &self.rows {
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{:<width$}", cell_display(row.get(&col.name)), width = widths[i])?;
            }
            writeln!(f)?;
        }

        // Metadata summary.
        writeln!(f)?;
        write!(
            f,
            "Job {} | {} rows | {:.3} MB processed | cache_hit={} | ${:.6}",
            self.metadata.job_id,
            self.rows.len(),
            self.metadata.bytes_processed as f64 / (1024.0 * 1024.0),
            self.metadata.cache_hit,
            self.cost_estimate_usd(),
        )
    }
}

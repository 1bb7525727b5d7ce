//! Immutable, typed tabular dataset shared read-only by every pipeline stage.
//!
//! Loading supports the JSON export of the property database: an array of
//! (possibly nested) objects. Nested objects are flattened into dotted column
//! names, so `{"secondary_area": {"epc": 70}}` becomes `secondary_area.epc`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{Error, Result};

/// Columns the analysis prompts assume exist.
const EXPECTED_COLUMNS: &[&str] = &[
    "date_created.date",
    "latest_sale_price",
    "latest_sale_date",
    "secondary_latest_sale_date.lr.date",
];

/// Timestamp layout used by the property export.
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Free text.
    Text,
    /// Integer or floating point number.
    Number,
    /// Timestamp, stored in UTC.
    Date,
    /// Boolean flag.
    Bool,
}

/// Name and type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, dotted for flattened fields.
    pub name: String,
    /// Declared type.
    pub kind: ColumnKind,
}

impl ColumnSpec {
    /// Creates a column specification.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered column declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    positions: HashMap<String, usize>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate column names.
    ///
    /// # Errors
    /// Returns `DataUnavailable` if two columns share a name.
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if positions.insert(column.name.clone(), position).is_some() {
                return Err(Error::DataUnavailable(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns, positions })
    }

    /// All column declarations in order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Position of a column by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema declares no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Text value.
    Text(String),
    /// Numeric value.
    Number(f64),
    /// Timestamp value.
    Date(DateTime<Utc>),
    /// Boolean value.
    Bool(bool),
    /// Null, absent or uncoercible.
    Missing,
}

impl CellValue {
    /// Whether the cell holds no value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// JSON rendering used in prompts.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Number(number) => {
                if number.fract() == 0.0 && number.abs() < 9.0e15 {
                    Value::Number(Number::from(*number as i64))
                } else {
                    Number::from_f64(*number).map_or(Value::Null, Value::Number)
                }
            }
            Self::Date(date) => Value::String(format_date(date)),
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Missing => Value::Null,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 9.0e15 => {
                write!(f, "{}", *number as i64)
            }
            Self::Number(number) => write!(f, "{number}"),
            Self::Date(date) => f.write_str(&format_date(date)),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Missing => Ok(()),
        }
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Borrowed view of one dataset row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'data> {
    index: usize,
    dataset: &'data Dataset,
}

impl<'data> Record<'data> {
    /// Position of this record in the dataset.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Cell by column name, `None` if the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'data CellValue> {
        self.dataset.cell(self.index, column)
    }

    /// Cell rendered as text; missing cells and unknown columns are empty.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(ToString::to_string).unwrap_or_default()
    }

    /// All cells of this record in schema order.
    pub fn cells(&self) -> &'data [CellValue] {
        &self.dataset.rows[self.index]
    }
}

/// Immutable tabular collection of records with a declared schema.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Schema,
    rows: Vec<Vec<CellValue>>,
    /// Canonical path of the export this dataset was read from.
    source: Option<PathBuf>,
}

impl Dataset {
    /// Creates a dataset from a schema and rows.
    ///
    /// # Errors
    /// Returns `DataUnavailable` when there are no columns, no rows, or a row
    /// whose width does not match the schema.
    pub fn new(schema: Schema, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        if schema.is_empty() {
            return Err(Error::DataUnavailable("dataset declares no columns".to_owned()));
        }
        if rows.is_empty() {
            return Err(Error::DataUnavailable("dataset has no records".to_owned()));
        }
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != schema.len())
        {
            return Err(Error::DataUnavailable(format!(
                "record {index} has {} cells, schema declares {}",
                row.len(),
                schema.len()
            )));
        }
        Ok(Self {
            schema,
            rows,
            source: None,
        })
    }

    /// Reads a JSON records export from disk.
    ///
    /// # Errors
    /// Returns `DataUnavailable` if the file is missing, unreadable, not a
    /// JSON array of objects, or empty.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::DataUnavailable(format!(
                "the file {} does not exist",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|error| {
            Error::DataUnavailable(format!("failed to read {}: {error}", path.display()))
        })?;
        let mut dataset = Self::from_json_records(&content)?;
        dataset.source = Some(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));

        for column in dataset.missing_columns(EXPECTED_COLUMNS) {
            tracing::warn!("Expected column '{column}' is missing in the data");
        }
        tracing::info!(
            "Loaded {} records with {} columns from {}",
            dataset.len(),
            dataset.schema.len(),
            path.display()
        );

        Ok(dataset)
    }

    /// Parses a JSON array of records, flattening nested objects and
    /// inferring column kinds.
    ///
    /// # Errors
    /// Returns `DataUnavailable` if the text is not an array of objects or
    /// the array is empty.
    pub fn from_json_records(content: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(content)
            .map_err(|error| Error::DataUnavailable(format!("invalid JSON dataset: {error}")))?;
        let Value::Array(items) = parsed else {
            return Err(Error::DataUnavailable(
                "dataset must be a JSON array of records".to_owned(),
            ));
        };

        let mut names = Vec::new();
        let mut positions = HashMap::new();
        let mut flat_rows = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(object) = item else {
                return Err(Error::DataUnavailable(format!(
                    "record {index} is not a JSON object"
                )));
            };
            let mut fields = Vec::new();
            flatten_object(None, object, &mut fields);

            let row: Vec<(usize, Value)> = fields
                .into_iter()
                .map(|(name, value)| {
                    let position = *positions.entry(name.clone()).or_insert_with(|| {
                        names.push(name);
                        names.len() - 1
                    });
                    (position, value)
                })
                .collect();
            flat_rows.push(row);
        }

        let mut columns: Vec<Vec<Value>> = vec![vec![Value::Null; flat_rows.len()]; names.len()];
        for (row_index, row) in flat_rows.into_iter().enumerate() {
            for (position, value) in row {
                columns[position][row_index] = value;
            }
        }

        let mut specs = Vec::with_capacity(names.len());
        let mut typed_columns = Vec::with_capacity(names.len());
        for (name, values) in names.into_iter().zip(columns) {
            let kind = infer_kind(&name, &values);
            typed_columns.push(values.iter().map(|value| coerce(value, kind)).collect::<Vec<_>>());
            specs.push(ColumnSpec::new(name, kind));
        }

        let row_count = typed_columns.first().map_or(0, Vec::len);
        let rows = (0..row_count)
            .map(|row| typed_columns.iter().map(|column| column[row].clone()).collect())
            .collect();

        Self::new(Schema::new(specs)?, rows)
    }

    /// Absolute path of the file the dataset was loaded from; `None` for
    /// datasets built in memory.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// All records as a JSON array of flat objects keyed by column name,
    /// missing cells as `null`.
    pub fn to_json_records(&self) -> Value {
        let columns = self.schema.columns();
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    Value::Object(
                        columns
                            .iter()
                            .zip(row)
                            .map(|(spec, cell)| (spec.name.clone(), cell.to_json()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Declared schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Vec<&str> {
        self.schema.names()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no records. Always `false` for a constructed
    /// dataset.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Record at a position.
    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        (index < self.rows.len()).then_some(Record {
            index,
            dataset: self,
        })
    }

    /// Iterates over all records in order.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        (0..self.rows.len()).map(move |index| Record {
            index,
            dataset: self,
        })
    }

    /// Cell at a row and named column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let position = self.schema.position(column)?;
        self.rows.get(row)?.get(position)
    }

    /// Names from `expected` that the schema does not declare.
    pub fn missing_columns<'names>(&self, expected: &[&'names str]) -> Vec<&'names str> {
        expected
            .iter()
            .copied()
            .filter(|name| self.schema.position(name).is_none())
            .collect()
    }

    /// First `count` records in column-oriented JSON:
    /// `{"column": {"0": value, "1": value}}`.
    pub fn sample_json(&self, count: usize) -> Value {
        let take = count.min(self.rows.len());
        let mut columns = Map::new();
        for (position, spec) in self.schema.columns().iter().enumerate() {
            let mut cells = Map::new();
            for (row, cells_in_row) in self.rows.iter().take(take).enumerate() {
                cells.insert(row.to_string(), cells_in_row[position].to_json());
            }
            columns.insert(spec.name.clone(), Value::Object(cells));
        }
        Value::Object(columns)
    }
}

fn flatten_object(prefix: Option<&str>, object: Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in object {
        let name = prefix.map_or_else(|| key.clone(), |parent| format!("{parent}.{key}"));
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_object(Some(&name), nested, out),
            other => out.push((name, other)),
        }
    }
}

fn infer_kind(name: &str, values: &[Value]) -> ColumnKind {
    let present: Vec<&Value> = values.iter().filter(|value| !value.is_null()).collect();
    if present.is_empty() {
        return ColumnKind::Text;
    }
    if present.iter().all(|value| value.is_boolean()) {
        return ColumnKind::Bool;
    }
    if present.iter().all(|value| value.is_number()) {
        return ColumnKind::Number;
    }
    if name.to_lowercase().contains("date")
        && present
            .iter()
            .any(|value| value.as_str().and_then(parse_date).is_some())
    {
        return ColumnKind::Date;
    }
    ColumnKind::Text
}

fn coerce(value: &Value, kind: ColumnKind) -> CellValue {
    match (value, kind) {
        (Value::Null, _) => CellValue::Missing,
        (Value::Bool(flag), ColumnKind::Bool) => CellValue::Bool(*flag),
        (Value::Number(number), ColumnKind::Number) => {
            number.as_f64().map_or(CellValue::Missing, CellValue::Number)
        }
        (Value::String(text), ColumnKind::Date) => {
            parse_date(text).map_or(CellValue::Missing, CellValue::Date)
        }
        (_, ColumnKind::Date) => CellValue::Missing,
        (Value::String(text), _) => CellValue::Text(text.clone()),
        (other, _) => CellValue::Text(other.to_string()),
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, EXPORT_DATE_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

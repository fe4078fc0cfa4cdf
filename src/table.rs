//! In-memory result table produced by extraction
//!
//! A [`Table`] is built once per run, never mutated after extraction finishes,
//! and handed by value to the transform stage which consumes it.

/// A nullable text field; `None` is a database NULL
pub type Field = Option<String>;

/// One result row, a field per queried column
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row(Vec<Field>);

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    /// Fields as staged text. NULL and the empty string both become `""`.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|field| field.as_deref().unwrap_or(""))
    }
}

impl From<Vec<Field>> for Row {
    fn from(fields: Vec<Field>) -> Self {
        Self(fields)
    }
}

impl From<Vec<&str>> for Row {
    fn from(fields: Vec<&str>) -> Self {
        Self(fields.into_iter().map(|f| Some(f.to_string())).collect())
    }
}

/// A row whose width differs from the table's column count
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row} has {actual} field(s), expected {expected}")]
pub struct ShapeError {
    pub row: usize,
    pub expected: usize,
    pub actual: usize,
}

/// Column names plus rows, every row exactly as wide as the column list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows, rejecting the first row of the wrong width
    pub fn from_rows(
        columns: Vec<String>,
        rows: impl IntoIterator<Item = Row>,
    ) -> Result<Self, ShapeError> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, row: Row) -> Result<(), ShapeError> {
        if row.len() != self.columns.len() {
            return Err(ShapeError {
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut table = Table::new(columns(&["a", "b"]));
        table.push(Row::from(vec!["1", "2"])).unwrap();

        let err = table.push(Row::from(vec!["3"])).unwrap_err();
        assert_eq!(
            err,
            ShapeError {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(table.len(), 1);
        assert_eq!(err.to_string(), "row 1 has 1 field(s), expected 2");

        let report = eyre::Report::new(err);
        assert!(report.to_string().contains("expected 2"));
    }

    #[test]
    fn test_from_rows_preserves_order() {
        let table = Table::from_rows(
            columns(&["n"]),
            vec![Row::from(vec!["1"]), Row::from(vec!["2"]), Row::from(vec!["3"])],
        )
        .unwrap();

        let firsts: Vec<&str> = table
            .rows()
            .iter()
            .map(|r| r.texts().next().unwrap())
            .collect();
        assert_eq!(firsts, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_null_and_empty_collapse_to_empty_text() {
        let row = Row::new(vec![None, Some(String::new()), Some("x".to_string())]);
        assert_eq!(row.texts().collect::<Vec<_>>(), vec!["", "", "x"]);
        // The row itself still knows which field was NULL
        assert_eq!(row.fields()[0], None);
    }

    #[test]
    fn test_zero_column_table_accepts_empty_rows() {
        let mut table = Table::new(Vec::new());
        table.push(Row::default()).unwrap();
        assert_eq!(table.width(), 0);
        assert_eq!(table.len(), 1);
    }
}

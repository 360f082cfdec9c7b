//! External payload capabilities
//!
//! Plotting libraries and dataframe libraries are not part of the core. They
//! are reached through two narrow traits that turn a host object into portable
//! bytes, consumed only by the [`AssetStore`](crate::AssetStore) at intern
//! time.

use crate::error::AssetError;
use serde::Serialize;

/// Mime type of the canonical table payload produced by [`Dataset`]
pub const TABLE_MIME: &str = "application/vnd.folio.table+json";

/// Default mime type for portable figure specs
pub const FIGURE_MIME: &str = "application/vnd.folio.figure+json";

/// Boxed error returned by capability adapters
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

/// A figure from some plotting library, exportable to a portable spec
pub trait PortableFigure {
    /// Library name (`"vega-lite"`, `"plotly"`, ...), used in diagnostics
    fn library(&self) -> &str;

    /// Mime type of the exported spec
    fn mime_type(&self) -> &str {
        FIGURE_MIME
    }

    /// Export the figure
    ///
    /// # Errors
    /// Adapter-specific export failure
    fn to_portable_spec(&self) -> Result<Vec<u8>, CapabilityError>;
}

/// A tabular dataset, exportable to a portable table payload
pub trait TabularSource {
    fn column_count(&self) -> usize;

    fn row_count(&self) -> usize;

    fn mime_type(&self) -> &str {
        TABLE_MIME
    }

    /// Export the table
    ///
    /// # Errors
    /// Adapter-specific export failure
    fn to_portable_table(&self) -> Result<Vec<u8>, CapabilityError>;
}

/// Minimal in-memory table
///
/// Cells are JSON scalars. Exports as `{"columns":[..],"rows":[[..],..]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

impl Dataset {
    /// Create an empty table with the given column names
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row
    ///
    /// # Errors
    /// `AssetError::InvalidTable` if the row width differs from the column
    /// count or a cell is not a scalar
    pub fn push_row(&mut self, row: Vec<serde_json::Value>) -> Result<(), AssetError> {
        if row.len() != self.columns.len() {
            return Err(AssetError::InvalidTable(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        if row.iter().any(|cell| cell.is_array() || cell.is_object()) {
            return Err(AssetError::InvalidTable(
                "cells must be scalar values".to_string(),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder-style [`push_row`](Self::push_row)
    ///
    /// # Errors
    /// See [`push_row`](Self::push_row)
    pub fn with_row(mut self, row: Vec<serde_json::Value>) -> Result<Self, AssetError> {
        self.push_row(row)?;
        Ok(self)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<serde_json::Value>] {
        &self.rows
    }
}

impl TabularSource for Dataset {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn to_portable_table(&self) -> Result<Vec<u8>, CapabilityError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssetStore;
    use serde_json::json;

    struct BrokenFigure;

    impl PortableFigure for BrokenFigure {
        fn library(&self) -> &str {
            "broken"
        }

        fn to_portable_spec(&self) -> Result<Vec<u8>, CapabilityError> {
            Err("renderer crashed".into())
        }
    }

    #[test]
    fn dataset_rejects_ragged_rows() {
        let mut data = Dataset::new(["a", "b"]);
        assert!(data.push_row(vec![json!(1)]).is_err());
        assert!(data.push_row(vec![json!(1), json!([2])]).is_err());
        assert!(data.push_row(vec![json!(1), json!("two")]).is_ok());
        assert_eq!(data.row_count(), 1);
    }

    #[test]
    fn dataset_export_is_stable() {
        let data = Dataset::new(["x"]).with_row(vec![json!(1.5)]).unwrap();
        let bytes = data.to_portable_table().unwrap();
        assert_eq!(bytes, br#"{"columns":["x"],"rows":[[1.5]]}"#.to_vec());
    }

    #[test]
    fn figure_failure_is_unreadable() {
        let store = AssetStore::new();
        let err = store.intern_figure(&BrokenFigure).unwrap_err();
        assert!(matches!(err, AssetError::Unreadable { ref origin, .. } if origin == "figure:broken"));
    }

    #[test]
    fn empty_table_rejected() {
        let store = AssetStore::new();
        let err = store.intern_table(&Dataset::default()).unwrap_err();
        assert!(matches!(err, AssetError::InvalidTable(_)));
    }
}

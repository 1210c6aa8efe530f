//! Rectangular tables of named columns.
use crate::{
    error::{IoResultExt, PipelineError},
    schema::{ColumnKind, Schema, TargetValueMapping},
    util::ensure_parent,
};
use anyhow::{Context, Result};
use ndarray::Array2;
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use std::{fs::File, path::Path};

/// Tokens read as a missing value.
const MISSING_TOKENS: [&str; 5] = ["", "na", "NA", "nan", "NaN"];

/// Values of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Floating point values.
    Numeric(Vec<Option<f64>>),
    /// Labels.
    Categorical(Vec<Option<String>>),
}

impl Column {
    /// The number of values, including missing ones.
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(vs) => vs.len(),
            Self::Categorical(vs) => vs.len(),
        }
    }

    /// `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The kind of the column.
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Numeric(_) => ColumnKind::Numeric,
            Self::Categorical(_) => ColumnKind::Categorical,
        }
    }

    fn take(&self, ixs: &[usize]) -> Self {
        match self {
            Self::Numeric(vs) => Self::Numeric(ixs.iter().map(|&i| vs[i]).collect()),
            Self::Categorical(vs) => {
                Self::Categorical(ixs.iter().map(|&i| vs[i].clone()).collect())
            }
        }
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Self::Numeric(vs) => vs[row].map(|v| v.to_string()).unwrap_or_default(),
            Self::Categorical(vs) => vs[row].clone().unwrap_or_default(),
        }
    }
}

/// A table of named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

fn is_missing(field: &str) -> bool {
    MISSING_TOKENS.contains(&field.trim())
}

impl Dataset {
    /// Builds a dataset from named columns.
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self, PipelineError> {
        let mut dataset = Self::default();
        for (name, column) in columns.into_iter() {
            dataset.push_column(name, column)?;
        }
        Ok(dataset)
    }

    /// Reads a CSV file with a header row.
    ///
    /// Columns declared in the schema are parsed according to their kind; other
    /// columns are read as categorical.
    pub fn read_csv(path: impl AsRef<Path>, schema: &Schema) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).at_path(path)?;
        let mut rdr = csv::Reader::from_reader(file);
        let names: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Failed to read the header of {:?}", path))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut columns: Vec<Column> = names
            .iter()
            .map(|name| match schema.kind_of(name) {
                Some(ColumnKind::Numeric) => Column::Numeric(vec![]),
                _ => Column::Categorical(vec![]),
            })
            .collect();

        for (row, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("Failed to read {:?}", path))?;
            for ((field, column), name) in record.iter().zip(columns.iter_mut()).zip(names.iter())
            {
                match column {
                    Column::Numeric(vs) => {
                        let v = if is_missing(field) {
                            None
                        } else {
                            Some(field.trim().parse::<f64>().map_err(|_| {
                                PipelineError::Validation(format!(
                                    "{:?} in column {:?}, row {} of {:?} is not a number",
                                    field, name, row, path
                                ))
                            })?)
                        };
                        vs.push(v);
                    }
                    Column::Categorical(vs) => {
                        vs.push((!is_missing(field)).then(|| field.trim().to_string()));
                    }
                }
            }
        }

        Self::from_columns(names.into_iter().zip(columns).collect())
            .with_context(|| format!("Ragged rows in {:?}", path))
    }

    /// Writes the dataset as CSV, creating the parent directory.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let file = File::create(path).at_path(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(&self.names)?;
        for row in 0..self.n_rows {
            wtr.write_record(self.columns.iter().map(|c| c.cell(row)))?;
        }
        wtr.flush().at_path(path)?;
        Ok(())
    }

    /// The number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// The number of columns.
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// Column names, in order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// `true` if the dataset has a column with the given name.
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// The column with the given name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Appends a column; its length must match the existing rows.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(PipelineError::Validation(format!("duplicated column {:?}", name)));
        }
        if !self.names.is_empty() && column.len() != self.n_rows {
            return Err(PipelineError::Validation(format!(
                "column {:?} has {} rows, expected {}",
                name,
                column.len(),
                self.n_rows
            )));
        }
        self.n_rows = column.len();
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Returns a copy without the given columns; absent names are ignored.
    pub fn without_columns(&self, names: &[String]) -> Self {
        let (names, columns) = self
            .names
            .iter()
            .zip(self.columns.iter())
            .filter(|(n, _)| !names.contains(n))
            .map(|(n, c)| (n.clone(), c.clone()))
            .unzip();
        Self {
            names,
            columns,
            n_rows: self.n_rows,
        }
    }

    /// Returns a copy with only the given columns, in dataset order; absent names are
    /// ignored.
    pub fn select_columns(&self, names: &[String]) -> Self {
        let dropped: Vec<String> = self
            .names
            .iter()
            .filter(|n| !names.contains(n))
            .cloned()
            .collect();
        self.without_columns(&dropped)
    }

    /// Returns the rows at the given indices, in that order.
    pub fn take_rows(&self, ixs: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(ixs)).collect(),
            n_rows: ixs.len(),
        }
    }

    /// Shuffles the rows with a seeded generator and splits them into
    /// `(train, test)`, where `test` holds `round(n_rows * test_ratio)` rows.
    pub fn train_test_split(&self, test_ratio: f64, seed: u64) -> (Self, Self) {
        let mut ixs: Vec<usize> = (0..self.n_rows).collect();
        ixs.shuffle(&mut SmallRng::seed_from_u64(seed));
        let n_test = ((self.n_rows as f64) * test_ratio).round() as usize;
        let n_test = n_test.min(self.n_rows);
        let (test, train) = ixs.split_at(n_test);
        (self.take_rows(train), self.take_rows(test))
    }

    /// Builds a `rows x columns` matrix from numeric columns; missing values become NaN.
    pub fn feature_matrix(&self, columns: &[String]) -> Result<Array2<f64>, PipelineError> {
        let mut cols = Vec::with_capacity(columns.len());
        for name in columns.iter() {
            match self.column(name) {
                Some(Column::Numeric(vs)) => cols.push(vs),
                Some(Column::Categorical(_)) => {
                    return Err(PipelineError::Validation(format!(
                        "feature column {:?} is not numeric",
                        name
                    )))
                }
                None => {
                    return Err(PipelineError::Validation(format!(
                        "feature column {:?} is missing",
                        name
                    )))
                }
            }
        }

        Ok(Array2::from_shape_fn((self.n_rows, cols.len()), |(row, col)| {
            cols[col][row].unwrap_or(f64::NAN)
        }))
    }

    /// Encodes the target column into class indices.
    pub fn labels(
        &self,
        target: &str,
        mapping: &TargetValueMapping,
    ) -> Result<Vec<usize>, PipelineError> {
        let values = match self.column(target) {
            Some(Column::Categorical(vs)) => vs.to_vec(),
            Some(Column::Numeric(vs)) => vs.iter().map(|v| v.map(|v| v.to_string())).collect(),
            None => {
                return Err(PipelineError::Validation(format!(
                    "target column {:?} is missing",
                    target
                )))
            }
        };
        values
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.as_deref().and_then(|label| mapping.encode(label)).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "unknown target value {:?} at row {}",
                        v, row
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::SCHEMA;
    use tempdir::TempDir;

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            (
                "class".to_string(),
                Column::Categorical(vec![
                    Some("neg".into()),
                    Some("pos".into()),
                    Some("neg".into()),
                    Some("pos".into()),
                ]),
            ),
            (
                "aa_000".to_string(),
                Column::Numeric(vec![Some(1.0), None, Some(3.0), Some(4.5)]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn csv_keeps_missing_values() -> Result<()> {
        let schema = Schema::from_yaml_str(SCHEMA)?;
        let dir = TempDir::new("dataset")?;
        let path = dir.path().join("data.csv");
        dataset().write_csv(&path)?;

        let loaded = Dataset::read_csv(&path, &schema)?;
        assert_eq!(loaded, dataset());
        Ok(())
    }

    #[test]
    fn non_numeric_value_is_a_validation_error() -> Result<()> {
        let schema = Schema::from_yaml_str(SCHEMA)?;
        let dir = TempDir::new("dataset")?;
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "class,aa_000\nneg,1.0\npos,abc\n")?;

        let err = Dataset::read_csv(&path, &schema).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn split_partitions_rows() {
        let ds = dataset();
        let (train, test) = ds.train_test_split(0.25, 42);
        assert_eq!(train.n_rows(), 3);
        assert_eq!(test.n_rows(), 1);
        assert_eq!(ds.train_test_split(0.25, 42), (train, test));
    }

    #[test]
    fn feature_matrix_marks_missing_as_nan() {
        let m = dataset().feature_matrix(&["aa_000".to_string()]).unwrap();
        assert_eq!(m.dim(), (4, 1));
        assert!(m[[1, 0]].is_nan());
        assert_eq!(m[[3, 0]], 4.5);
    }

    #[test]
    fn labels_reject_unknown_values() {
        let mapping = TargetValueMapping::default();
        assert_eq!(
            dataset().labels("class", &mapping).unwrap(),
            vec![0, 1, 0, 1]
        );
        let mut ds = dataset().without_columns(&["class".to_string()]);
        ds.push_column(
            "class",
            Column::Categorical(vec![Some("neg".into()), Some("maybe".into()), None, None]),
        )
        .unwrap();
        assert!(ds.labels("class", &mapping).is_err());
    }
}

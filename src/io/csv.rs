//! CSV reading and writing operations.

use std::{fs::{File, OpenOptions}, path::Path};

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::common::{PendingWrite, ensure_parent_exists};

/// Reads a CSV file from `path` into a Polars DataFrame, inferring column types.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))
}

/// Reads a CSV file keeping every column as a string.
pub(crate) fn read_csv_strings(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))
}

/// Reads the first column of a headerless CSV file as strings.
pub(crate) fn read_first_column(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))?;
    let Some(first) = df.get_columns().first() else { return Ok(Vec::new()) };
    Ok(first.str()?.into_iter().flatten().map(str::to_owned).collect())
}

/// Write a DataFrame to a CSV file, creating its directory.
pub(crate) fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut sink = PendingWrite::open(path, true)
        .with_context(|| format!("[io::csv::write] Failed to create CSV file: {}", path.display()))?;
    CsvWriter::new(&mut sink)
        .finish(df)
        .with_context(|| format!("[io::csv::write] Failed to write CSV to {:?}", path))?;
    sink.finalize()
}

/// Append rows to a CSV file, writing the header only when the file is new.
pub(crate) fn append_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent_exists(path)?;
    let exists = path.is_file() && std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new().create(true).append(true).open(path)
        .with_context(|| format!("[io::csv::write] Failed to open CSV file for append: {}", path.display()))?;
    CsvWriter::new(file)
        .include_header(!exists)
        .finish(df)
        .with_context(|| format!("[io::csv::write] Failed to append CSV to {:?}", path))
}

/// Values of an integer column, nulls skipped.
pub(crate) fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let column = df.column(name)
        .with_context(|| format!("[io::csv] Missing column {name:?}"))?
        .cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().flatten().collect())
}

/// Values of a float column, keeping nulls.
pub(crate) fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)
        .with_context(|| format!("[io::csv] Missing column {name:?}"))?
        .cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Values of a string column, nulls as empty strings.
pub(crate) fn str_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df.column(name)
        .with_context(|| format!("[io::csv] Missing column {name:?}"))?
        .cast(&DataType::String)?;
    Ok(column.str()?.into_iter().map(|v| v.unwrap_or_default().to_owned()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/rows.csv");
        for chunk in [vec![1i64, 2], vec![3]] {
            let mut df = DataFrame::new(vec![Column::new("uc_id".into(), chunk)]).unwrap();
            append_csv(&mut df, &path).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), ["uc_id", "1", "2", "3"]);
        assert_eq!(i64_values(&read_csv(&path).unwrap(), "uc_id").unwrap(), [1, 2, 3]);
    }

    #[test]
    fn string_columns_keep_leading_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.csv");
        std::fs::write(&path, "name,alpha3\nfrance,FRA\nzeros,007\n").unwrap();
        let df = read_csv_strings(&path).unwrap();
        assert_eq!(str_values(&df, "alpha3").unwrap(), ["FRA", "007"]);
    }

    #[test]
    fn first_column_of_headerless_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://a/x_dem.tif\nhttps://a/x_num.tif\n").unwrap();
        assert_eq!(read_first_column(&path).unwrap(), ["https://a/x_dem.tif", "https://a/x_num.tif"]);
    }
}

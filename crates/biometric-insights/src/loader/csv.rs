//! CSV reading with fallback strategies.

use crate::error::Result;
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Rows used to infer column types.
const INFER_SCHEMA_ROWS: usize = 1000;

/// Load a CSV file, retrying with looser settings when parsing fails.
///
/// 1. Standard parsing with double-quote handling
/// 2. Parsing without quote handling
/// 3. Parsing pre-cleaned content (collapsed quotes, blank lines removed)
pub fn read_csv_with_fallbacks(path: &Path) -> Result<DataFrame> {
    // Strategy 1: Standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Standard CSV loading failed: {}", e),
    }

    // Strategy 2: Without quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(None))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Loading without quotes failed: {}", e),
    }

    // Strategy 3: Pre-clean content
    match fs::read_to_string(path) {
        Ok(content) => {
            let cleaned = clean_csv_content(&content);
            let df = CsvReadOptions::default()
                .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
                .with_has_header(true)
                .into_reader_with_file_handle(Cursor::new(cleaned))
                .finish()?;
            info!("Loaded {} after cleaning its content", path.display());
            Ok(df)
        }
        Err(e) => {
            error!("Could not read file {}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

/// Collapse doubled quotes and drop blank lines.
fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Write a frame as CSV with a header row, creating parent directories.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_quote_char(b'"')
        .finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_csv_content() {
        let raw = "a,b\n\n\"\"x\"\",1\n   \n";
        assert_eq!(clean_csv_content(raw), "a,b\n\"x\",1");
    }

    #[test]
    fn test_read_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.csv");
        let df = df! {
            "Age" => &[3i64, 40],
            "State" => &["Goa", "Delhi"],
        }
        .unwrap();
        write_csv(&df, &path).unwrap();
        let loaded = read_csv_with_fallbacks(&path).unwrap();
        assert_eq!(loaded.shape(), (2, 2));
    }
}

//! Table and snapshot files.
//!
//! Tab-separated tables for authors and counts, a comma-separated journal
//! list, and JSON-lines snapshots of articles. Multi-valued columns are
//! joined with `|`.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Separator for multi-valued columns
pub const MULTI_SEPARATOR: char = '|';

/// Join a set into one column value
pub fn join_multi(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(&MULTI_SEPARATOR.to_string())
}

/// Split a column value back into a set, dropping empty parts
pub fn split_multi(value: &str) -> BTreeSet<String> {
    value
        .split(MULTI_SEPARATOR)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn write_delimited<T: Serialize>(path: &Path, rows: &[T], delimiter: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)?;

    for row in rows {
        wtr.serialize(row)?;
    }

    wtr.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote table");
    Ok(())
}

/// Write rows as a tab-separated table with a header line
pub fn write_tsv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    write_delimited(path, rows, b'\t')
}

/// Write rows as a comma-separated table with a header line
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    write_delimited(path, rows, b',')
}

/// Write a tab-separated table whose columns are only known at run time
pub fn write_table(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = rows.len(), columns = header.len(), "Wrote table");
    Ok(())
}

fn read_delimited<T: DeserializeOwned>(path: &Path, delimiter: u8) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Read a tab-separated table written by [`write_tsv`]
pub fn read_tsv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    read_delimited(path, b'\t')
}

/// Read a comma-separated table written by [`write_csv`]
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    read_delimited(path, b',')
}

/// Write one JSON document per line
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    debug!(path = %path.display(), items = items.len(), "Wrote JSON lines");
    Ok(())
}

/// Read a JSON-lines file. Blank lines are ignored; unparseable lines are
/// skipped with a warning.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(item) => items.push(item),
            Err(e) => warn!(path = %path.display(), line = number + 1, error = %e, "Skipping bad JSON line"),
        }
    }
    Ok(items)
}

/// Read every `*.jsonl` file in a directory, in file name order
pub fn read_jsonl_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();

    let mut items = Vec::new();
    for file in files {
        items.extend(read_jsonl(&file)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        count: usize,
        note: Option<String>,
    }

    #[test]
    fn test_multi_columns() {
        let set: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_multi(&set), "a|b");
        assert_eq!(split_multi("a| b||"), set);
        assert!(split_multi("").is_empty());
    }

    #[test]
    fn test_tsv_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.tsv");
        let rows = vec![
            Row { name: "Carabus auratus".into(), count: 3, note: None },
            Row { name: "Pieris, rapae".into(), count: 1, note: Some("x".into()) },
        ];

        write_tsv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("name\tcount\tnote\n"));

        let back: Vec<Row> = read_tsv(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.csv");
        let rows = vec![Row { name: "Zootaxa, Auckland".into(), count: 7, note: None }];

        write_csv(&path, &rows).unwrap();
        let back: Vec<Row> = read_csv(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_write_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.tsv");
        let header = vec!["order".to_string(), "redlist".to_string()];
        let rows = vec![vec!["Coleoptera".to_string(), "2".to_string()]];

        write_table(&path, &header, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "order\tredlist\nColeoptera\t2\n");
    }

    #[test]
    fn test_jsonl_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsonl");
        std::fs::write(
            &path,
            "{\"name\":\"a\",\"count\":1,\"note\":null}\n\nnot json\n{\"name\":\"b\",\"count\":2,\"note\":null}\n",
        )
        .unwrap();

        let rows: Vec<Row> = read_jsonl(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "b");
    }

    #[test]
    fn test_jsonl_dir() {
        let dir = TempDir::new().unwrap();
        write_jsonl(&dir.path().join("2.jsonl"), &[Row { name: "second".into(), count: 2, note: None }]).unwrap();
        write_jsonl(&dir.path().join("1.jsonl"), &[Row { name: "first".into(), count: 1, note: None }]).unwrap();
        std::fs::write(dir.path().join("ignore.txt"), "x").unwrap();

        let rows: Vec<Row> = read_jsonl_dir(dir.path()).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}

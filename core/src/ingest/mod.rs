//! CSV input and output for the command line runner.
//!
//! Reads raw bytes with encoding and delimiter auto-detection into
//! [`Record`]s (all values as strings, header order preserved) and writes
//! records back out as CSV.

use serde_json::Value;
use std::io::Write;
use std::path::Path;

pub use crate::error::CsvError;
use crate::models::{display_value, Record};

/// Records read from a CSV source, with what was detected along the way.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub records: Vec<Record>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    pub headers: Vec<String>,
}

// =============================================================================
// Detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with the given encoding; unknown encodings fall back to
/// lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// The separator occurring most often in the first line; `,` when none do.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = (',', 0);
    for sep in [',', ';', '\t', '|'] {
        let count = first_line.matches(sep).count();
        if count > best.1 {
            best = (sep, count);
        }
    }
    best.0
}

fn delimiter_byte(delimiter: char) -> Result<u8, CsvError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(CsvError::Delimiter(delimiter))
}

// =============================================================================
// Reading
// =============================================================================

/// Parse CSV text with a header row. Short rows are padded with empty
/// strings, extra fields are ignored and blank lines are skipped.
pub fn read_records(content: &str, delimiter: char) -> Result<(Vec<String>, Vec<Record>), CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::malformed(&e))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(CsvError::Empty);
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| CsvError::malformed(&e))?;
        if row.iter().all(str::is_empty) {
            continue;
        }
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, header)| (header.clone(), Value::String(row.get(i).unwrap_or("").to_string())))
            .collect();
        records.push(record);
    }

    Ok((headers, records))
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn read_bytes_auto(bytes: &[u8]) -> Result<IngestResult, CsvError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let (headers, records) = read_records(&content, delimiter)?;

    tracing::debug!(%encoding, ?delimiter, rows = records.len(), "read csv");

    Ok(IngestResult {
        records,
        encoding,
        delimiter,
        headers,
    })
}

/// Read a CSV file with auto-detection of encoding and delimiter.
pub fn read_file_auto<P: AsRef<Path>>(path: P) -> Result<IngestResult, CsvError> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).map_err(|e| CsvError::io(format!("Cannot read file '{}'", path.display()), &e))?;
    read_bytes_auto(&bytes)
}

// =============================================================================
// Writing
// =============================================================================

/// Every column name across `records`, in first-seen order.
pub fn union_columns(records: &[Record]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        for column in record.columns() {
            if seen.insert(column) {
                columns.push(column.to_string());
            }
        }
    }
    columns
}

/// Write records as CSV with a header row covering every column. Missing
/// values are written empty.
pub fn write_records<W: Write>(writer: W, records: &[Record], delimiter: char) -> Result<(), CsvError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(writer);

    let columns = union_columns(records);
    csv_writer
        .write_record(&columns)
        .map_err(|e| CsvError::Write {
            record: 0,
            message: e.to_string(),
        })?;

    for (i, record) in records.iter().enumerate() {
        let row = columns
            .iter()
            .map(|c| record.get(c).map(display_value).unwrap_or_default());
        csv_writer
            .write_record(row)
            .map_err(|e| CsvError::Write {
                record: i + 1,
                message: e.to_string(),
            })?;
    }

    csv_writer.flush().map_err(|e| CsvError::io("Cannot write output", &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_csv() {
        let (headers, rows) = read_records("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(headers, vec!["name", "age"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&json!("Alice")));
        assert_eq!(rows[1].get("age"), Some(&json!("25")));
    }

    #[test]
    fn test_quoted_values() {
        let csv = "name,value\n\"Lee, Ann\",\"Hello World\"";
        let (_, rows) = read_records(csv, ',').unwrap();

        assert_eq!(rows[0].get("name"), Some(&json!("Lee, Ann")));
        assert_eq!(rows[0].get("value"), Some(&json!("Hello World")));
    }

    #[test]
    fn test_empty_lines_skipped() {
        let (_, rows) = read_records("a;b\n1;2\n\n3;4\n", ';').unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_missing_and_extra_values() {
        let (_, rows) = read_records("a;b;c\n1;;3\n4\n5;6;7;8", ';').unwrap();

        assert_eq!(rows[0].get("b"), Some(&json!("")));
        assert_eq!(rows[1].get("c"), Some(&json!("")));
        assert_eq!(rows[2].len(), 3);
    }

    #[test]
    fn test_error_message_format() {
        let err = CsvError::Malformed {
            line: 5,
            message: "found record with 2 fields".into(),
        };
        assert_eq!(err.to_string(), "Line 5: found record with 2 fields");

        let err = CsvError::Write {
            record: 3,
            message: "oops".into(),
        };
        assert_eq!(err.to_string(), "Cannot write record 3: oops");
    }

    #[test]
    fn test_empty_csv_error() {
        assert_eq!(read_records("", ';').unwrap_err(), CsvError::Empty);
        assert_eq!(read_records("a", 'é').unwrap_err(), CsvError::Delimiter('é'));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let result = read_bytes_auto(b"name;age\nAlice;30\nBob;25").unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        assert_eq!(decode_content(bytes, "iso-8859-1"), "Société");
    }

    #[test]
    fn test_write_records_unions_columns() {
        let records = vec![
            Record::from_pairs([("a", json!("1")), ("b", json!("x,y"))]),
            Record::from_pairs([("a", json!(2)), ("c", json!(null))]),
        ];
        let mut out = Vec::new();
        write_records(&mut out, &records, ',').unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "a,b,c\n1,\"x,y\",\n2,,\n");
    }

    #[test]
    fn test_read_file_auto() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "id,name\n1,Ann\n").unwrap();

        let result = read_file_auto(&path).unwrap();
        assert_eq!(result.records[0].get("name"), Some(&json!("Ann")));
        assert!(read_file_auto(dir.path().join("missing.csv")).is_err());
    }
}

use std::path::Path;

use tracing::{debug, error};

use common::{Error, Result, TickTable};

/// Load a Binance / CryptoDataDownload style history file.
///
/// The first column must be the open time. Columns whose first-row value is
/// not a number (dates, symbols) are dropped for the whole table. Files are
/// usually newest-first; `TickTable` puts them in time order.
pub fn load(path: impl AsRef<Path>) -> Result<TickTable> {
    let path = path.as_ref();
    let name = format!("binance_csv:{}", path.display());

    let body = std::fs::read_to_string(path).map_err(|e| {
        error!(source = %name, error = %e, "Failed to read history file");
        Error::data_unavailable(&name, e)
    })?;

    parse(&name, &body).inspect_err(|e| error!(source = %name, error = %e, "Bad history file"))
}

/// Parse CSV text into a tick table named `name`.
pub fn parse(name: &str, body: &str) -> Result<TickTable> {
    let body = skip_banner(body);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::data_unavailable(name, e))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(Error::data_unavailable(name, "missing header row"));
    }

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| Error::data_unavailable(name, format!("row {}: {e}", idx + 1)))?;
        records.push(record);
    }

    // No rows: nothing to sniff, keep every column.
    let keep: Vec<usize> = match records.first() {
        None => (0..headers.len()).collect(),
        Some(first) => first
            .iter()
            .enumerate()
            .filter(|(_, v)| parse_number(v).is_some())
            .map(|(i, _)| i)
            .collect(),
    };
    if !records.is_empty() && keep.first() != Some(&0) {
        return Err(Error::data_unavailable(
            name,
            format!("first column '{}' is not a numeric open time", headers[0]),
        ));
    }
    debug!(
        source = name,
        dropped = headers.len() - keep.len(),
        "Selected numeric columns"
    );

    let columns = keep.iter().map(|&i| headers[i].clone()).collect();
    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let row = keep
            .iter()
            .map(|&i| {
                let raw = record.get(i).unwrap_or_default();
                parse_number(raw).ok_or_else(|| {
                    Error::data_unavailable(
                        name,
                        format!("row {}: '{}' is not a number: '{raw}'", idx + 1, headers[i]),
                    )
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    TickTable::new(name, columns, rows)
}

/// CryptoDataDownload files start with a URL line before the header.
fn skip_banner(body: &str) -> &str {
    match body.split_once('\n') {
        Some((first, rest)) if !first.contains(',') => rest,
        _ => body,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TickSource;
    use std::io::Write;

    const CDD: &str = "https://www.CryptoDataDownload.com\n\
unix,date,symbol,open,high,low,close,Volume BTC,Volume USDT,tradecount\n\
1609462800000,2021-01-01 01:00:00,BTC/USDT,29331.70,29688.00,29238.30,29351.95,2211.86,65227221.57,54536\n\
1609459200000,2021-01-01 00:00:00,BTC/USDT,28923.63,29470.00,28690.17,29331.69,2311.81,67369586.73,58389\n";

    #[test]
    fn newest_first_file_is_reversed_and_text_columns_dropped() {
        let mut table = parse("t", CDD).unwrap();
        assert!(table.was_reversed());
        assert_eq!(
            table.columns(),
            &["unix", "open", "high", "low", "close", "Volume BTC", "Volume USDT", "tradecount"]
        );

        let first = table.next_tick().unwrap();
        assert_eq!(first.open_time(), 1609459200000.0);
        assert_eq!(first.get("close"), Some(29331.69));
        assert_eq!(first.get("Close"), Some(29331.69));
        assert_eq!(first.get("symbol"), None);

        let second = table.next_tick().unwrap();
        assert_eq!(second.get("open"), Some(29331.70));
        assert!(!table.has_next());
    }

    #[test]
    fn plain_header_without_banner() {
        let body = "open time,open,close\n1,10,11\n2,11,12\n";
        let table = parse("t", body).unwrap();
        assert!(!table.was_reversed());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn header_only_is_an_empty_source() {
        let table = parse("t", "open time,open,close\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns().len(), 3);
    }

    #[test]
    fn later_garbage_in_numeric_column_is_rejected() {
        let body = "open time,close\n1,10\n2,oops\n";
        let err = parse("t", body).unwrap_err();
        match err {
            Error::DataUnavailable { reason, .. } => assert!(reason.contains("oops"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_open_time_is_rejected() {
        let body = "date,close\n2021-01-01,10\n";
        assert!(matches!(
            parse("t", body).unwrap_err(),
            Error::DataUnavailable { .. }
        ));
    }

    #[test]
    fn unordered_rows_are_rejected() {
        let body = "open time,close\n1,10\n3,11\n2,12\n4,13\n";
        assert!(matches!(
            parse("t", body).unwrap_err(),
            Error::DataUnavailable { .. }
        ));
    }

    #[test]
    fn missing_file_is_data_unavailable() {
        let err = load("/definitely/not/here.csv").unwrap_err();
        match err {
            Error::DataUnavailable { source_name, .. } => {
                assert_eq!(source_name, "binance_csv:/definitely/not/here.csv")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CDD.as_bytes()).unwrap();
        let table = load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
    }
}

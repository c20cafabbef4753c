use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};
use url::Url;

use common::{Config, Error, Result, TickTable};

/// Kline intervals accepted by `/api/v3/klines`.
pub const INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

/// Column names for the twelve fields of a kline row.
pub const KLINE_COLUMNS: [&str; 12] = [
    "open time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close time",
    "quote asset volume",
    "number of trades",
    "taker buy base asset volume",
    "taker buy quote asset volume",
    "ignore",
];

const KLINES_PATH: &str = "/api/v3/klines";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlinesQuery {
    pub symbol: String,
    pub interval: String,
    pub limit: u16,
}

impl KlinesQuery {
    /// Parse `symbol=..&interval=..&limit=..`. Missing keys fall back to the
    /// configured defaults; an empty string means all defaults.
    pub fn parse(query: &str, config: &Config) -> Result<Self> {
        let mut out = Self {
            symbol: config.binance_symbol.clone(),
            interval: config.binance_interval.clone(),
            limit: config.binance_limit,
        };

        let query = query.trim().trim_start_matches('?');
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "symbol" => out.symbol = value.trim().to_uppercase(),
                "interval" => out.interval = value.trim().to_string(),
                "limit" => {
                    out.limit = value.trim().parse().map_err(|_| {
                        Error::InvalidConfiguration(format!("klines limit '{value}' is not a number"))
                    })?
                }
                other => {
                    return Err(Error::InvalidConfiguration(format!(
                        "unknown klines query key '{other}', expected symbol, interval or limit"
                    )))
                }
            }
        }

        if out.symbol.is_empty() {
            return Err(Error::InvalidConfiguration("klines symbol is empty".into()));
        }
        if !INTERVALS.contains(&out.interval.as_str()) {
            return Err(Error::InvalidConfiguration(format!(
                "klines interval '{}' must be one of: {}",
                out.interval,
                INTERVALS.join(", ")
            )));
        }
        if !(1..=1000).contains(&out.limit) {
            return Err(Error::InvalidConfiguration(format!(
                "klines limit {} must be between 1 and 1000",
                out.limit
            )));
        }
        Ok(out)
    }

    pub fn source_name(&self) -> String {
        format!("binance_api:{}/{}", self.symbol, self.interval)
    }

    pub fn url(&self, base_url: &str) -> Result<Url> {
        let endpoint = format!("{}{KLINES_PATH}", base_url.trim_end_matches('/'));
        let limit = self.limit.to_string();
        Url::parse_with_params(
            &endpoint,
            &[
                ("symbol", self.symbol.as_str()),
                ("interval", self.interval.as_str()),
                ("limit", limit.as_str()),
            ],
        )
        .map_err(|e| Error::InvalidConfiguration(format!("bad Binance API URL '{base_url}': {e}")))
    }
}

/// Download klines and load them into a tick table.
///
/// Any transport failure, non-success status or malformed body is
/// `DataUnavailable`.
pub async fn fetch(base_url: &str, query: &KlinesQuery) -> Result<TickTable> {
    let name = query.source_name();
    let url = query.url(base_url)?;

    let http = Client::builder()
        .use_rustls_tls()
        .build()
        .map_err(|e| Error::data_unavailable(&name, e))?;

    info!(source = %name, %url, "Requesting klines");
    let resp = http.get(url.clone()).send().await.map_err(|e| {
        error!(source = %name, %url, error = %e, "Klines request failed");
        Error::data_unavailable(&name, e)
    })?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::data_unavailable(&name, e))?;

    if !status.is_success() {
        error!(source = %name, %status, body = %body, "Error retrieving klines");
        return Err(Error::data_unavailable(&name, format!("HTTP {status}: {body}")));
    }

    parse_klines(&name, &body)
}

/// Map a klines JSON body (array of 12-element arrays) onto a tick table.
///
/// Binance sends prices and volumes as strings and times and counts as
/// integers; both forms are accepted.
pub fn parse_klines(name: &str, body: &str) -> Result<TickTable> {
    let raw: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| Error::data_unavailable(name, e))?;

    let rows = raw
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            if row.len() != KLINE_COLUMNS.len() {
                return Err(Error::data_unavailable(
                    name,
                    format!("kline {} has {} fields, expected 12", idx + 1, row.len()),
                ));
            }
            row.iter()
                .zip(KLINE_COLUMNS)
                .map(|(value, column)| {
                    as_number(value).ok_or_else(|| {
                        Error::data_unavailable(
                            name,
                            format!("kline {}: '{column}' is not a number: {value}", idx + 1),
                        )
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let columns = KLINE_COLUMNS.iter().map(|c| c.to_string()).collect();
    TickTable::new(name, columns, rows)
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TickSource;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const BODY: &str = r#"[
        [1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"],
        [1499040300000,"0.01577100","0.01600000","0.01570000","0.01590000","1000.0",1499040599999,"15.9",12,"500.0","7.9","0"]
    ]"#;

    #[test]
    fn query_defaults_come_from_config() {
        let q = KlinesQuery::parse("", &Config::default()).unwrap();
        assert_eq!(q.symbol, "BTCUSDT");
        assert_eq!(q.interval, "5m");
        assert_eq!(q.limit, 500);
    }

    #[test]
    fn query_overrides() {
        let q = KlinesQuery::parse("?symbol=ethusdt&interval=1h&limit=20", &Config::default())
            .unwrap();
        assert_eq!(q.symbol, "ETHUSDT");
        assert_eq!(q.interval, "1h");
        assert_eq!(q.limit, 20);
        assert_eq!(q.source_name(), "binance_api:ETHUSDT/1h");
    }

    #[test]
    fn query_rejects_bad_values() {
        let cfg = Config::default();
        for bad in ["interval=7m", "limit=0", "limit=1001", "limit=ten", "pair=BTCUSDT"] {
            assert!(
                matches!(
                    KlinesQuery::parse(bad, &cfg).unwrap_err(),
                    Error::InvalidConfiguration(_)
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn url_carries_all_params() {
        let q = KlinesQuery::parse("symbol=BTCUSDT&interval=5m&limit=3", &Config::default())
            .unwrap();
        let url = q.url("https://testnet.binance.vision/").unwrap();
        assert_eq!(
            url.as_str(),
            "https://testnet.binance.vision/api/v3/klines?symbol=BTCUSDT&interval=5m&limit=3"
        );
    }

    #[test]
    fn parses_string_and_integer_fields() {
        let mut table = parse_klines("t", BODY).unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.was_reversed());
        let tick = table.next_tick().unwrap();
        assert_eq!(tick.open_time(), 1499040000000.0);
        assert_eq!(tick.get("close"), Some(0.01577100));
        assert_eq!(tick.get("number of trades"), Some(308.0));
    }

    #[test]
    fn malformed_body_is_data_unavailable() {
        for bad in ["{}", "[[1,2,3]]", r#"[[1,"x",1,1,1,1,1,1,1,1,1,1]]"#] {
            assert!(
                matches!(parse_klines("t", bad).unwrap_err(), Error::DataUnavailable { .. }),
                "{bad}"
            );
        }
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetch_loads_rows() {
        let base = serve_once("200 OK", BODY).await;
        let q = KlinesQuery::parse("limit=2", &Config::default()).unwrap();
        let table = fetch(&base, &q).await.unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn fetch_non_success_status_is_data_unavailable() {
        let base = serve_once("500 Internal Server Error", r#"{"msg":"boom"}"#).await;
        let q = KlinesQuery::parse("", &Config::default()).unwrap();
        match fetch(&base, &q).await.unwrap_err() {
            Error::DataUnavailable { reason, .. } => assert!(reason.contains("500"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

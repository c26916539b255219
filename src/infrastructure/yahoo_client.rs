use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::errors::FetchError;
use crate::domain::repositories::PriceSource;

/// Yahoo Finance public endpoint
pub const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; stockcast/0.1)";

/// Yahoo chart API configuration
#[derive(Debug, Clone)]
pub struct YahooConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: YAHOO_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    /// Yahoo reports `null` for sessions without a close.
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Extracts daily closes from a chart API body.
fn parse_chart_response(body: &str) -> Result<Vec<f64>, FetchError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    if let Some(error) = response.chart.error {
        return Err(FetchError::Upstream {
            code: error.code,
            description: error.description,
        });
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| FetchError::InvalidData("no data in response".to_string()))?;

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::InvalidData("no quote data in response".to_string()))?;

    if quote.close.is_empty() {
        return Err(FetchError::InvalidData("no close prices in response".to_string()));
    }

    quote
        .close
        .into_iter()
        .enumerate()
        .map(|(index, close)| {
            close.ok_or_else(|| FetchError::InvalidData(format!("missing close at index {}", index)))
        })
        .collect()
}

/// Yahoo Finance chart API client. One HTTP request per call.
pub struct YahooClient {
    client: Client,
    config: YahooConfig,
}

impl YahooClient {
    pub fn new(config: YahooConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn chart_url(&self, symbol: &str, period: &str) -> Result<Url, FetchError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/v8/finance/chart/{}", base, symbol))
            .map_err(|e| FetchError::Transport(format!("invalid API base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("interval", "1d")
            .append_pair("range", period);
        Ok(url)
    }
}

#[async_trait]
impl PriceSource for YahooClient {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn daily_closes(&self, symbol: &str, period: &str) -> Result<Vec<f64>, FetchError> {
        let url = self.chart_url(symbol, period)?;
        debug!(symbol = %symbol, url = %url, "Fetching stock data");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read response body: {}", e)))?;

        if status != StatusCode::OK {
            return Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        parse_chart_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> YahooClient {
        YahooClient::new(YahooConfig {
            base_url,
            timeout: Duration::from_secs(5),
            ..YahooConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_closes() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[101.5,102.25,100.0]}]}}],"error":null}}"#;
        assert_eq!(parse_chart_response(body).unwrap(), vec![101.5, 102.25, 100.0]);
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        match parse_chart_response(body).unwrap_err() {
            FetchError::Upstream { code, .. } => assert_eq!(code, "Not Found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_sections() {
        let no_result = r#"{"chart":{"result":[],"error":null}}"#;
        let no_quote = r#"{"chart":{"result":[{"indicators":{"quote":[]}}],"error":null}}"#;
        let no_close = r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[]}]}}],"error":null}}"#;
        for body in [no_result, no_quote, no_close] {
            assert!(matches!(parse_chart_response(body), Err(FetchError::InvalidData(_))));
        }
    }

    #[test]
    fn test_null_close_is_invalid_data() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[101.0,null,102.0]}]}}],"error":null}}"#;
        match parse_chart_response(body).unwrap_err() {
            FetchError::InvalidData(msg) => assert!(msg.contains("index 1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(parse_chart_response("<html>"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_chart_url() {
        let client = client("https://example.test/".to_string());
        let url = client.chart_url("AAPL", "1mo").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/v8/finance/chart/AAPL?interval=1d&range=1mo"
        );
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let base = serve_once(
            "200 OK",
            r#"{"chart":{"result":[{"indicators":{"quote":[{"close":[10.0,11.0]}]}}],"error":null}}"#,
        )
        .await;
        let closes = client(base).daily_closes("AAPL", "1mo").await.unwrap();
        assert_eq!(closes, vec![10.0, 11.0]);
    }

    #[tokio::test]
    async fn test_non_200_is_upstream_status() {
        let base = serve_once("503 Service Unavailable", "busy").await;
        match client(base).daily_closes("AAPL", "1mo").await.unwrap_err() {
            FetchError::UpstreamStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

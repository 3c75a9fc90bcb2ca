//! Numeric value read from an arbitrary JSON HTTP API.

use crate::feeds::{SourceError, TrustedValueSource};
use crate::query::ReportValue;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Fetches `url` and walks `path` (comma-separated keys, numeric segments
/// index arrays) down to a number.
pub struct NumericApiSource {
    url: String,
    path: Vec<String>,
    client: Client,
}

impl NumericApiSource {
    pub fn new(url: &str, parse_str: &str, client: Client) -> Self {
        Self {
            url: url.to_string(),
            path: parse_str
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            client,
        }
    }
}

fn extract(body: &Value, path: &[String]) -> Option<f64> {
    let mut node = body;
    for key in path {
        node = match node {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => node.get(key)?,
        };
    }
    match node {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl TrustedValueSource for NumericApiSource {
    fn describe(&self) -> String {
        format!("api {} [{}]", self.url, self.path.join(", "))
    }

    async fn fetch(&self, _at_block: Option<u64>) -> Result<ReportValue, SourceError> {
        let body: Value = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        extract(&body, &self.path)
            .map(ReportValue::Numeric)
            .ok_or_else(|| SourceError::Parse(format!("no number at {}", self.describe())))
    }
}

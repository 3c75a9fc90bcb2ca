//! Consumes [`MonitorEvent`]s: alerts to stdout and the log, rows to a
//! JSON-lines file when one is configured.

use crate::pipeline::MonitorEvent;

use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

pub struct ReportSink {
    rows_path: Option<PathBuf>,
}

impl ReportSink {
    pub fn new(rows_path: Option<PathBuf>) -> Self {
        Self { rows_path }
    }

    pub async fn handle(&self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Alert { message, link } => {
                warn!(link = %link, "{}", message.lines().next().unwrap_or_default());
                println!("{message}");
            }
            MonitorEvent::Row(row) => {
                info!(
                    tx = %row.tx_hash,
                    query_type = %row.query_type,
                    value = %row.value,
                    warning = row.warning.as_deref(),
                    status = %row.status,
                    chain_id = row.chain_id,
                    "report"
                );
                if let Err(e) = self.append_row(row).await {
                    error!(error = %e, "failed to persist report row");
                }
            }
            MonitorEvent::Disputed { .. } => {
                info!("{event}");
                println!("{event}");
            }
        }
    }

    async fn append_row(&self, row: &crate::pipeline::ReportRow) -> anyhow::Result<()> {
        let Some(path) = &self.rows_path else {
            return Ok(());
        };
        let mut line = serde_json::to_string(row)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ReportRow;

    fn row(tx: &str) -> ReportRow {
        ReportRow {
            tx_hash: tx.to_string(),
            timestamp: 1_700_000_000,
            when: None,
            query_type: "SpotPrice".into(),
            value: "1234.5000".into(),
            warning: None,
            status: "no ✔".into(),
            asset: "ETH".into(),
            currency: "USD".into(),
            chain_id: 1,
            link: "https://etherscan.io/tx/0x01".into(),
        }
    }

    #[tokio::test]
    async fn test_rows_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        let sink = ReportSink::new(Some(path.clone()));

        sink.handle(&MonitorEvent::Row(row("0x01"))).await;
        sink.handle(&MonitorEvent::Alert {
            message: "❗NEW VALUE❗\nlink".into(),
            link: "link".into(),
        })
        .await;
        sink.handle(&MonitorEvent::Row(row("0x02"))).await;

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["tx_hash"], "0x02");
        assert_eq!(second["status"], "no ✔");
        assert!(second.get("warning").is_none());
    }

    #[tokio::test]
    async fn test_no_path_writes_nothing() {
        let sink = ReportSink::new(None);
        assert!(sink.append_row(&row("0x01")).await.is_ok());
    }
}

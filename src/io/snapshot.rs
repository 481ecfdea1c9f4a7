use anyhow::Result;
use std::io::Write;

use crate::application::{BalanceSnapshot, PlatformService};
use crate::domain::format_cents;

/// Exporter for point-in-time balance snapshots.
pub struct SnapshotExporter<'a> {
    service: &'a PlatformService,
}

impl<'a> SnapshotExporter<'a> {
    pub fn new(service: &'a PlatformService) -> Self {
        Self { service }
    }

    /// Write one CSV row per user. Returns the number of rows written.
    pub async fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let snapshot = self.service.balance_snapshot().await?;
        write_csv(&snapshot, writer)
    }

    /// Write the full snapshot, with totals, as pretty JSON.
    pub async fn export_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let snapshot = self.service.balance_snapshot().await?;
        serde_json::to_writer_pretty(&mut writer, &snapshot)?;
        writeln!(writer)?;
        Ok(snapshot.entries.len())
    }
}

pub fn write_csv<W: Write>(snapshot: &BalanceSnapshot, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "taken_at",
        "user_id",
        "username",
        "balance",
        "earnings_balance",
    ])?;

    let taken_at = snapshot.taken_at.to_rfc3339();
    for entry in &snapshot.entries {
        csv_writer.write_record([
            taken_at.clone(),
            entry.user_id.to_string(),
            entry.username.clone(),
            format_cents(entry.balance),
            format_cents(entry.earnings_balance),
        ])?;
    }

    csv_writer.flush()?;
    Ok(snapshot.entries.len())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::application::BalanceSnapshotEntry;

    use super::*;

    #[test]
    fn test_write_csv() {
        let snapshot = BalanceSnapshot {
            taken_at: Utc::now(),
            entries: vec![BalanceSnapshotEntry {
                user_id: Uuid::new_v4(),
                username: "alice".into(),
                balance: 2550,
                earnings_balance: 10000,
            }],
            total_balance: 2550,
            total_earnings_balance: 10000,
        };

        let mut out = Vec::new();
        let rows = write_csv(&snapshot, &mut out).unwrap();
        assert_eq!(rows, 1);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("taken_at,user_id,username,balance,earnings_balance")
        );
        let row = lines.next().unwrap();
        assert!(row.ends_with(",alice,25.50,100.00"));
    }
}

mod common;

use anyhow::Result;
use common::{CreatorWithEarnings, funded_user, test_service};
use creator_ledger::application::BalanceSnapshot;
use creator_ledger::io::SnapshotExporter;

#[tokio::test]
async fn test_balance_snapshot_totals() -> Result<()> {
    let (service, _temp) = test_service().await?;
    CreatorWithEarnings::create(&service).await?;
    funded_user(&service, "saver", 12_345).await?;

    let snapshot = service.balance_snapshot().await?;
    assert_eq!(snapshot.entries.len(), 3);
    assert_eq!(snapshot.total_balance, 12_345);
    assert_eq!(snapshot.total_earnings_balance, CreatorWithEarnings::EARNINGS);

    let creator = snapshot
        .entries
        .iter()
        .find(|e| e.username == "creator")
        .unwrap();
    assert_eq!(creator.earnings_balance, CreatorWithEarnings::EARNINGS);

    Ok(())
}

#[tokio::test]
async fn test_snapshot_export_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_user(&service, "saver", 12_345).await?;

    let exporter = SnapshotExporter::new(&service);
    let mut out = Vec::new();
    let count = exporter.export_csv(&mut out).await?;
    assert_eq!(count, 1);

    let mut reader = csv::Reader::from_reader(out.as_slice());
    let headers = reader.headers()?.clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["taken_at", "user_id", "username", "balance", "earnings_balance"]
    );

    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][2], "saver");
    assert_eq!(&rows[0][3], "123.45");
    assert_eq!(&rows[0][4], "0.00");

    Ok(())
}

#[tokio::test]
async fn test_snapshot_export_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_user(&service, "saver", 500).await?;
    funded_user(&service, "spender", 700).await?;

    let exporter = SnapshotExporter::new(&service);
    let mut out = Vec::new();
    exporter.export_json(&mut out).await?;

    let snapshot: BalanceSnapshot = serde_json::from_slice(&out)?;
    assert_eq!(snapshot.entries.len(), 2);
    assert_eq!(snapshot.total_balance, 1_200);

    Ok(())
}

#[tokio::test]
async fn test_vacuum_keeps_live_sessions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    funded_user(&service, "saver", 500).await?;
    let session = service.issue_session("saver").await?;

    assert_eq!(service.purge_expired_sessions().await?, 0);
    service.vacuum().await?;

    assert_eq!(service.authenticate(&session.token).await?.username, "saver");
    Ok(())
}

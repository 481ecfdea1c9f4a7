mod common;

use anyhow::Result;
use common::{create_tier, create_user, test_service};
use creator_ledger::domain::Role;
use creator_ledger::io::{ImportOptions, Importer};

const USERS_CSV: &str = "\
username,display_name,email,role,tier_name,tier_description,tier_price
artist,The Artist,artist@example.com,,Basic,Behind the scenes,9.99
artist,The Artist,artist@example.com,,Premium,,24.50
artist,The Artist,artist@example.com,,VIP,Monthly call,45
ops,,ops@example.com,admin,,,
";

#[tokio::test]
async fn test_import_users_and_tiers_from_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let importer = Importer::new(&service);

    let result = importer
        .import_csv(USERS_CSV.as_bytes(), ImportOptions::default())
        .await?;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.users_created, 2);
    assert_eq!(result.tiers_created, 3);

    let artist = service.get_user("artist").await?;
    assert_eq!(artist.display_name, "The Artist");
    assert_eq!(artist.role, Role::User);
    assert_eq!(service.get_user("ops").await?.role, Role::Admin);

    let tiers = service.list_tiers("artist").await?;
    assert_eq!(tiers.len(), 3);
    let basic = tiers.iter().find(|t| t.name == "Basic").unwrap();
    assert_eq!(basic.price_cents, 999);
    assert_eq!(basic.description.as_deref(), Some("Behind the scenes"));
    let vip = tiers.iter().find(|t| t.name == "VIP").unwrap();
    assert_eq!(vip.price_cents, 4_500);

    Ok(())
}

#[tokio::test]
async fn test_import_skips_duplicates() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let artist = create_user(&service, "artist").await?;
    create_tier(&service, &artist, "Basic", 500).await?;
    // Same email as a row below, different username
    create_user(&service, "someone").await?;

    let csv = "\
username,email,tier_name,tier_price
artist,artist@example.com,Basic,9.99
artist,artist@example.com,Premium,20
newcomer,someone@example.com,Basic,5
";
    let importer = Importer::new(&service);
    let result = importer
        .import_csv(csv.as_bytes(), ImportOptions::default())
        .await?;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.users_created, 0);
    assert_eq!(result.users_skipped, 2);
    assert_eq!(result.tiers_created, 1);
    assert_eq!(result.tiers_skipped, 2);

    // The existing tier keeps its price
    let tiers = service.list_tiers("artist").await?;
    assert_eq!(tiers.len(), 2);
    assert_eq!(
        tiers.iter().find(|t| t.name == "Basic").unwrap().price_cents,
        500
    );
    assert!(service.get_user("newcomer").await.is_err());

    // Running the same file again changes nothing
    let again = importer
        .import_csv(csv.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(again.tiers_created, 0);
    assert_eq!(again.tiers_skipped, 3);

    Ok(())
}

#[tokio::test]
async fn test_import_from_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let json = r#"[
        {
            "username": "painter",
            "email": "painter@example.com",
            "tiers": [
                { "name": "Basic", "price": "5.00" },
                { "name": "VIP", "description": "Originals", "price": "50" }
            ]
        },
        { "username": "viewer", "display_name": "Just Looking", "email": "viewer@example.com" }
    ]"#;

    let result = Importer::new(&service)
        .import_json(json.as_bytes(), ImportOptions::default())
        .await?;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.users_created, 2);
    assert_eq!(result.tiers_created, 2);

    assert_eq!(service.list_tiers("painter").await?.len(), 2);
    assert!(service.list_tiers("viewer").await?.is_empty());
    assert_eq!(
        service.get_user("viewer").await?.display_name,
        "Just Looking"
    );

    Ok(())
}

#[tokio::test]
async fn test_import_reports_bad_rows() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let csv = "\
username,email,role,tier_name,tier_price
good,good@example.com,,Basic,not-money
bad name,bad@example.com,,,
boss,boss@example.com,owner,,
pricey,pricey@example.com,,Whale,100000.01
";

    let result = Importer::new(&service)
        .import_csv(csv.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(result.users_created, 2);
    assert_eq!(result.tiers_created, 0);

    let lines: Vec<usize> = result.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![2, 3, 4, 5]);
    assert_eq!(result.errors[0].field.as_deref(), Some("tier_price"));
    assert_eq!(result.errors[2].field.as_deref(), Some("role"));

    assert!(service.get_user("good").await.is_ok());
    assert!(service.get_user("boss").await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_import_dry_run_writes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let artist = create_user(&service, "artist").await?;
    create_tier(&service, &artist, "Basic", 500).await?;

    let csv = "\
username,email,tier_name,tier_price
artist,artist@example.com,Basic,9.99
artist,artist@example.com,Premium,20
fresh,fresh@example.com,Basic,5
";
    let result = Importer::new(&service)
        .import_csv(csv.as_bytes(), ImportOptions { dry_run: true })
        .await?;
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.users_created, 1);
    assert_eq!(result.users_skipped, 1);
    assert_eq!(result.tiers_created, 2);
    assert_eq!(result.tiers_skipped, 1);

    assert!(service.get_user("fresh").await.is_err());
    assert_eq!(service.list_tiers("artist").await?.len(), 1);

    Ok(())
}

use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};

use peer_locator::{
    config::ParserConfig,
    database::{Database, SightingStore},
    errors::PeerLocatorError,
    ingest::ingest_log,
    models::UserId,
    parser::LogParser,
};

const SCAN_LOG: &str = r#"2023-01-01 12:00:00.000 I/App: proximity scan started
2023-01-01 12:00:01.000 D/ProximityScan: location update [fixTs=1672574401000, currentTs=1672574401020, cmTs=1672574401010, lat=60.1699, lng=24.9384, alt=15.0, hasAlt=true, acc=8.0, hasAcc=true]
2023-01-01 12:00:01.005 D/ProximityScan: peer update list start
2023-01-01 12:00:01.006 D/ProximityScan: peer update [id=1, displayName="alice", distance=250, expires=1672578001000]
2023-01-01 12:00:01.007 W/Bluetooth: scan throttled
2023-01-01 12:00:01.008 D/ProximityScan: peer update [id=2, displayName="bob, the builder", distance=90, expires=1672578001000]
2023-01-01 12:00:01.009 D/ProximityScan: peer update list end
2023-01-01 12:00:06.000 D/ProximityScan: location update [fixTs=1672574401000, currentTs=1672574406020, cmTs=1672574406010, lat=60.1699, lng=24.9384, alt=15.0, hasAlt=true, acc=8.0, hasAcc=true]
2023-01-01 12:00:06.005 D/ProximityScan: peer update list start
2023-01-01 12:00:06.006 D/ProximityScan: peer update [id=1, displayName="alice", distance=260, expires=1672578006000]
2023-01-01 12:00:06.007 D/ProximityScan: peer update [id=3, displayName="carol", distance=400, expires=1672578006000]
2023-01-01 12:00:06.009 D/ProximityScan: peer update list end
2023-01-01 12:00:11.000 D/ProximityScan: location update [fixTs=1672574411000, currentTs=1672574411020, cmTs=1672574411010, lat=60.1710, lng=24.9400, alt=0.0, hasAlt=false, acc=0.0, hasAcc=false]
2023-01-01 12:00:11.005 D/ProximityScan: peer update list start
2023-01-01 12:00:11.006 D/ProximityScan: peer update [id=1, displayName="alice", distance=180, expires=1672578011000]
2023-01-01 12:00:11.009 D/ProximityScan: peer update list end
"#;

async fn setup_test_db() -> (TempDir, Database) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", temp_dir.path().join("scan.db").display());
    let db = Database::from_url(&url)
        .await
        .expect("Failed to open database");
    (temp_dir, db)
}

fn write_log(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("scan.log");
    std::fs::write(&path, contents).expect("Failed to write log");
    path
}

fn parser() -> LogParser {
    LogParser::new(&ParserConfig::default())
}

#[tokio::test]
async fn test_ingest_log() {
    let (temp_dir, db) = setup_test_db().await;
    let path = write_log(temp_dir.path(), SCAN_LOG);

    let report = ingest_log(&db, &parser(), &path)
        .await
        .expect("Failed to ingest log");

    assert_eq!(report.parse.duplicate_blocks, 1);
    assert_eq!(report.inserted.locations, 2);
    assert_eq!(report.inserted.users, 2);
    assert_eq!(report.inserted.sightings, 3);
    assert!(report.first_fix < report.last_fix);

    // Second block repeats the first fix; carol was only seen there
    let users = db.users_with_sighting_counts().await.unwrap();
    let names: Vec<(&str, i64)> = users
        .iter()
        .map(|u| (u.name.as_str(), u.sighting_count))
        .collect();
    assert_eq!(names, vec![("alice", 2), ("bob, the builder", 1)]);

    let locations = db.locations().await.unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].altitude, Some(15.0));
    assert_eq!(locations[1].altitude, None);
    assert_eq!(locations[1].horizontal_accuracy, None);

    let stored: (i64, i64) =
        sqlx::query_as("SELECT distance, fix_ts FROM sightings WHERE user_id = ?1 ORDER BY id")
            .bind(1i64)
            .fetch_one(db.pool())
            .await
            .expect("Failed to retrieve sighting");
    assert_eq!(stored, (250, 1672574401000));
}

#[tokio::test]
async fn test_reingest_duplicates_only_sightings() {
    let (temp_dir, db) = setup_test_db().await;
    let path = write_log(temp_dir.path(), SCAN_LOG);

    ingest_log(&db, &parser(), &path).await.unwrap();
    let first = db.table_counts().await.unwrap();

    let report = ingest_log(&db, &parser(), &path).await.unwrap();
    let second = db.table_counts().await.unwrap();

    assert_eq!(report.inserted.locations, 0);
    assert_eq!(report.inserted.users, 0);
    assert_eq!(second.locations, first.locations);
    assert_eq!(second.users, first.users);
    // Sightings are appended again on every run
    assert_eq!(second.sightings, 2 * first.sightings);
}

#[tokio::test]
async fn test_missing_log_aborts_before_writing() {
    let (temp_dir, db) = setup_test_db().await;
    let path = temp_dir.path().join("does-not-exist.log");

    let result = ingest_log(&db, &parser(), &path).await;

    assert!(matches!(
        result,
        Err(PeerLocatorError::LogUnreadable { .. })
    ));
    let counts = db.table_counts().await.unwrap();
    assert_eq!(counts.locations + counts.users + counts.sightings, 0);
}

#[tokio::test]
async fn test_sightings_for_user_join_accuracy() {
    let (temp_dir, db) = setup_test_db().await;
    let path = write_log(temp_dir.path(), SCAN_LOG);
    ingest_log(&db, &parser(), &path).await.unwrap();

    let sightings = db.sightings_for_user(UserId::from(1)).await.unwrap();

    let observed: Vec<(i64, Option<f64>)> =
        sightings.iter().map(|s| (s.distance, s.accuracy)).collect();
    assert_eq!(observed, vec![(250, Some(8.0)), (180, None)]);
    assert!(db
        .sightings_for_user(UserId::from(42))
        .await
        .unwrap()
        .is_empty());
}

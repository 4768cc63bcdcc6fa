//! Peer locator utility

use peer_locator::{
    config::AppConfig,
    database::Database,
    errors::PeerLocatorError,
    estimator::LocationEstimator,
    ingest::ingest_log,
    models::UserId,
    parser::LogParser,
    query::{QueryParams, QueryService},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), PeerLocatorError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration from config/default and PEERLOC__ environment variables
    let config = AppConfig::load()?;
    config.validate()?;

    let db = Database::from_config(&config.database).await?;
    let parser = LogParser::new(&config.parser);

    for path in &config.ingest.logs {
        let report = ingest_log(&db, &parser, path).await?;
        info!(
            "Ingested {}: {} new locations, {} new users, {} sightings",
            report.path.display(),
            report.inserted.locations,
            report.inserted.users,
            report.inserted.sightings
        );
    }

    let counts = db.table_counts().await?;
    info!(
        "Store holds {} locations, {} users, {} sightings",
        counts.locations, counts.users, counts.sightings
    );

    let output = match &config.query {
        Some(query) => {
            let params = QueryParams::try_new(
                UserId::from(query.user_id),
                query.max_distance,
                query.max_accuracy,
            )?;
            let service =
                QueryService::new(db.clone(), LocationEstimator::new(config.estimator.clone()));
            serde_json::to_string_pretty(&service.query(&params).await?)?
        }
        None => serde_json::to_string_pretty(&serde_json::json!({
            "users": db.users_with_sighting_counts().await?,
            "locations": db.locations().await?,
        }))?,
    };
    println!("{}", output);

    Ok(())
}

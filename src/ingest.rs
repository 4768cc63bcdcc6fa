//! Batch ingestion of scan logs

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    database::{Database, InsertSummary},
    errors::PeerLocatorError,
    parser::{LogParser, ParseReport},
};

/// Result of ingesting one log file
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub path: PathBuf,
    pub parse: ParseReport,
    pub inserted: InsertSummary,
    /// Fix time range covered by the log
    pub first_fix: Option<DateTime<Utc>>,
    pub last_fix: Option<DateTime<Utc>>,
}

/// Parse the log at `path` and commit its records in one transaction.
///
/// An unreadable file aborts before the store is touched. Invalid UTF-8 is
/// replaced, and the affected lines are left to the parser's tolerance.
pub async fn ingest_log(
    database: &Database,
    parser: &LogParser,
    path: &Path,
) -> Result<IngestReport, PeerLocatorError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| PeerLocatorError::LogUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    let contents = String::from_utf8_lossy(&bytes);

    let (records, parse) = parser.parse(contents.lines());
    if parse.malformed_lines > 0 || parse.abandoned_blocks > 0 {
        warn!(
            "{}: skipped {} malformed lines, abandoned {} blocks",
            path.display(),
            parse.malformed_lines,
            parse.abandoned_blocks
        );
    }

    let first_fix = records.locations.iter().filter_map(|l| l.fix_time()).min();
    let last_fix = records.locations.iter().filter_map(|l| l.fix_time()).max();
    info!(
        "{}: parsed {} lines into {} locations, {} sightings ({} duplicate blocks), fixes {:?} - {:?}",
        path.display(),
        parse.lines,
        records.locations.len(),
        records.sightings.len(),
        parse.duplicate_blocks,
        first_fix,
        last_fix
    );

    let inserted = database.insert_records(&records).await?;

    Ok(IngestReport {
        path: path.to_path_buf(),
        parse,
        inserted,
        first_fix,
        last_fix,
    })
}

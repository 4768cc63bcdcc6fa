//! Proximity scan log parser
//!
//! A scan log interleaves GPS fix lines with blocks listing the peers seen
//! during that fix:
//!
//! ```text
//! ... location update [fixTs=..., currentTs=..., cmTs=..., lat=..., lng=..., alt=..., hasAlt=true, acc=..., hasAcc=true]
//! ... peer update list start
//! ... peer update [id=..., displayName="...", distance=..., expires=...]
//! ... peer update list end
//! ```
//!
//! Lines outside a block, and non-peer lines inside a peer list, are noise
//! and skipped.

mod cursor;
mod fields;

use tracing::{debug, warn};

use crate::{
    config::ParserConfig,
    errors::PeerLocatorError,
    models::{Location, LogRecords, NewSighting, User, UserId},
};
pub use cursor::LineCursor;
pub use fields::Fields;

const LOCATION_UPDATE: &str = "location update";
const PEER_LIST_START: &str = "peer update list start";
const PEER_LIST_END: &str = "peer update list end";
const PEER_UPDATE: &str = "peer update";

/// Location block the parser is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    fix_timestamp: i64,
    /// Block repeats the previous fix; its peers are consumed but dropped
    duplicate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    ScanningForLocationBlock,
    AwaitingListStart { block: Block, skipped: usize },
    ScanningPeerList { block: Block },
}

/// What the parser did besides emitting records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub lines: usize,
    pub malformed_lines: usize,
    pub duplicate_blocks: usize,
    pub abandoned_blocks: usize,
}

/// Parsed peer line
#[derive(Debug, Clone, PartialEq, Eq)]
struct PeerRecord {
    id: UserId,
    display_name: String,
    distance: i64,
    expire_timestamp: i64,
}

pub struct LogParser {
    max_list_start_skip: usize,
}

impl LogParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            max_list_start_skip: config.max_list_start_skip,
        }
    }

    /// Parse a complete log in one forward pass
    pub fn parse<I, S>(&self, lines: I) -> (LogRecords, ParseReport)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cursor = LineCursor::new(lines.into_iter());
        let mut records = LogRecords::default();
        let mut report = ParseReport::default();
        let mut last_fix: Option<i64> = None;
        let mut state = ParserState::ScanningForLocationBlock;

        while !cursor.at_end() {
            let line_number = cursor.line_number();
            let Some(line) = cursor.peek() else {
                break;
            };
            let mut consume = true;

            state = match state {
                ParserState::ScanningForLocationBlock => {
                    if !line.contains(LOCATION_UPDATE) {
                        ParserState::ScanningForLocationBlock
                    } else {
                        match parse_location(line) {
                            Ok(location) => {
                                let duplicate = last_fix == Some(location.fix_timestamp);
                                let block = Block {
                                    fix_timestamp: location.fix_timestamp,
                                    duplicate,
                                };
                                if duplicate {
                                    debug!(
                                        "Line {}: fix {} repeats previous fix, dropping block",
                                        line_number, location.fix_timestamp
                                    );
                                    report.duplicate_blocks += 1;
                                } else {
                                    last_fix = Some(location.fix_timestamp);
                                    records.locations.push(location);
                                }
                                ParserState::AwaitingListStart { block, skipped: 0 }
                            }
                            Err(e) => {
                                warn!("Line {}: malformed location update: {}", line_number, e);
                                report.malformed_lines += 1;
                                ParserState::ScanningForLocationBlock
                            }
                        }
                    }
                }
                ParserState::AwaitingListStart { block, skipped } => {
                    if line.contains(PEER_LIST_START) {
                        ParserState::ScanningPeerList { block }
                    } else if skipped >= self.max_list_start_skip {
                        warn!(
                            "Line {}: no peer list within {} lines of fix {}, abandoning block",
                            line_number, self.max_list_start_skip, block.fix_timestamp
                        );
                        report.abandoned_blocks += 1;
                        consume = false;
                        ParserState::ScanningForLocationBlock
                    } else {
                        ParserState::AwaitingListStart {
                            block,
                            skipped: skipped + 1,
                        }
                    }
                }
                ParserState::ScanningPeerList { block } => {
                    if line.contains(PEER_LIST_END) {
                        ParserState::ScanningForLocationBlock
                    } else {
                        if line.contains(PEER_LIST_START) {
                            debug!("Line {}: peer list restarted without an end", line_number);
                        } else if line.contains(PEER_UPDATE) {
                            match parse_peer(line) {
                                Ok(_) if block.duplicate => {}
                                Ok(peer) => emit_peer(&mut records, &block, peer),
                                Err(e) => {
                                    warn!("Line {}: malformed peer update: {}", line_number, e);
                                    report.malformed_lines += 1;
                                }
                            }
                        }
                        ParserState::ScanningPeerList { block }
                    }
                }
            };

            if consume {
                cursor.advance();
            }
        }

        report.lines = cursor.line_number() - 1;
        (records, report)
    }
}

fn emit_peer(records: &mut LogRecords, block: &Block, peer: PeerRecord) {
    records.sightings.push(NewSighting {
        user_id: peer.id,
        fix_timestamp: block.fix_timestamp,
        distance: peer.distance,
        expire_timestamp: peer.expire_timestamp,
    });
    records.users.push(User {
        id: peer.id,
        display_name: peer.display_name,
    });
}

fn parse_location(line: &str) -> Result<Location, PeerLocatorError> {
    let fields = Fields::parse(line)?;
    Ok(Location {
        fix_timestamp: fields.required("fixTs")?,
        log_timestamp: fields.required("currentTs")?,
        capture_timestamp: fields.required("cmTs")?,
        latitude: fields.required("lat")?,
        longitude: fields.required("lng")?,
        altitude: fields.gated("alt", "hasAlt")?,
        horizontal_accuracy: fields.gated("acc", "hasAcc")?,
    })
}

fn parse_peer(line: &str) -> Result<PeerRecord, PeerLocatorError> {
    let fields = Fields::parse(line)?;
    Ok(PeerRecord {
        id: UserId::from(fields.required::<i64>("id")?),
        display_name: fields.string("displayName")?,
        distance: fields.required("distance")?,
        expire_timestamp: fields.required("expires")?,
    })
}

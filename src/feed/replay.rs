use crate::feed::{FeedError, FeedSource, VehicleRecord};
use std::path::PathBuf;

/// Feed source that replays decoded records from a JSON file on every poll.
/// Stands in for the live collaborator during local runs.
pub struct ReplayFeed {
    path: PathBuf,
}

impl ReplayFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FeedSource for ReplayFeed {
    fn poll(&mut self) -> Result<Vec<VehicleRecord>, FeedError> {
        let contents = std::fs::read_to_string(&self.path)?;
        let records: Vec<VehicleRecord> = serde_json::from_str(&contents)?;
        Ok(records)
    }
}

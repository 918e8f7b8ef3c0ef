use crate::feed::{FeedError, FeedSource, VehicleRecord};

#[derive(Debug, Clone)]
pub struct MockFeedBehavior {
    pub poll_ok: bool,
    pub records: Vec<VehicleRecord>,
}

impl MockFeedBehavior {
    pub fn with_records(records: Vec<VehicleRecord>) -> Self {
        Self {
            poll_ok: true,
            records,
        }
    }

    pub fn empty() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn fail_poll() -> Self {
        Self {
            poll_ok: false,
            records: Vec::new(),
        }
    }
}

/// Scripted feed source: each poll consumes the next behavior, repeating an
/// empty successful poll once the script runs out.
pub struct MockFeed {
    behaviors: Vec<MockFeedBehavior>,
    next_index: usize,
}

impl MockFeed {
    pub fn new(behaviors: Vec<MockFeedBehavior>) -> Self {
        Self {
            behaviors,
            next_index: 0,
        }
    }

    fn next_behavior(&mut self) -> MockFeedBehavior {
        let behavior = self
            .behaviors
            .get(self.next_index)
            .cloned()
            .unwrap_or_else(MockFeedBehavior::empty);
        self.next_index += 1;
        behavior
    }
}

impl FeedSource for MockFeed {
    fn poll(&mut self) -> Result<Vec<VehicleRecord>, FeedError> {
        let behavior = self.next_behavior();
        if behavior.poll_ok {
            Ok(behavior.records)
        } else {
            Err(FeedError::Unavailable("mock poll failed".to_string()))
        }
    }
}

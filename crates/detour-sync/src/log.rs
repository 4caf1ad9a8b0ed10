use std::collections::VecDeque;

use crate::report::CascadeReport;
use detour_core::NodeId;
use parking_lot::Mutex;

/// The most recent cascade reports, oldest dropped first.
#[derive(Debug)]
pub struct PropagationLog {
    capacity: usize,
    entries: Mutex<VecDeque<CascadeReport>>,
}

impl PropagationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn record(&self, report: CascadeReport) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(report);
    }

    /// Up to `limit` reports, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CascadeReport> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Reports of cascades rooted at `node`, newest first.
    pub fn for_node(&self, node: NodeId) -> Vec<CascadeReport> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|report| report.root == node)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for PropagationLog {
    fn default() -> Self {
        Self::new(256)
    }
}

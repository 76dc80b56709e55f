use std::collections::{HashMap, VecDeque};

use procwatch_protocol::ProgressEvent;

/// Fixed-capacity FIFO: pushing past capacity evicts the oldest entry.
#[derive(Clone, Debug)]
pub struct BoundedLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedLog<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `item`, returning the evicted entry if the log was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// One bounded log per unit of work.
#[derive(Debug)]
pub(crate) struct EventLogs {
    capacity: usize,
    logs: HashMap<String, BoundedLog<ProgressEvent>>,
}

impl EventLogs {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            logs: HashMap::new(),
        }
    }

    pub(crate) fn append(&mut self, event: ProgressEvent) {
        let capacity = self.capacity;
        self.logs
            .entry(event.unit_id.clone())
            .or_insert_with(|| BoundedLog::new(capacity))
            .push(event);
    }

    pub(crate) fn entries(&self, unit_id: &str) -> Vec<ProgressEvent> {
        self.logs
            .get(unit_id)
            .map(BoundedLog::to_vec)
            .unwrap_or_default()
    }

    pub(crate) fn forget(&mut self, unit_id: &str) {
        self.logs.remove(unit_id);
    }
}

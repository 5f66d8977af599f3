// Double-ended work queue shared by the facade and the cleanup worker.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::item::{WorkItem, WorkKind};

#[derive(Default)]
struct Items {
    deque: VecDeque<WorkItem>,
    /// How many of each plain task (no candidate source) are queued.
    plain: HashMap<(WorkKind, String), usize>,
}

impl Items {
    fn track(&mut self, item: &WorkItem) {
        if item.source.is_none() {
            *self
                .plain
                .entry((item.kind, item.relative_path.clone()))
                .or_insert(0) += 1;
        }
    }

    fn untrack(&mut self, item: &WorkItem) {
        if item.source.is_some() {
            return;
        }
        let key = (item.kind, item.relative_path.clone());
        if let Some(n) = self.plain.get_mut(&key) {
            *n -= 1;
            if *n == 0 {
                self.plain.remove(&key);
            }
        }
    }

    fn push_back(&mut self, item: WorkItem) {
        self.track(&item);
        self.deque.push_back(item);
    }

    fn push_front(&mut self, item: WorkItem) {
        self.track(&item);
        self.deque.push_front(item);
    }

    fn clear(&mut self) {
        self.deque.clear();
        self.plain.clear();
    }
}

/// Work queue; the lock is held only for the structural change itself.
///
/// Every insertion wakes the worker. Head insertion is for work that must
/// run before what is already queued.
pub struct WorkQueue {
    items: Mutex<Items>,
    wake: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Items::default()),
            wake: Notify::new(),
        }
    }

    /// Adds newly discovered work at the tail.
    pub fn append(&self, item: WorkItem) {
        self.items.lock().push_back(item);
        self.wake.notify_one();
    }

    /// Like [`append`](Self::append), unless the same plain task is already
    /// queued. Returns whether the item was added.
    pub fn append_unique(&self, item: WorkItem) -> bool {
        {
            let mut items = self.items.lock();
            if item.source.is_none()
                && items
                    .plain
                    .contains_key(&(item.kind, item.relative_path.clone()))
            {
                return false;
            }
            items.push_back(item);
        }
        self.wake.notify_one();
        true
    }

    /// Puts one item at the head.
    pub fn prepend_one(&self, item: WorkItem) {
        self.items.lock().push_front(item);
        self.wake.notify_one();
    }

    /// Puts `items` at the head keeping their order: the first of them runs
    /// next, all of them before anything that was queued already.
    pub fn prepend_many(&self, items: Vec<WorkItem>) {
        if items.is_empty() {
            return;
        }
        {
            let mut queued = self.items.lock();
            for item in items.into_iter().rev() {
                queued.push_front(item);
            }
        }
        self.wake.notify_one();
    }

    pub fn pop_head(&self) -> Option<WorkItem> {
        let mut items = self.items.lock();
        let item = items.deque.pop_front()?;
        items.untrack(&item);
        Some(item)
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Drops everything queued and leaves `item` as the only task.
    pub fn replace_all_with(&self, item: WorkItem) {
        {
            let mut items = self.items.lock();
            items.clear();
            items.push_back(item);
        }
        self.wake.notify_one();
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().deque.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().deque.len()
    }

    /// Kind and path of every queued item, head first.
    pub fn peek_kinds(&self) -> Vec<(WorkKind, String)> {
        self.items
            .lock()
            .deque
            .iter()
            .map(|item| (item.kind, item.relative_path.clone()))
            .collect()
    }

    /// Resolves on the next insertion (or immediately if one happened while
    /// nobody was waiting).
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Wakes the worker without adding work.
    pub fn wake(&self) {
        self.wake.notify_one();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

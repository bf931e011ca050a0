//! Local mirror of the server-owned notification list.
//!
//! Pure state, no I/O. The unread count is derived from the items after every
//! mutation, so it can never drift from `is_read` or go negative.

use crate::models::Notification;

/// Ids whose `is_read` flag was flipped by an optimistic mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSnapshot {
    ids: Vec<String>,
}

impl ReadSnapshot {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Copy without the ids matching `skip`.
    pub fn without(&self, skip: impl Fn(&str) -> bool) -> Self {
        Self {
            ids: self.ids.iter().filter(|id| !skip(id)).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationMirror {
    items: Vec<Notification>,
    unread: usize,
}

impl NotificationMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }

    /// Replace everything with a fetched list, keeping the server's order.
    pub fn replace_all(&mut self, items: Vec<Notification>) {
        self.items = items;
        self.recount();
    }

    /// Merge a pushed notification. Known ids are updated in place; new ids are
    /// prepended. The list is never re-sorted.
    pub fn apply_push(&mut self, incoming: Notification) -> PushOutcome {
        match self.position(&incoming.id) {
            Some(idx) => {
                let was_read = self.items[idx].is_read;
                self.items[idx] = incoming;
                // read wins over unread
                self.items[idx].is_read |= was_read;
                self.recount();
                PushOutcome::Updated
            }
            None => {
                self.items.insert(0, incoming);
                self.recount();
                PushOutcome::Inserted
            }
        }
    }

    /// Replace an existing item with a server-confirmed record. Absent ids are
    /// ignored; confirmation never inserts.
    pub fn apply_confirmed(&mut self, confirmed: Notification) -> bool {
        match self.position(&confirmed.id) {
            Some(idx) => {
                let was_read = self.items[idx].is_read;
                self.items[idx] = confirmed;
                self.items[idx].is_read |= was_read;
                self.recount();
                true
            }
            None => false,
        }
    }

    /// Optimistically mark one item read. Returns `None` when the id is absent
    /// or already read, so repeated calls decrement the count only once.
    pub fn mark_read(&mut self, id: &str) -> Option<ReadSnapshot> {
        let item = self.items.iter_mut().find(|n| n.id == id)?;
        if item.is_read {
            return None;
        }
        item.is_read = true;
        self.recount();
        Some(ReadSnapshot {
            ids: vec![id.to_string()],
        })
    }

    /// Optimistically mark every item read.
    pub fn mark_all_read(&mut self) -> ReadSnapshot {
        let mut ids = Vec::new();
        for item in self.items.iter_mut().filter(|n| !n.is_read) {
            item.is_read = true;
            ids.push(item.id.clone());
        }
        self.recount();
        ReadSnapshot { ids }
    }

    /// Undo an optimistic mutation for the ids that are still present.
    pub fn rollback(&mut self, snapshot: &ReadSnapshot) {
        for id in &snapshot.ids {
            if let Some(item) = self.items.iter_mut().find(|n| &n.id == id) {
                item.is_read = false;
            }
        }
        self.recount();
    }

    fn recount(&mut self) {
        self.unread = self.items.iter().filter(|n| !n.is_read).count();
        debug_assert!(self.unread <= self.items.len());
    }
}

//! Process-wide session admission control.

use parking_lot::Mutex;
use std::collections::HashSet;
use uuid::Uuid;

/// Caps the number of simultaneously admitted sessions.
///
/// Admission never queues: a rejected attempt is reported to the requester
/// immediately so the chat channel sees a "busy" response instead of a stall.
/// Constructed once at process start and shared by reference.
#[derive(Debug)]
pub struct ConcurrencyGate {
    limit: usize,
    admitted: Mutex<HashSet<Uuid>>,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            admitted: Mutex::new(HashSet::new()),
        }
    }

    /// Admit `id` if a slot is free. Returns false without blocking when
    /// the gate is saturated.
    pub fn try_admit(&self, id: Uuid) -> bool {
        let mut admitted = self.admitted.lock();
        if admitted.len() >= self.limit {
            return false;
        }
        admitted.insert(id)
    }

    /// Release the slot held by `id`. Unknown ids are ignored.
    pub fn release(&self, id: &Uuid) {
        self.admitted.lock().remove(id);
    }

    /// Number of currently admitted sessions.
    pub fn active(&self) -> usize {
        self.admitted.lock().len()
    }
}

//! 16-bit session ID allocator (the agent-side extranonce1), ported from
//! `StratumSessionManager.go`'s `sessionIDManager`.

use std::sync::Mutex;

/// Reserved: `0xFFFF` is never handed out.
pub type SessionId = u16;

struct Inner {
    /// One bit per id in `0..=max_id`; `true` means allocated.
    bitmap: Vec<bool>,
    cursor: usize,
    capacity: usize,
}

/// Hands out and reclaims [`SessionId`]s in `[0, max_id]`. Safe under
/// concurrent callers: `SessionManager`'s accept loop allocates from many
/// concurrently spawned connection tasks.
pub struct SessionIdAllocator {
    inner: Mutex<Inner>,
}

impl SessionIdAllocator {
    /// `max_id` must be `<= 0xFFFE`; capacity is `max_id + 1`.
    pub fn new(max_id: SessionId) -> Self {
        assert!(max_id <= 0xFFFE, "max_id must leave 0xFFFF reserved");
        let capacity = max_id as usize + 1;
        SessionIdAllocator {
            inner: Mutex::new(Inner {
                bitmap: vec![false; capacity],
                cursor: 0,
                capacity,
            }),
        }
    }

    /// Scans forward from the cursor, wrapping once. Worst case O(capacity),
    /// amortized O(1) under typical alloc/release churn.
    pub fn alloc(&self) -> Option<SessionId> {
        let mut inner = self.inner.lock().expect("session id allocator poisoned");
        let capacity = inner.capacity;
        for offset in 0..capacity {
            let idx = (inner.cursor + offset) % capacity;
            if !inner.bitmap[idx] {
                inner.bitmap[idx] = true;
                inner.cursor = (idx + 1) % capacity;
                return Some(idx as SessionId);
            }
        }
        None
    }

    /// Releasing an unallocated or out-of-range id is a no-op, not fatal.
    pub fn release(&self, id: SessionId) {
        let mut inner = self.inner.lock().expect("session id allocator poisoned");
        if let Some(slot) = inner.bitmap.get_mut(id as usize) {
            *slot = false;
        }
    }
}

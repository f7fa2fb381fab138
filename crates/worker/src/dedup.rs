//! Request de-duplication by [`StageInvocation::id`] (§4.5, §8
//! "Deduplication").
//!
//! Grounded on `worker.py`'s `RequestBuffer`: at most one buffered record
//! survives per id. A later try with a strictly higher `call_cnt` replaces
//! the buffered one; an executor is spawned only the first time an id is
//! seen, never re-spawned on a replace, exactly mirroring
//! `try_push`/`thread_pool.submit` only firing from the "no previous entry"
//! branch. The executor always [`RequestBuffer::pop`]s by id once it starts,
//! so it observes whatever the latest buffered `call_cnt` is at that moment.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::invocation::StageInvocation;

/// What the caller should do after a [`RequestBuffer::try_push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// No previous invocation was queued for this id; spawn the executor.
    Spawn,
    /// A previous invocation was queued and has now been replaced with a
    /// newer try; an executor is already running or about to run for it.
    Replaced,
    /// An equal-or-lower `call_cnt` is already queued; this one is dropped.
    Ignored,
}

#[derive(Default)]
pub struct RequestBuffer {
    queued: Mutex<HashMap<String, StageInvocation>>,
}

impl RequestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_push(&self, invocation: StageInvocation) -> PushOutcome {
        let mut queued = self.queued.lock();
        match queued.get(&invocation.id) {
            Some(existing) if existing.call_cnt < invocation.call_cnt => {
                queued.insert(invocation.id.clone(), invocation);
                PushOutcome::Replaced
            }
            Some(_) => PushOutcome::Ignored,
            None => {
                queued.insert(invocation.id.clone(), invocation);
                PushOutcome::Spawn
            }
        }
    }

    /// Remove and return the invocation currently queued for `id`. Called
    /// once by the spawned executor, never by the HTTP handler.
    pub fn pop(&self, id: &str) -> Option<StageInvocation> {
        self.queued.lock().remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn invocation(id: &str, call_cnt: u32) -> StageInvocation {
        let mut inv = StageInvocation::new(
            "ns",
            "add",
            Map::new(),
            crate::invocation::TransportMode::Auto,
            serde_json::Value::Null,
            10.0,
            0.0,
        );
        inv.id = id.to_string();
        inv.call_cnt = call_cnt;
        inv
    }

    #[test]
    fn first_push_for_an_id_spawns() {
        let buf = RequestBuffer::new();
        assert_eq!(buf.try_push(invocation("a", 1)), PushOutcome::Spawn);
    }

    #[test]
    fn higher_call_cnt_replaces_without_spawning() {
        let buf = RequestBuffer::new();
        assert_eq!(buf.try_push(invocation("a", 1)), PushOutcome::Spawn);
        assert_eq!(buf.try_push(invocation("a", 2)), PushOutcome::Replaced);

        let popped = buf.pop("a").unwrap();
        assert_eq!(popped.call_cnt, 2, "pop must observe the highest call_cnt pushed");
    }

    #[test]
    fn equal_or_lower_call_cnt_is_ignored() {
        let buf = RequestBuffer::new();
        assert_eq!(buf.try_push(invocation("a", 2)), PushOutcome::Spawn);
        assert_eq!(buf.try_push(invocation("a", 2)), PushOutcome::Ignored);
        assert_eq!(buf.try_push(invocation("a", 1)), PushOutcome::Ignored);

        let popped = buf.pop("a").unwrap();
        assert_eq!(popped.call_cnt, 2);
    }

    #[test]
    fn pop_without_a_prior_push_is_none() {
        let buf = RequestBuffer::new();
        assert!(buf.pop("ghost").is_none());
    }
}

//! Ordered container of pending/current/history scripts.
//!
//! The Queue is the only place pending-order and history-bound policy live;
//! the Engine is the only caller that mutates it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{Error, Result, ScriptIndex};

use super::model::ScriptInfo;

/// Where to insert or move a script relative to the `pending` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Location {
    First,
    Last,
    Before,
    After,
}

/// Holds `pending`, `current`, and a bounded, newest-first `history`.
///
/// See DESIGN.md for the newest-first history ordering decision.
#[derive(Debug)]
pub struct Queue {
    pending: VecDeque<ScriptInfo>,
    current: Option<ScriptInfo>,
    history: VecDeque<ScriptInfo>,
    history_bound: usize,
}

impl Queue {
    pub fn new(history_bound: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            history: VecDeque::new(),
            history_bound,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScriptInfo> {
        self.pending.iter()
    }

    pub fn current(&self) -> Option<&ScriptInfo> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut ScriptInfo> {
        self.current.as_mut()
    }

    pub fn history(&self) -> impl Iterator<Item = &ScriptInfo> {
        self.history.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn position_in_pending(&self, index: ScriptIndex) -> Option<usize> {
        self.pending.iter().position(|s| s.index == index)
    }

    /// I3: whether `index` is currently live anywhere in the queue.
    pub fn is_live(&self, index: ScriptIndex) -> bool {
        self.position_in_pending(index).is_some()
            || self.current.as_ref().map(|s| s.index) == Some(index)
            || self.history.iter().any(|s| s.index == index)
    }

    /// `find(index, search_history)`.
    pub fn find(&self, index: ScriptIndex, search_history: bool) -> Option<&ScriptInfo> {
        if let Some(pos) = self.position_in_pending(index) {
            return self.pending.get(pos);
        }
        if self.current.as_ref().map(|s| s.index) == Some(index) {
            return self.current.as_ref();
        }
        if search_history {
            return self.history.iter().find(|s| s.index == index);
        }
        None
    }

    pub fn find_mut(&mut self, index: ScriptIndex) -> Option<&mut ScriptInfo> {
        if let Some(pos) = self.position_in_pending(index) {
            return self.pending.get_mut(pos);
        }
        if self.current.as_ref().map(|s| s.index) == Some(index) {
            return self.current.as_mut();
        }
        self.history.iter_mut().find(|s| s.index == index)
    }

    /// Check whether `insert`/`move_script` would accept this
    /// `location`/`anchor_index` pair, without mutating the queue. Lets a
    /// caller validate placement before doing anything irreversible (e.g.
    /// spawning a subprocess) that an insert failure would otherwise orphan.
    pub fn validate_insert(&self, location: Location, anchor_index: Option<ScriptIndex>) -> Result<()> {
        self.resolve_insert_position(location, anchor_index).map(|_| ())
    }

    /// `insert(info, location, anchor_index)`.
    pub fn insert(
        &mut self,
        info: ScriptInfo,
        location: Location,
        anchor_index: Option<ScriptIndex>,
    ) -> Result<()> {
        let pos = self.resolve_insert_position(location, anchor_index)?;
        self.pending.insert(pos, info);
        Ok(())
    }

    fn resolve_insert_position(
        &self,
        location: Location,
        anchor_index: Option<ScriptIndex>,
    ) -> Result<usize> {
        match location {
            Location::First => Ok(0),
            Location::Last => Ok(self.pending.len()),
            Location::Before | Location::After => {
                let anchor = anchor_index.ok_or_else(|| {
                    Error::location_invalid("BEFORE/AFTER requires an anchor index")
                })?;
                let anchor_pos = self.position_in_pending(anchor).ok_or_else(|| {
                    Error::unknown_index(anchor.get())
                })?;
                Ok(match location {
                    Location::Before => anchor_pos,
                    Location::After => anchor_pos + 1,
                    _ => unreachable!(),
                })
            }
        }
    }

    /// `move(index, location, anchor_index)`. Moving a script relative to
    /// itself is a documented no-op: the script is removed and reinserted at
    /// the same position, leaving `pending` unchanged, but the caller is
    /// still expected to republish the queue event.
    pub fn move_script(
        &mut self,
        index: ScriptIndex,
        location: Location,
        anchor_index: Option<ScriptIndex>,
    ) -> Result<()> {
        let pos = self
            .position_in_pending(index)
            .ok_or_else(|| Error::not_queued(index.get()))?;

        // Resolve the target position against the queue *without* the
        // script being moved, so "move before itself" and "move after
        // itself" resolve to a stable, well-defined position instead of an
        // off-by-one against a list that still contains it.
        let info = self.pending.remove(pos).expect("pos was just located");
        let resolved = self.resolve_insert_position(location, anchor_index);
        let target = match resolved {
            Ok(target) => target,
            Err(err) => {
                // Put it back where it came from before propagating the error.
                self.pending.insert(pos, info);
                return Err(err);
            }
        };
        self.pending.insert(target, info);
        Ok(())
    }

    /// `remove(index)` — `pending` only.
    pub fn remove(&mut self, index: ScriptIndex) -> Result<ScriptInfo> {
        let pos = self
            .position_in_pending(index)
            .ok_or_else(|| Error::not_queued(index.get()))?;
        Ok(self.pending.remove(pos).expect("pos was just located"))
    }

    /// `promote()` — I7: only when `current` is empty and the head of
    /// `pending` is ready.
    pub fn promote(&mut self) -> Option<ScriptInfo> {
        if self.current.is_some() {
            return None;
        }
        let head_ready = self.pending.front().is_some_and(|s| s.is_promotable());
        if !head_ready {
            return None;
        }
        let info = self.pending.pop_front()?;
        self.current = Some(info.clone());
        Some(info)
    }

    /// `retire(index)` — move `current` to `history` if its index matches;
    /// trims the oldest history entry once the bound is exceeded.
    pub fn retire(&mut self, index: ScriptIndex) -> Result<()> {
        match &self.current {
            Some(info) if info.index == index => {}
            Some(_) | None => return Err(Error::unknown_index(index.get())),
        }
        let info = self.current.take().expect("checked above");
        self.push_history(info);
        Ok(())
    }

    /// Move a still-`pending` script straight into `history` — used when a
    /// load/configure timeout forces it to terminal `FAILED` before it ever
    /// reached `current`. Fails `NotQueued` if `index` isn't in `pending`.
    pub fn fail_pending(&mut self, index: ScriptIndex) -> Result<()> {
        let info = self.remove(index)?;
        self.push_history(info);
        Ok(())
    }

    fn push_history(&mut self, info: ScriptInfo) {
        self.history.push_front(info);
        while self.history.len() > self.history_bound {
            self.history.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::ScriptKind;
    use crate::types::CmdId;

    fn script(index: i32) -> ScriptInfo {
        ScriptInfo::new(
            ScriptIndex::new(index),
            CmdId::new(),
            ScriptKind::Standard,
            "s.py".to_string(),
            String::new(),
            "d".to_string(),
            0.0,
        )
    }

    #[test]
    fn insert_first_and_last_preserve_order() {
        let mut q = Queue::new(100);
        q.insert(script(1), Location::Last, None).unwrap();
        q.insert(script(2), Location::Last, None).unwrap();
        q.insert(script(0), Location::First, None).unwrap();
        let order: Vec<i32> = q.pending().map(|s| s.index.get()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn insert_before_after_resolve_relative_to_anchor() {
        let mut q = Queue::new(100);
        q.insert(script(1), Location::Last, None).unwrap();
        q.insert(script(3), Location::Last, None).unwrap();
        q.insert(script(2), Location::Before, Some(ScriptIndex::new(3)))
            .unwrap();
        let order: Vec<i32> = q.pending().map(|s| s.index.get()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn insert_before_unknown_anchor_fails() {
        let mut q = Queue::new(100);
        let err = q
            .insert(script(1), Location::Before, Some(ScriptIndex::new(99)))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownIndex(99)));
    }

    #[test]
    fn validate_insert_rejects_without_mutating() {
        let q = Queue::new(100);
        let err = q
            .validate_insert(Location::Before, Some(ScriptIndex::new(99)))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownIndex(99)));
        assert_eq!(q.pending_len(), 0);

        assert!(q.validate_insert(Location::Last, None).is_ok());
    }

    #[test]
    fn move_before_itself_is_a_no_op() {
        let mut q = Queue::new(100);
        q.insert(script(2), Location::Last, None).unwrap();
        q.insert(script(3), Location::Last, None).unwrap();
        q.insert(script(4), Location::Last, None).unwrap();

        q.move_script(ScriptIndex::new(3), Location::Before, Some(ScriptIndex::new(3)))
            .unwrap();

        let order: Vec<i32> = q.pending().map(|s| s.index.get()).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn move_not_queued_fails() {
        let mut q = Queue::new(100);
        let err = q
            .move_script(ScriptIndex::new(5), Location::Last, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotQueued(5)));
    }

    #[test]
    fn promote_requires_ready_head() {
        let mut q = Queue::new(100);
        let mut s = script(1);
        s.process_state = super::super::model::ProcessState::Loaded;
        s.script_state = super::super::model::ScriptState::Configured;
        q.insert(s, Location::Last, None).unwrap();

        let promoted = q.promote().unwrap();
        assert_eq!(promoted.index.get(), 1);
        assert!(q.current().is_some());
        assert_eq!(q.pending_len(), 0);
    }

    #[test]
    fn promote_does_nothing_when_current_occupied() {
        let mut q = Queue::new(100);
        let mut running = script(1);
        running.process_state = super::super::model::ProcessState::Running;
        q.current = Some(running);

        let mut ready = script(2);
        ready.process_state = super::super::model::ProcessState::Loaded;
        ready.script_state = super::super::model::ScriptState::Configured;
        q.insert(ready, Location::Last, None).unwrap();

        assert!(q.promote().is_none());
    }

    #[test]
    fn retire_moves_current_to_history_newest_first() {
        let mut q = Queue::new(100);
        let mut first = script(1);
        first.process_state = super::super::model::ProcessState::Running;
        q.current = Some(first);
        q.retire(ScriptIndex::new(1)).unwrap();

        let mut second = script(2);
        second.process_state = super::super::model::ProcessState::Running;
        q.current = Some(second);
        q.retire(ScriptIndex::new(2)).unwrap();

        let order: Vec<i32> = q.history().map(|s| s.index.get()).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn history_is_trimmed_at_bound() {
        let mut q = Queue::new(2);
        for i in 0..5 {
            let mut s = script(i);
            s.process_state = super::super::model::ProcessState::Running;
            q.current = Some(s);
            q.retire(ScriptIndex::new(i)).unwrap();
        }
        assert_eq!(q.history_len(), 2);
        let order: Vec<i32> = q.history().map(|s| s.index.get()).collect();
        assert_eq!(order, vec![4, 3]);
    }

    #[test]
    fn fail_pending_moves_a_queued_script_straight_to_history() {
        let mut q = Queue::new(100);
        q.insert(script(1), Location::Last, None).unwrap();
        q.insert(script(2), Location::Last, None).unwrap();

        q.fail_pending(ScriptIndex::new(1)).unwrap();

        assert_eq!(q.pending_len(), 1);
        let order: Vec<i32> = q.history().map(|s| s.index.get()).collect();
        assert_eq!(order, vec![1]);
    }

    #[test]
    fn fail_pending_not_queued_fails() {
        let mut q = Queue::new(100);
        let err = q.fail_pending(ScriptIndex::new(9)).unwrap_err();
        assert!(matches!(err, Error::NotQueued(9)));
    }
}

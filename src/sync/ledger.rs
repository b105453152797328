//! Command ledger
//!
//! Every store mutation is recorded with whether its local half was applied
//! and whether the backend confirmed it. Failed entries keep the error and an
//! undo so the reconciler can roll back or retry instead of letting
//! the local graph silently diverge.

use emath::Pos2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use super::error::ErrorInfo;
use crate::model::{GraphOp, NodeField, NodePatch, Revert};

/// Entries kept before the oldest settled ones are dropped
pub const DEFAULT_CAPACITY: usize = 256;

/// What to do with the local half of a command whose remote half failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReconcilePolicy {
    /// Leave the optimistic local state in place
    #[default]
    Keep,
    /// Put back the fields the failed command wrote
    Rollback,
    /// Re-send the remote leg, then keep
    Retry { max_attempts: u32 },
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "keep" => Ok(ReconcilePolicy::Keep),
            "rollback" => Ok(ReconcilePolicy::Rollback),
            _ => match s.strip_prefix("retry:") {
                Some(n) => n
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(|max_attempts| ReconcilePolicy::Retry { max_attempts })
                    .ok_or_else(|| format!("invalid retry count '{}'", n)),
                None => Err(format!("expected keep, rollback or retry:<n>, got '{}'", s)),
            },
        }
    }
}

impl fmt::Display for ReconcilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcilePolicy::Keep => write!(f, "keep"),
            ReconcilePolicy::Rollback => write!(f, "rollback"),
            ReconcilePolicy::Retry { max_attempts } => write!(f, "retry:{}", max_attempts),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    CreateQuest,
    LoadQuest { quest_id: String },
    DeleteQuest { quest_id: String },
    Generate,
    Breakdown { node_id: String },
    Expand { node_id: String },
    Complete { node_id: String },
    ConsultAi,
    UpdatePosition { node_id: String, position: Pos2 },
    UpdateNode { node_id: String, patch: NodePatch },
    DeleteNode { node_id: String },
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::CreateQuest => "create_quest",
            CommandKind::LoadQuest { .. } => "load_quest",
            CommandKind::DeleteQuest { .. } => "delete_quest",
            CommandKind::Generate => "generate_nodes",
            CommandKind::Breakdown { .. } => "breakdown_node",
            CommandKind::Expand { .. } => "expand_node",
            CommandKind::Complete { .. } => "complete_node",
            CommandKind::ConsultAi => "consult_ai",
            CommandKind::UpdatePosition { .. } => "update_node_position",
            CommandKind::UpdateNode { .. } => "update_node",
            CommandKind::DeleteNode { .. } => "delete_node",
        }
    }

    /// Remote legs that can be re-sent without extra side effects
    pub fn is_replayable(&self) -> bool {
        matches!(
            self,
            CommandKind::UpdatePosition { .. } | CommandKind::UpdateNode { .. }
        )
    }
}

/// Ops that put back what a local apply changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Undo {
    ops: Vec<GraphOp>,
}

impl Undo {
    /// Put back the fields a command wrote
    pub fn revert(reverts: Vec<Revert>) -> Self {
        if reverts.is_empty() {
            return Self::default();
        }
        Self {
            ops: vec![GraphOp::Revert(reverts)],
        }
    }

    /// Move a node back from `written` to `previous`, unless it moved again
    pub fn position(node_id: impl Into<String>, previous: Pos2, written: Pos2) -> Self {
        Self::revert(vec![Revert::node(
            node_id,
            NodeField::Position(written),
            NodeField::Position(previous),
        )])
    }

    pub fn ops(&self) -> &[GraphOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<GraphOp> {
        self.ops
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandEntry {
    pub seq: u64,
    pub kind: CommandKind,
    pub local_applied: bool,
    pub remote_confirmed: bool,
    /// Remote attempts so far
    pub attempts: u32,
    pub failure: Option<ErrorInfo>,
    pub undo: Option<Undo>,
    pub rolled_back: bool,
}

impl CommandEntry {
    /// Neither pending nor failed
    pub fn is_settled(&self) -> bool {
        self.remote_confirmed || self.rolled_back
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some() && !self.remote_confirmed
    }
}

/// Bounded log of store commands
#[derive(Debug, Clone)]
pub struct CommandLedger {
    next_seq: u64,
    capacity: usize,
    entries: VecDeque<CommandEntry>,
}

impl Default for CommandLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl CommandLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_seq: 1,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn record(&mut self, kind: CommandKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(CommandEntry {
            seq,
            kind,
            local_applied: false,
            remote_confirmed: false,
            attempts: 0,
            failure: None,
            undo: None,
            rolled_back: false,
        });
        self.evict();
        seq
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            match self.entries.iter().position(CommandEntry::is_settled) {
                Some(index) => {
                    self.entries.remove(index);
                }
                None => {
                    self.entries.pop_front();
                }
            }
        }
    }

    pub fn get(&self, seq: u64) -> Option<&CommandEntry> {
        self.entries.iter().find(|e| e.seq == seq)
    }

    fn get_mut(&mut self, seq: u64) -> Option<&mut CommandEntry> {
        self.entries.iter_mut().find(|e| e.seq == seq)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mark_local(&mut self, seq: u64, undo: Option<Undo>) {
        if let Some(entry) = self.get_mut(seq) {
            entry.local_applied = true;
            entry.undo = undo;
        }
    }

    /// Count a remote attempt
    pub fn attempt(&mut self, seq: u64) -> u32 {
        match self.get_mut(seq) {
            Some(entry) => {
                entry.attempts += 1;
                entry.attempts
            }
            None => 0,
        }
    }

    pub fn confirm(&mut self, seq: u64) {
        if let Some(entry) = self.get_mut(seq) {
            entry.remote_confirmed = true;
            entry.failure = None;
        }
    }

    pub fn fail(&mut self, seq: u64, failure: ErrorInfo) {
        if let Some(entry) = self.get_mut(seq) {
            entry.failure = Some(failure);
        }
    }

    /// Take the undo of a failed command and mark it rolled back
    pub fn take_rollback(&mut self, seq: u64) -> Option<Undo> {
        let entry = self.get_mut(seq)?;
        if !entry.local_applied || entry.rolled_back {
            return None;
        }
        let undo = entry.undo.take()?;
        entry.rolled_back = true;
        Some(undo)
    }

    /// Failed commands whose local half is still in place
    pub fn failed(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_failed() && !e.rolled_back)
    }

    /// Commands applied locally that the backend has not confirmed
    pub fn unconfirmed(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries
            .iter()
            .filter(|e| e.local_applied && !e.remote_confirmed && !e.rolled_back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::error::SyncError;

    #[test]
    fn test_policy_parse() {
        assert_eq!("keep".parse::<ReconcilePolicy>(), Ok(ReconcilePolicy::Keep));
        assert_eq!(" Rollback ".parse::<ReconcilePolicy>(), Ok(ReconcilePolicy::Rollback));
        assert_eq!(
            "retry:3".parse::<ReconcilePolicy>(),
            Ok(ReconcilePolicy::Retry { max_attempts: 3 })
        );
        assert!("retry:0".parse::<ReconcilePolicy>().is_err());
        assert!("sometimes".parse::<ReconcilePolicy>().is_err());
        assert_eq!(ReconcilePolicy::Retry { max_attempts: 2 }.to_string(), "retry:2");
    }

    #[test]
    fn test_lifecycle_of_failed_entry() {
        let mut ledger = CommandLedger::default();
        let seq = ledger.record(CommandKind::Complete { node_id: "n".into() });
        ledger.mark_local(seq, Some(Undo::default()));
        assert_eq!(ledger.attempt(seq), 1);
        ledger.fail(seq, SyncError::NoResponse.to_info());
        assert_eq!(ledger.failed().count(), 1);

        assert!(ledger.take_rollback(seq).is_some());
        assert!(ledger.take_rollback(seq).is_none());
        assert_eq!(ledger.failed().count(), 0);
        assert!(ledger.get(seq).unwrap().is_settled());
    }

    #[test]
    fn test_capacity_evicts_settled_first() {
        let mut ledger = CommandLedger::with_capacity(2);
        let pending = ledger.record(CommandKind::Generate);
        let done = ledger.record(CommandKind::ConsultAi);
        ledger.confirm(done);
        ledger.record(CommandKind::ConsultAi);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.get(pending).is_some());
        assert!(ledger.get(done).is_none());
    }
}

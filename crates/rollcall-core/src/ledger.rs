//! Session-scoped attendance state.
//!
//! The whole roster sits behind one mutex and is only reachable through
//! whole-set operations, so a reset is never observed half-applied.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Absent,
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceEntry {
    pub name: String,
    pub state: Presence,
    /// When the entry first became present this session.
    pub marked_at: Option<DateTime<Local>>,
}

/// Point-in-time copy of the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Starts at 1 with the first reset.
    pub period: u32,
    pub started_at: DateTime<Local>,
    pub entries: Vec<AttendanceEntry>,
}

struct Roster {
    period: u32,
    started_at: DateTime<Local>,
    entries: Vec<AttendanceEntry>,
    positions: HashMap<String, usize>,
}

pub struct AttendanceLedger {
    roster: Mutex<Roster>,
}

impl Default for AttendanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AttendanceLedger {
    /// An empty ledger before any session has started.
    pub fn new() -> Self {
        Self {
            roster: Mutex::new(Roster {
                period: 0,
                started_at: Local::now(),
                entries: Vec::new(),
                positions: HashMap::new(),
            }),
        }
    }

    fn roster(&self) -> MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session with every name absent, in the given order.
    ///
    /// Repeated names keep their first position.
    pub fn reset<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = Vec::new();
        let mut positions = HashMap::new();
        for name in names {
            let name = name.into();
            if positions.contains_key(&name) {
                continue;
            }
            positions.insert(name.clone(), entries.len());
            entries.push(AttendanceEntry {
                name,
                state: Presence::Absent,
                marked_at: None,
            });
        }

        let mut roster = self.roster();
        roster.period += 1;
        roster.started_at = Local::now();
        roster.entries = entries;
        roster.positions = positions;
        tracing::info!(period = roster.period, entries = roster.entries.len(), "attendance reset");
    }

    /// Mark `name` present. Returns true only when the entry changed.
    ///
    /// Names outside the current roster are ignored.
    pub fn mark_present(&self, name: &str) -> bool {
        let mut roster = self.roster();
        let Some(&idx) = roster.positions.get(name) else {
            tracing::debug!(name, "ignoring mark for name outside the current roster");
            return false;
        };
        let entry = &mut roster.entries[idx];
        if entry.state == Presence::Present {
            return false;
        }
        entry.state = Presence::Present;
        entry.marked_at = Some(Local::now());
        tracing::info!(name, "marked present");
        true
    }

    /// Entries in roster order.
    pub fn snapshot(&self) -> Vec<AttendanceEntry> {
        self.roster().entries.clone()
    }

    pub fn session(&self) -> SessionSnapshot {
        let roster = self.roster();
        SessionSnapshot {
            period: roster.period,
            started_at: roster.started_at,
            entries: roster.entries.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.roster().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster().entries.is_empty()
    }
}

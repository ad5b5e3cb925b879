// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only audit trail.
//!
//! Every state-changing operation appends one entry after its row
//! mutation commits. The trail is read for audit only; the state
//! machine never consults it.

use crate::base::UserId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

/// One audit entry. Entries are never updated or deleted.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Acting participant, or [`crate::SYSTEM_ACTOR`] for system sweeps.
    pub initiator: UserId,
    /// Action tag, e.g. `deal_created`.
    pub action: &'static str,
    /// Structured action context.
    pub detail: Value,
    pub at: DateTime<Utc>,
}

/// In-process append-only event log.
#[derive(Debug, Default)]
pub struct EventLog {
    entries: RwLock<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Appends one entry. Infallible; the write lock is held only for
    /// the push itself.
    pub fn append(&self, initiator: UserId, action: &'static str, detail: Value, at: DateTime<Utc>) {
        self.entries.write().push(EventRecord {
            initiator,
            action,
            detail,
            at,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copies out the full trail, oldest first.
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.entries.read().clone()
    }

    /// Copies out the most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<EventRecord> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }
}

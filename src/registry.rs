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

//! Participant registry.
//!
//! Maps external chat identities to internal participant rows with
//! get-or-create semantics: the first contact from a chat id registers
//! it, every later contact resolves to the same row. Rows are never
//! removed.

use crate::base::{ChatId, UserId};
use crate::deal::Currency;
use crate::error::EscrowError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Role assigned at registration.
///
/// Privileged operations check this role on the acting participant,
/// never a fixed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// A registered participant.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub user_id: UserId,
    pub chat_id: ChatId,
    /// Captured at first contact and not refreshed afterwards.
    pub display_name: String,
    pub role: Role,
    pub registered_at: DateTime<Utc>,
    pub wallet_ton: Option<String>,
    pub wallet_btc: Option<String>,
}

impl Participant {
    /// Payout address on file for the given currency.
    pub fn wallet(&self, currency: Currency) -> Option<&str> {
        match currency {
            Currency::Ton => self.wallet_ton.as_deref(),
            Currency::Btc => self.wallet_btc.as_deref(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Concurrent participant store.
///
/// Get-or-create goes through the chat index's entry API, so two
/// concurrent first contacts from the same chat id insert exactly one
/// row and observe the same participant.
#[derive(Debug)]
pub struct Registry {
    participants: DashMap<UserId, Participant>,
    chat_index: DashMap<ChatId, UserId>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            participants: DashMap::new(),
            chat_index: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Resolves a chat identity, registering it on first contact.
    ///
    /// Returns the row and whether it was created by this call.
    pub fn get_or_create(
        &self,
        chat_id: ChatId,
        display_name: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> (Participant, bool) {
        match self.chat_index.entry(chat_id) {
            Entry::Occupied(entry) => {
                let user_id = *entry.get();
                // Rows are never removed, so an indexed id always resolves.
                let row = self
                    .participants
                    .get(&user_id)
                    .expect("indexed participant row must exist");
                (row.clone(), false)
            }
            Entry::Vacant(entry) => {
                let user_id = UserId(self.next_id.fetch_add(1, Ordering::Relaxed));
                let row = Participant {
                    user_id,
                    chat_id,
                    display_name: display_name.to_string(),
                    role,
                    registered_at: now,
                    wallet_ton: None,
                    wallet_btc: None,
                };
                // The row goes in before the index entry, so an indexed
                // id always resolves to a row.
                self.participants.insert(user_id, row.clone());
                entry.insert(user_id);
                (row, true)
            }
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<Participant> {
        self.participants.get(&user_id).map(|row| row.clone())
    }

    pub fn find_by_chat(&self, chat_id: ChatId) -> Option<Participant> {
        let user_id = *self.chat_index.get(&chat_id)?;
        self.get(user_id)
    }

    /// Stores a payout address, validating it against the currency's
    /// address format first.
    pub fn set_wallet(
        &self,
        user_id: UserId,
        currency: Currency,
        address: &str,
    ) -> Result<Participant, EscrowError> {
        if !currency.validate_address(address) {
            return Err(EscrowError::InvalidAddress);
        }
        let mut row = self
            .participants
            .get_mut(&user_id)
            .ok_or(EscrowError::UserNotFound)?;
        match currency {
            Currency::Ton => row.wallet_ton = Some(address.to_string()),
            Currency::Btc => row.wallet_btc = Some(address.to_string()),
        }
        Ok(row.clone())
    }

    /// All participants, newest registration first.
    pub fn all(&self) -> Vec<Participant> {
        let mut rows: Vec<Participant> = self
            .participants
            .iter()
            .map(|row| row.clone())
            .collect();
        rows.sort_by(|a, b| b.user_id.cmp(&a.user_id));
        rows
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

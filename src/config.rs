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

//! Engine configuration.

use crate::base::ChatId;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::time::Duration as StdDuration;

/// Fraction of the deal amount withheld as commission at creation.
pub const DEFAULT_COMMISSION_RATE: Decimal = dec!(0.01);

/// How long a confirmed deal may wait for payment before it expires.
pub const DEFAULT_EXPIRY_HOURS: i64 = 2;

/// How often the background sweeper scans for overdue deals.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Injected engine configuration.
///
/// The admin roster replaces any fixed privileged identity: a participant
/// whose chat id is in the set receives the admin role at registration,
/// and privileged operations check that role, never a hardcoded id.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chat identities granted the admin role at registration.
    pub admins: HashSet<ChatId>,
    /// Time from deal creation until an unpaid deal expires.
    pub deal_expiry: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: StdDuration,
    /// Fraction of the amount stored as commission at creation.
    pub commission_rate: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admins: HashSet::new(),
            deal_expiry: Duration::hours(DEFAULT_EXPIRY_HOURS),
            sweep_interval: StdDuration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            commission_rate: DEFAULT_COMMISSION_RATE,
        }
    }
}

impl EngineConfig {
    /// Adds one chat identity to the admin roster.
    pub fn with_admin(mut self, admin: ChatId) -> Self {
        self.admins.insert(admin);
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.deal_expiry = expiry;
        self
    }

    pub fn with_sweep_interval(mut self, interval: StdDuration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_commission_rate(mut self, rate: Decimal) -> Self {
        self.commission_rate = rate;
        self
    }
}

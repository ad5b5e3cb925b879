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

//! # Garant
//!
//! This library provides an escrow coordination engine for deals between
//! a buyer and a seller, mediated by a privileged admin who verifies the
//! off-band fund transfer. Deals move through a fixed lifecycle of
//! creation, counterparty confirmation, buyer payment, admin
//! verification, and mutual delivery attestation before completing.
//! Cancellation, rejection, and time-based expiry are the side exits.
//!
//! ## Core Components
//!
//! - [`EscrowEngine`]: Central coordinator driving deals through their lifecycle
//! - [`Registry`]: Chat-identity to participant mapping with get-or-create semantics
//! - [`Sweeper`]: Background thread expiring deals that were never paid
//! - [`EventLog`]: Append-only audit trail of every state-changing action
//! - [`Notifier`] / [`ReceiptGenerator`]: Gateway seams for messages and receipts
//! - [`EscrowError`]: Error types for rejected operations
//!
//! ## Example
//!
//! ```
//! use garant_rs::{ChatId, Currency, EngineConfig, EscrowEngine, PartyRole};
//! use rust_decimal_macros::dec;
//!
//! let engine = EscrowEngine::new(EngineConfig::default().with_admin(ChatId(99)));
//!
//! // First contact registers both parties
//! let buyer = engine.register(ChatId(1), "alice");
//! let seller = engine.register(ChatId(2), "bob");
//!
//! // Buyer opens a deal; commission is fixed at creation
//! let deal = engine
//!     .create_deal(buyer.user_id, PartyRole::Buyer, seller.user_id, dec!(100), Currency::Ton)
//!     .unwrap();
//! assert_eq!(deal.commission, dec!(1.00));
//!
//! // Seller accepts, so the buyer now owes payment
//! let deal = engine.confirm_creation(seller.user_id, deal.deal_id).unwrap();
//! assert!(deal.creation_confirmed);
//! ```
//!
//! ## Thread Safety
//!
//! Operations on different deals run in parallel; operations on one deal
//! serialize on its row lock, and every transition re-checks the current
//! status before mutating, so racing callers cannot double-apply a
//! transition.

pub mod base;
pub mod clock;
pub mod config;
pub mod deal;
mod engine;
pub mod error;
mod event_log;
pub mod gateway;
pub mod receipt;
mod registry;
mod sweeper;

pub use base::{ChatId, DealId, SYSTEM_ACTOR, UserId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use deal::{Currency, Deal, DealRecord, DealStatus, DeliveryOutcome, PartyRole};
pub use engine::{CurrencyCount, DealView, EscrowEngine, ProfileView, SystemStats};
pub use error::{EscrowError, GatewayError};
pub use event_log::{EventLog, EventRecord};
pub use gateway::{Notice, Notifier, NullNotifier, TracingNotifier};
pub use receipt::{ReceiptFacts, ReceiptGenerator, TextReceipt};
pub use registry::{Participant, Registry, Role};
pub use sweeper::Sweeper;

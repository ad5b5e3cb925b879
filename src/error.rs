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

//! Error types for escrow operations.

use thiserror::Error;

/// Escrow operation errors.
///
/// Every variant is surfaced to the caller that issued the operation;
/// none of them is fatal to the engine. Authorization is checked before
/// deal state, and both before any mutation, so a rejected call leaves
/// the deal untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Referenced deal does not exist
    #[error("deal not found")]
    DealNotFound,

    /// Referenced participant does not exist
    #[error("participant not found")]
    UserNotFound,

    /// The deal's current state does not permit the requested transition
    #[error("deal state does not permit this action")]
    IllegalTransition,

    /// The actor is not the required party or lacks the admin role
    #[error("actor is not authorized for this action")]
    Unauthorized,

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Buyer and seller would be the same participant
    #[error("buyer and seller must be different participants")]
    SelfDeal,

    /// Payout address failed per-currency validation
    #[error("payout address failed validation")]
    InvalidAddress,

    /// A seller-side deal requires a payout address on file
    #[error("seller has no payout address for this currency")]
    SellerWalletNotSet,
}

/// Failure reported by a messaging or receipt collaborator.
///
/// Gateway failures never abort a committed transition: the engine logs
/// them per recipient and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("gateway unavailable: {0}")]
pub struct GatewayError(pub String);

impl GatewayError {
    pub fn new(reason: impl Into<String>) -> Self {
        GatewayError(reason.into())
    }
}

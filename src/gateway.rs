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

//! Messaging gateway seam.
//!
//! The engine derives notices from every committed transition and hands
//! them to a [`Notifier`]. Delivery is fire-and-forget: a failure is
//! logged per recipient and never aborts or rolls back the transition
//! that produced it.

use crate::base::{ChatId, DealId};
use crate::deal::Currency;
use crate::error::GatewayError;
use rust_decimal::Decimal;

/// A deal event rendered for delivery to one participant.
///
/// The acting participant receives the operation's return value instead;
/// notices go to the parties affected by someone else's action.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// To the counterparty when a deal is opened.
    DealInvitation {
        deal: DealId,
        from: String,
        amount: Decimal,
        currency: Currency,
    },
    /// To the buyer once the counterparty accepts: where to pay.
    PaymentInstructions {
        deal: DealId,
        amount: Decimal,
        currency: Currency,
        escrow_address: String,
        expires_hours: i64,
    },
    /// To the initiator when the counterparty declines.
    CreationRejected { deal: DealId },
    /// To the admin roster when the buyer reports payment.
    PaymentReview {
        deal: DealId,
        amount: Decimal,
        currency: Currency,
        escrow_address: String,
    },
    /// To the buyer when the admin verifies the transfer.
    PaymentVerified { deal: DealId },
    /// To the seller when the admin verifies the transfer.
    ShipGoods {
        deal: DealId,
        amount: Decimal,
        currency: Currency,
    },
    /// To the buyer when the admin cannot verify the transfer.
    PaymentRejected { deal: DealId },
    /// To the counterparty once both sides confirmed delivery.
    DealCompleted { deal: DealId },
    /// To the counterparty when a party cancels.
    DealCancelled { deal: DealId },
    /// To both parties when an admin force-cancels.
    CancelledByAdmin { deal: DealId },
}

impl Notice {
    /// Human-readable message body.
    pub fn render(&self) -> String {
        match self {
            Notice::DealInvitation {
                deal,
                from,
                amount,
                currency,
            } => format!(
                "{from} invites you to deal #{deal}: {amount} {currency}. Confirm or reject to proceed."
            ),
            Notice::PaymentInstructions {
                deal,
                amount,
                currency,
                escrow_address,
                expires_hours,
            } => format!(
                "Deal #{deal} confirmed. Send {amount} {currency} to {escrow_address} within {expires_hours}h, then report the payment."
            ),
            Notice::CreationRejected { deal } => {
                format!("Deal #{deal} was rejected by the other party.")
            }
            Notice::PaymentReview {
                deal,
                amount,
                currency,
                escrow_address,
            } => format!(
                "Deal #{deal}: buyer reports {amount} {currency} sent to {escrow_address}. Verify the transfer."
            ),
            Notice::PaymentVerified { deal } => {
                format!("Deal #{deal}: payment verified and held in escrow.")
            }
            Notice::ShipGoods {
                deal,
                amount,
                currency,
            } => format!(
                "Deal #{deal}: {amount} {currency} received in escrow. Hand over the goods."
            ),
            Notice::PaymentRejected { deal } => {
                format!("Deal #{deal}: payment could not be verified. Contact support.")
            }
            Notice::DealCompleted { deal } => {
                format!("Deal #{deal} completed. Funds are released to the seller.")
            }
            Notice::DealCancelled { deal } => {
                format!("Deal #{deal} was cancelled by the other party.")
            }
            Notice::CancelledByAdmin { deal } => {
                format!("Deal #{deal} was cancelled by an administrator.")
            }
        }
    }
}

/// Messaging gateway consumed by the engine.
pub trait Notifier: Send + Sync {
    /// Delivers one notice to one recipient.
    fn notify(&self, recipient: ChatId, notice: &Notice) -> Result<(), GatewayError>;

    /// Delivers a generated document, such as a settlement receipt.
    fn deliver_document(
        &self,
        recipient: ChatId,
        filename: &str,
        content: &[u8],
    ) -> Result<(), GatewayError> {
        let _ = (recipient, filename, content);
        Ok(())
    }
}

/// Discards every notice. Used when no gateway is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _recipient: ChatId, _notice: &Notice) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Logs every delivery instead of sending it. Used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, recipient: ChatId, notice: &Notice) -> Result<(), GatewayError> {
        tracing::info!(recipient = recipient.0, "notice: {}", notice.render());
        Ok(())
    }

    fn deliver_document(
        &self,
        recipient: ChatId,
        filename: &str,
        content: &[u8],
    ) -> Result<(), GatewayError> {
        tracing::info!(
            recipient = recipient.0,
            filename,
            bytes = content.len(),
            "document delivered"
        );
        Ok(())
    }
}

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

//! Settlement receipt generation.
//!
//! Invoked only when a deal completes; the rendered document goes to
//! the seller through the gateway. A generation failure is logged and
//! never blocks the completion itself.

use crate::base::{DealId, UserId};
use crate::deal::Currency;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Facts about a completed deal, as rendered into a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptFacts {
    pub deal_id: DealId,
    pub buyer_id: UserId,
    pub buyer_name: String,
    pub seller_id: UserId,
    pub seller_name: String,
    pub amount: Decimal,
    pub currency: Currency,
    /// Seller's payout address on file, if any.
    pub payout_address: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Produces a binary receipt document from completed-deal facts.
pub trait ReceiptGenerator: Send + Sync {
    fn generate(&self, facts: &ReceiptFacts) -> Result<Vec<u8>, GatewayError>;

    /// File name the document is delivered under.
    fn filename(&self, facts: &ReceiptFacts) -> String {
        format!("deal_{}_receipt.txt", facts.deal_id)
    }
}

/// Plain-text settlement receipt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReceipt;

impl ReceiptGenerator for TextReceipt {
    fn generate(&self, facts: &ReceiptFacts) -> Result<Vec<u8>, GatewayError> {
        let mut body = String::new();
        body.push_str("ESCROW SETTLEMENT RECEIPT\n");
        body.push_str("=========================\n\n");
        body.push_str(&format!("Deal:      #{}\n", facts.deal_id));
        body.push_str(&format!(
            "Completed: {}\n\n",
            facts.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        body.push_str(&format!(
            "Buyer:     {} (id {})\n",
            facts.buyer_name, facts.buyer_id
        ));
        body.push_str(&format!(
            "Seller:    {} (id {})\n\n",
            facts.seller_name, facts.seller_id
        ));
        body.push_str(&format!(
            "Amount:    {} {}\n",
            facts.amount,
            facts.currency.code()
        ));
        match &facts.payout_address {
            Some(address) => body.push_str(&format!("Payout to: {address}\n")),
            None => body.push_str("Payout to: (no address on file)\n"),
        }
        body.push_str("\nBoth parties confirmed delivery. Funds are released to the seller.\n");
        Ok(body.into_bytes())
    }
}

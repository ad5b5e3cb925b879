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

//! Deal lifecycle management.
//!
//! Every transition takes the row lock, compares the current status with
//! the status it expects, and only then mutates. The compare step is what
//! serializes racing callers: the loser observes the already-changed
//! status and gets [`EscrowError::IllegalTransition`].
//!
//! # Example
//!
//! ```
//! use garant_rs::DealStatus;
//!
//! assert!(DealStatus::Completed.is_terminal());
//! assert!(!DealStatus::PaymentRejected.is_terminal());
//! ```

use crate::base::{DealId, UserId};
use crate::error::EscrowError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies a deal can be settled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Ton,
    Btc,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Currency; 2] = [Currency::Ton, Currency::Btc];

    /// Ticker symbol used in payment instructions and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ton => "TON",
            Currency::Btc => "BTC",
        }
    }

    /// Parses a ticker symbol, case-insensitive.
    pub fn from_code(code: &str) -> Option<Currency> {
        match code.to_ascii_uppercase().as_str() {
            "TON" => Some(Currency::Ton),
            "BTC" => Some(Currency::Btc),
            _ => None,
        }
    }

    /// Validates a payout address for this currency.
    ///
    /// `TON` addresses start with `UQ`, `BTC` addresses with `bc1`, and
    /// both must be longer than 40 characters.
    pub fn validate_address(&self, address: &str) -> bool {
        let prefix_ok = match self {
            Currency::Ton => address.starts_with("UQ"),
            Currency::Btc => address.starts_with("bc1"),
        };
        prefix_ok && address.len() > 40
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which side of a deal a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Buyer,
    Seller,
}

impl PartyRole {
    /// The opposite side.
    pub fn other(&self) -> PartyRole {
        match self {
            PartyRole::Buyer => PartyRole::Seller,
            PartyRole::Seller => PartyRole::Buyer,
        }
    }

    /// Parses a role tag, case-insensitive.
    pub fn from_code(code: &str) -> Option<PartyRole> {
        match code.to_ascii_lowercase().as_str() {
            "buyer" => Some(PartyRole::Buyer),
            "seller" => Some(PartyRole::Seller),
            _ => None,
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyRole::Buyer => f.write_str("buyer"),
            PartyRole::Seller => f.write_str("seller"),
        }
    }
}

/// Deal lifecycle states.
///
//  AwaitingConfirmation ──confirm──► AwaitingPayment ──payment_sent──► AwaitingAdminConfirmation
//         │                               │                                 │
//         ├─reject──► Cancelled           ├─cancel──► Cancelled             ├─admin confirm──► PaymentReceived
//         └─cancel──► Cancelled           └─sweep───► Expired               └─admin reject───► PaymentRejected
//
//  PaymentReceived ──both parties confirm delivery──► Completed
//
/// `Completed`, `Cancelled`, and `Expired` are terminal. `PaymentRejected`
/// is not: an admin force-cancel can still move it to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    AwaitingConfirmation,
    AwaitingPayment,
    AwaitingAdminConfirmation,
    PaymentReceived,
    PaymentRejected,
    Completed,
    Cancelled,
    Expired,
}

impl DealStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DealStatus::Completed | DealStatus::Cancelled | DealStatus::Expired
        )
    }

    /// States counted as in-progress by statistics and listings.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DealStatus::AwaitingConfirmation
                | DealStatus::AwaitingPayment
                | DealStatus::AwaitingAdminConfirmation
                | DealStatus::PaymentReceived
        )
    }

    /// Storage tag, also accepted by status filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::AwaitingConfirmation => "awaiting_confirmation",
            DealStatus::AwaitingPayment => "awaiting_payment",
            DealStatus::AwaitingAdminConfirmation => "awaiting_admin_confirmation",
            DealStatus::PaymentReceived => "payment_received",
            DealStatus::PaymentRejected => "payment_rejected",
            DealStatus::Completed => "completed",
            DealStatus::Cancelled => "cancelled",
            DealStatus::Expired => "expired",
        }
    }

    /// Parses a storage tag.
    pub fn from_tag(tag: &str) -> Option<DealStatus> {
        match tag {
            "awaiting_confirmation" => Some(DealStatus::AwaitingConfirmation),
            "awaiting_payment" => Some(DealStatus::AwaitingPayment),
            "awaiting_admin_confirmation" => Some(DealStatus::AwaitingAdminConfirmation),
            "payment_received" => Some(DealStatus::PaymentReceived),
            "payment_rejected" => Some(DealStatus::PaymentRejected),
            "completed" => Some(DealStatus::Completed),
            "cancelled" => Some(DealStatus::Cancelled),
            "expired" => Some(DealStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a deal row.
///
/// Cloned out from under the row lock, so it is safe to hold across
/// gateway calls and serialization without blocking transitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealRecord {
    pub deal_id: DealId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Which side opened the deal; only the other side may confirm or
    /// reject creation.
    pub initiated_by: PartyRole,
    pub amount: Decimal,
    pub currency: Currency,
    /// Withheld fraction of `amount`, fixed at creation.
    pub commission: Decimal,
    /// Opaque address the buyer is instructed to pay into.
    pub escrow_address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub creation_confirmed: bool,
    pub buyer_confirmed: bool,
    pub seller_confirmed: bool,
    pub status: DealStatus,
}

impl DealRecord {
    /// The side `user` is on in this deal, if any.
    pub fn role_of(&self, user: UserId) -> Option<PartyRole> {
        if user == self.buyer_id {
            Some(PartyRole::Buyer)
        } else if user == self.seller_id {
            Some(PartyRole::Seller)
        } else {
            None
        }
    }

    /// Participant id on the given side.
    pub fn party(&self, role: PartyRole) -> UserId {
        match role {
            PartyRole::Buyer => self.buyer_id,
            PartyRole::Seller => self.seller_id,
        }
    }

    /// Participant id of the side that opened the deal.
    pub fn initiator(&self) -> UserId {
        self.party(self.initiated_by)
    }

    /// The other party, if `user` is a party at all.
    pub fn counterparty_of(&self, user: UserId) -> Option<UserId> {
        self.role_of(user).map(|role| self.party(role.other()))
    }

    fn delivery_flag(&self, role: PartyRole) -> bool {
        match role {
            PartyRole::Buyer => self.buyer_confirmed,
            PartyRole::Seller => self.seller_confirmed,
        }
    }

    fn set_delivery_flag(&mut self, role: PartyRole) {
        match role {
            PartyRole::Buyer => self.buyer_confirmed = true,
            PartyRole::Seller => self.seller_confirmed = true,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.status != DealStatus::Completed || (self.buyer_confirmed && self.seller_confirmed),
            "Invariant violated: deal {} completed without both delivery confirmations",
            self.deal_id
        );
        debug_assert!(
            self.buyer_id != self.seller_id,
            "Invariant violated: deal {} has the same participant on both sides",
            self.deal_id
        );
    }
}

/// Result of a delivery confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The actor's confirmation was recorded; waiting on the other side.
    Recorded(DealRecord),
    /// Both sides have now confirmed and the deal completed.
    Completed(DealRecord),
    /// The actor had already confirmed; nothing changed.
    AlreadyRecorded(DealRecord),
}

impl DeliveryOutcome {
    /// Snapshot taken when the outcome was produced.
    pub fn record(&self) -> &DealRecord {
        match self {
            DeliveryOutcome::Recorded(record)
            | DeliveryOutcome::Completed(record)
            | DeliveryOutcome::AlreadyRecorded(record) => record,
        }
    }
}

/// Escrow deal row.
///
/// Authorization is checked first, then the status, and only then does
/// the record change; a rejected call leaves the row untouched.
#[derive(Debug)]
pub struct Deal {
    inner: Mutex<DealRecord>,
}

impl Deal {
    const DECIMAL_PRECISION: u32 = 8;

    pub(crate) fn new(record: DealRecord) -> Self {
        Self {
            inner: Mutex::new(record),
        }
    }

    pub fn snapshot(&self) -> DealRecord {
        self.inner.lock().clone()
    }

    pub fn status(&self) -> DealStatus {
        self.inner.lock().status
    }

    /// Counterparty accepts the deal; the buyer now owes payment.
    pub(crate) fn confirm_creation(&self, actor: UserId) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        let role = record.role_of(actor).ok_or(EscrowError::Unauthorized)?;
        if role == record.initiated_by {
            return Err(EscrowError::Unauthorized);
        }
        if record.status != DealStatus::AwaitingConfirmation {
            return Err(EscrowError::IllegalTransition);
        }
        record.creation_confirmed = true;
        record.status = DealStatus::AwaitingPayment;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Counterparty declines the deal.
    pub(crate) fn reject_creation(&self, actor: UserId) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        let role = record.role_of(actor).ok_or(EscrowError::Unauthorized)?;
        if role == record.initiated_by {
            return Err(EscrowError::Unauthorized);
        }
        if record.status != DealStatus::AwaitingConfirmation {
            return Err(EscrowError::IllegalTransition);
        }
        record.status = DealStatus::Cancelled;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Buyer reports that payment went out to the escrow address.
    pub(crate) fn report_payment_sent(&self, actor: UserId) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        if actor != record.buyer_id {
            return Err(EscrowError::Unauthorized);
        }
        if record.status != DealStatus::AwaitingPayment {
            return Err(EscrowError::IllegalTransition);
        }
        record.status = DealStatus::AwaitingAdminConfirmation;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Admin verified the transfer. Admin role is checked by the caller.
    pub(crate) fn confirm_payment(&self) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        if record.status != DealStatus::AwaitingAdminConfirmation {
            return Err(EscrowError::IllegalTransition);
        }
        record.status = DealStatus::PaymentReceived;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Admin could not verify the transfer.
    pub(crate) fn reject_payment(&self) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        if record.status != DealStatus::AwaitingAdminConfirmation {
            return Err(EscrowError::IllegalTransition);
        }
        record.status = DealStatus::PaymentRejected;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Records one side's delivery confirmation; completes when both
    /// sides have confirmed.
    ///
    /// Repeat confirmation from the same side is a no-op, including
    /// after completion. A deal that left `PaymentReceived` any other
    /// way rejects further confirmations.
    pub(crate) fn confirm_delivery(&self, actor: UserId) -> Result<DeliveryOutcome, EscrowError> {
        let mut record = self.inner.lock();
        let role = record.role_of(actor).ok_or(EscrowError::Unauthorized)?;
        if record.delivery_flag(role)
            && matches!(
                record.status,
                DealStatus::PaymentReceived | DealStatus::Completed
            )
        {
            return Ok(DeliveryOutcome::AlreadyRecorded(record.clone()));
        }
        if record.status != DealStatus::PaymentReceived {
            return Err(EscrowError::IllegalTransition);
        }
        record.set_delivery_flag(role);
        if record.buyer_confirmed && record.seller_confirmed {
            record.status = DealStatus::Completed;
            record.assert_invariants();
            return Ok(DeliveryOutcome::Completed(record.clone()));
        }
        record.assert_invariants();
        Ok(DeliveryOutcome::Recorded(record.clone()))
    }

    /// Either party backs out before the admin gets involved.
    pub(crate) fn cancel(&self, actor: UserId) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        record.role_of(actor).ok_or(EscrowError::Unauthorized)?;
        if !matches!(
            record.status,
            DealStatus::AwaitingConfirmation | DealStatus::AwaitingPayment
        ) {
            return Err(EscrowError::IllegalTransition);
        }
        record.status = DealStatus::Cancelled;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Admin cancellation from any non-terminal state. Admin role is
    /// checked by the caller.
    pub(crate) fn force_cancel(&self) -> Result<DealRecord, EscrowError> {
        let mut record = self.inner.lock();
        if record.status.is_terminal() {
            return Err(EscrowError::IllegalTransition);
        }
        record.status = DealStatus::Cancelled;
        record.assert_invariants();
        Ok(record.clone())
    }

    /// Expires the deal if it is still awaiting payment past its
    /// deadline. Returns `None` when nothing changed.
    pub(crate) fn expire_if_overdue(&self, now: DateTime<Utc>) -> Option<DealRecord> {
        let mut record = self.inner.lock();
        if record.status != DealStatus::AwaitingPayment || record.expires_at >= now {
            return None;
        }
        record.status = DealStatus::Expired;
        record.assert_invariants();
        Some(record.clone())
    }
}

impl Serialize for Deal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let record = self.inner.lock();
        let mut state = serializer.serialize_struct("Deal", 9)?;
        state.serialize_field("deal", &record.deal_id)?;
        state.serialize_field("buyer", &record.buyer_id)?;
        state.serialize_field("seller", &record.seller_id)?;
        state.serialize_field("amount", &record.amount.round_dp(Deal::DECIMAL_PRECISION))?;
        state.serialize_field("currency", &record.currency)?;
        state.serialize_field(
            "commission",
            &record.commission.round_dp(Deal::DECIMAL_PRECISION),
        )?;
        state.serialize_field("status", &record.status)?;
        state.serialize_field("buyer_confirmed", &record.buyer_confirmed)?;
        state.serialize_field("seller_confirmed", &record.seller_confirmed)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    const BUYER: UserId = UserId(1);
    const SELLER: UserId = UserId(2);
    const OUTSIDER: UserId = UserId(9);

    fn record_at(status: DealStatus) -> DealRecord {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        DealRecord {
            deal_id: DealId(7),
            buyer_id: BUYER,
            seller_id: SELLER,
            initiated_by: PartyRole::Buyer,
            amount: dec!(100),
            currency: Currency::Ton,
            commission: dec!(1.00),
            escrow_address: "GARANT_TON_7_1714564800000".to_string(),
            created_at: created,
            expires_at: created + Duration::hours(2),
            creation_confirmed: status != DealStatus::AwaitingConfirmation,
            buyer_confirmed: false,
            seller_confirmed: false,
            status,
        }
    }

    fn deal_at(status: DealStatus) -> Deal {
        Deal::new(record_at(status))
    }

    // === Creation Confirmation ===

    #[test]
    fn counterparty_confirms_creation() {
        let deal = deal_at(DealStatus::AwaitingConfirmation);
        let record = deal.confirm_creation(SELLER).unwrap();
        assert_eq!(record.status, DealStatus::AwaitingPayment);
        assert!(record.creation_confirmed);
    }

    #[test]
    fn initiator_cannot_confirm_own_deal() {
        let deal = deal_at(DealStatus::AwaitingConfirmation);
        assert_eq!(deal.confirm_creation(BUYER), Err(EscrowError::Unauthorized));
        assert_eq!(deal.status(), DealStatus::AwaitingConfirmation);
    }

    #[test]
    fn outsider_cannot_confirm_creation() {
        let deal = deal_at(DealStatus::AwaitingConfirmation);
        assert_eq!(
            deal.confirm_creation(OUTSIDER),
            Err(EscrowError::Unauthorized)
        );
    }

    #[test]
    fn confirm_creation_requires_awaiting_confirmation() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        assert_eq!(
            deal.confirm_creation(SELLER),
            Err(EscrowError::IllegalTransition)
        );
    }

    #[test]
    fn counterparty_rejects_creation() {
        let deal = deal_at(DealStatus::AwaitingConfirmation);
        let record = deal.reject_creation(SELLER).unwrap();
        assert_eq!(record.status, DealStatus::Cancelled);
    }

    // === Payment ===

    #[test]
    fn buyer_reports_payment() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        let record = deal.report_payment_sent(BUYER).unwrap();
        assert_eq!(record.status, DealStatus::AwaitingAdminConfirmation);
    }

    #[test]
    fn seller_cannot_report_payment() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        assert_eq!(
            deal.report_payment_sent(SELLER),
            Err(EscrowError::Unauthorized)
        );
    }

    #[test]
    fn payment_report_requires_awaiting_payment() {
        let deal = deal_at(DealStatus::AwaitingConfirmation);
        assert_eq!(
            deal.report_payment_sent(BUYER),
            Err(EscrowError::IllegalTransition)
        );
    }

    #[test]
    fn admin_verification_moves_to_payment_received() {
        let deal = deal_at(DealStatus::AwaitingAdminConfirmation);
        let record = deal.confirm_payment().unwrap();
        assert_eq!(record.status, DealStatus::PaymentReceived);
    }

    #[test]
    fn admin_rejection_moves_to_payment_rejected() {
        let deal = deal_at(DealStatus::AwaitingAdminConfirmation);
        let record = deal.reject_payment().unwrap();
        assert_eq!(record.status, DealStatus::PaymentRejected);
    }

    #[test]
    fn payment_verification_requires_admin_confirmation_state() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        assert_eq!(deal.confirm_payment(), Err(EscrowError::IllegalTransition));
        assert_eq!(deal.reject_payment(), Err(EscrowError::IllegalTransition));
    }

    // === Delivery ===

    #[test]
    fn delivery_completes_after_both_confirm() {
        let deal = deal_at(DealStatus::PaymentReceived);
        match deal.confirm_delivery(BUYER).unwrap() {
            DeliveryOutcome::Recorded(record) => {
                assert!(record.buyer_confirmed);
                assert!(!record.seller_confirmed);
                assert_eq!(record.status, DealStatus::PaymentReceived);
            }
            other => panic!("expected Recorded, got {other:?}"),
        }
        match deal.confirm_delivery(SELLER).unwrap() {
            DeliveryOutcome::Completed(record) => {
                assert!(record.buyer_confirmed);
                assert!(record.seller_confirmed);
                assert_eq!(record.status, DealStatus::Completed);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn repeat_delivery_confirmation_is_a_noop() {
        let deal = deal_at(DealStatus::PaymentReceived);
        deal.confirm_delivery(BUYER).unwrap();
        match deal.confirm_delivery(BUYER).unwrap() {
            DeliveryOutcome::AlreadyRecorded(record) => {
                assert_eq!(record.status, DealStatus::PaymentReceived);
            }
            other => panic!("expected AlreadyRecorded, got {other:?}"),
        }
    }

    #[test]
    fn delivery_confirmation_is_a_noop_after_completion() {
        let deal = deal_at(DealStatus::PaymentReceived);
        deal.confirm_delivery(BUYER).unwrap();
        deal.confirm_delivery(SELLER).unwrap();
        match deal.confirm_delivery(SELLER).unwrap() {
            DeliveryOutcome::AlreadyRecorded(record) => {
                assert_eq!(record.status, DealStatus::Completed);
            }
            other => panic!("expected AlreadyRecorded, got {other:?}"),
        }
    }

    #[test]
    fn delivery_rejected_outside_payment_received() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        assert_eq!(
            deal.confirm_delivery(BUYER),
            Err(EscrowError::IllegalTransition)
        );
    }

    #[test]
    fn delivery_rejected_after_cancellation_even_with_prior_flag() {
        let deal = deal_at(DealStatus::PaymentReceived);
        deal.confirm_delivery(BUYER).unwrap();
        deal.force_cancel().unwrap();
        assert_eq!(
            deal.confirm_delivery(BUYER),
            Err(EscrowError::IllegalTransition)
        );
        assert_eq!(
            deal.confirm_delivery(SELLER),
            Err(EscrowError::IllegalTransition)
        );
    }

    #[test]
    fn outsider_cannot_confirm_delivery() {
        let deal = deal_at(DealStatus::PaymentReceived);
        assert_eq!(
            deal.confirm_delivery(OUTSIDER),
            Err(EscrowError::Unauthorized)
        );
    }

    // === Cancellation ===

    #[test]
    fn parties_can_cancel_early_states() {
        let deal = deal_at(DealStatus::AwaitingConfirmation);
        assert_eq!(deal.cancel(BUYER).unwrap().status, DealStatus::Cancelled);

        let deal = deal_at(DealStatus::AwaitingPayment);
        assert_eq!(deal.cancel(SELLER).unwrap().status, DealStatus::Cancelled);
    }

    #[test]
    fn cancel_rejected_once_payment_is_reported() {
        for status in [
            DealStatus::AwaitingAdminConfirmation,
            DealStatus::PaymentReceived,
            DealStatus::PaymentRejected,
            DealStatus::Completed,
        ] {
            let deal = deal_at(status);
            assert_eq!(
                deal.cancel(BUYER),
                Err(EscrowError::IllegalTransition),
                "cancel should be rejected in {status}"
            );
        }
    }

    #[test]
    fn force_cancel_covers_all_non_terminal_states() {
        for status in [
            DealStatus::AwaitingConfirmation,
            DealStatus::AwaitingPayment,
            DealStatus::AwaitingAdminConfirmation,
            DealStatus::PaymentReceived,
            DealStatus::PaymentRejected,
        ] {
            let deal = deal_at(status);
            assert_eq!(
                deal.force_cancel().unwrap().status,
                DealStatus::Cancelled,
                "force cancel should succeed from {status}"
            );
        }
    }

    #[test]
    fn force_cancel_rejected_in_terminal_states() {
        for status in [
            DealStatus::Completed,
            DealStatus::Cancelled,
            DealStatus::Expired,
        ] {
            let deal = deal_at(status);
            assert_eq!(
                deal.force_cancel(),
                Err(EscrowError::IllegalTransition),
                "force cancel should be rejected in {status}"
            );
        }
    }

    // === Expiry ===

    #[test]
    fn overdue_awaiting_payment_expires() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        let past_deadline = deal.snapshot().expires_at + Duration::minutes(1);
        let record = deal.expire_if_overdue(past_deadline).unwrap();
        assert_eq!(record.status, DealStatus::Expired);
    }

    #[test]
    fn expiry_skips_deals_before_their_deadline() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        let before_deadline = deal.snapshot().expires_at - Duration::minutes(1);
        assert!(deal.expire_if_overdue(before_deadline).is_none());
        assert_eq!(deal.status(), DealStatus::AwaitingPayment);
    }

    #[test]
    fn expiry_skips_other_states() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let long_after = created + Duration::days(30);
        for status in [
            DealStatus::AwaitingConfirmation,
            DealStatus::AwaitingAdminConfirmation,
            DealStatus::PaymentReceived,
            DealStatus::PaymentRejected,
            DealStatus::Completed,
            DealStatus::Cancelled,
            DealStatus::Expired,
        ] {
            let deal = deal_at(status);
            assert!(
                deal.expire_if_overdue(long_after).is_none(),
                "expiry should skip {status}"
            );
        }
    }

    #[test]
    fn expiry_is_idempotent() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        let past_deadline = deal.snapshot().expires_at + Duration::minutes(1);
        assert!(deal.expire_if_overdue(past_deadline).is_some());
        assert!(deal.expire_if_overdue(past_deadline).is_none());
    }

    // === Serialization ===

    #[test]
    fn serializer_emits_flat_row() {
        let deal = deal_at(DealStatus::AwaitingPayment);
        let json = serde_json::to_string(&deal).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["deal"], 7);
        assert_eq!(parsed["buyer"], 1);
        assert_eq!(parsed["seller"], 2);
        assert_eq!(parsed["amount"].as_str().unwrap(), "100");
        assert_eq!(parsed["currency"], "TON");
        assert_eq!(parsed["commission"].as_str().unwrap(), "1.00");
        assert_eq!(parsed["status"], "awaiting_payment");
        assert_eq!(parsed["buyer_confirmed"], false);
        assert_eq!(parsed["seller_confirmed"], false);
    }

    #[test]
    fn status_tags_round_trip() {
        for status in [
            DealStatus::AwaitingConfirmation,
            DealStatus::AwaitingPayment,
            DealStatus::AwaitingAdminConfirmation,
            DealStatus::PaymentReceived,
            DealStatus::PaymentRejected,
            DealStatus::Completed,
            DealStatus::Cancelled,
            DealStatus::Expired,
        ] {
            assert_eq!(DealStatus::from_tag(status.as_str()), Some(status));
        }
        assert_eq!(DealStatus::from_tag("unknown"), None);
    }

    #[test]
    fn address_validation_per_currency() {
        let ton = format!("UQ{}", "a".repeat(46));
        let btc = format!("bc1{}", "q".repeat(40));
        assert!(Currency::Ton.validate_address(&ton));
        assert!(Currency::Btc.validate_address(&btc));

        assert!(!Currency::Ton.validate_address(&btc));
        assert!(!Currency::Btc.validate_address(&ton));
        assert!(!Currency::Ton.validate_address("UQshort"));
        assert!(!Currency::Btc.validate_address("bc1short"));
    }
}

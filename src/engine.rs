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

//! Escrow coordination engine.
//!
//! The [`EscrowEngine`] is the central component that registers
//! participants, drives deals through their lifecycle, and answers
//! queries. It owns the participant registry, the deal rows, and the
//! audit trail; notices and receipts go out through injected gateway
//! traits.
//!
//! # Deal Lifecycle
//!
//! - **Create**: either side opens a deal against a registered partner.
//! - **Confirm/Reject**: the other side accepts or declines it.
//! - **Payment**: the buyer reports paying the escrow address; an admin
//!   verifies or rejects the transfer.
//! - **Delivery**: both sides attest delivery, which completes the deal.
//! - **Cancel/Expire**: parties back out early, admins force-cancel,
//!   and unpaid deals expire after a deadline.
//!
//! # Thread Safety
//!
//! Deal rows live in a [`DashMap`]; operations on different deals run in
//! parallel. Operations on one deal serialize on its row lock, and every
//! transition re-checks the current status before mutating, so of two
//! racing transitions exactly one succeeds.

use crate::base::{ChatId, DealId, SYSTEM_ACTOR, UserId};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::deal::{Currency, Deal, DealRecord, DealStatus, DeliveryOutcome, PartyRole};
use crate::error::EscrowError;
use crate::event_log::EventLog;
use crate::gateway::{Notice, Notifier, NullNotifier};
use crate::receipt::{ReceiptFacts, ReceiptGenerator, TextReceipt};
use crate::registry::{Participant, Registry, Role};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A deal listed from one participant's point of view.
#[derive(Debug, Clone, Serialize)]
pub struct DealView {
    /// The side the queried participant is on.
    pub role: PartyRole,
    pub record: DealRecord,
}

/// Per-participant profile read model, computed from deal rows on read.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub participant: Participant,
    pub total_deals: usize,
    pub completed_deals: usize,
    pub active_deals: usize,
    /// Completed share of all deals, in percent. Zero when there are no deals.
    pub success_rate: f64,
}

/// Completed-deal count for one currency.
#[derive(Debug, Clone, Serialize)]
pub struct CurrencyCount {
    pub currency: Currency,
    pub completed: usize,
}

/// System-wide statistics, computed from live rows on read.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub total_participants: usize,
    pub total_deals: usize,
    pub active_deals: usize,
    pub completed_deals: usize,
    pub cancelled_deals: usize,
    pub expired_deals: usize,
    pub completed_by_currency: Vec<CurrencyCount>,
    /// Sum of completed deal amounts across currencies.
    pub total_volume: Decimal,
}

/// Escrow coordination engine.
///
/// # Invariants
///
/// - A deal always references two distinct registered participants.
/// - `completed` is reached only with both delivery confirmations set.
/// - Terminal deals (`completed`, `cancelled`, `expired`) never change
///   again.
/// - Commission is fixed at creation and never recomputed.
/// - Authorization is checked before deal state, and both before any
///   mutation.
pub struct EscrowEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    registry: Registry,
    /// Deal rows indexed by deal ID.
    deals: DashMap<DealId, Deal>,
    next_deal_id: AtomicU64,
    events: EventLog,
    notifier: Arc<dyn Notifier>,
    receipts: Arc<dyn ReceiptGenerator>,
}

impl EscrowEngine {
    /// Creates an engine with the system clock and no gateway attached.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an engine with an injected time source.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            registry: Registry::new(),
            deals: DashMap::new(),
            next_deal_id: AtomicU64::new(1),
            events: EventLog::new(),
            notifier: Arc::new(NullNotifier),
            receipts: Arc::new(TextReceipt),
        }
    }

    /// Attaches a messaging gateway.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the receipt generator.
    pub fn with_receipts(mut self, receipts: Arc<dyn ReceiptGenerator>) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The audit trail.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // === Participants ===

    /// Resolves a chat identity to a participant, registering it on
    /// first contact.
    ///
    /// Chat ids on the configured admin roster receive the admin role;
    /// everyone else registers as a regular user.
    pub fn register(&self, chat_id: ChatId, display_name: &str) -> Participant {
        let role = if self.config.admins.contains(&chat_id) {
            Role::Admin
        } else {
            Role::User
        };
        let now = self.clock.now();
        let (row, created) = self.registry.get_or_create(chat_id, display_name, role, now);
        if created {
            self.events.append(
                row.user_id,
                "user_registered",
                json!({ "chat_id": chat_id.0, "role": row.role }),
                now,
            );
        }
        row
    }

    pub fn participant(&self, user: UserId) -> Result<Participant, EscrowError> {
        self.registry.get(user).ok_or(EscrowError::UserNotFound)
    }

    /// Looks up a participant by chat identity without registering it.
    pub fn find_participant(&self, chat_id: ChatId) -> Option<Participant> {
        self.registry.find_by_chat(chat_id)
    }

    /// Stores a payout address for the participant.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::InvalidAddress`] - address fails the currency's format check.
    /// - [`EscrowError::UserNotFound`] - participant does not exist.
    pub fn set_payout_address(
        &self,
        user: UserId,
        currency: Currency,
        address: &str,
    ) -> Result<Participant, EscrowError> {
        let row = self.registry.set_wallet(user, currency, address)?;
        self.events.append(
            user,
            "wallet_updated",
            json!({ "currency": currency.code(), "address": address }),
            self.clock.now(),
        );
        Ok(row)
    }

    // === Deal Lifecycle ===

    /// Opens a deal between the initiator and a registered partner.
    ///
    /// The initiator picks their own side; the partner takes the other
    /// one. The deal starts in `awaiting_confirmation` with commission
    /// and payment deadline fixed from the engine configuration, and the
    /// partner is invited to confirm.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::InvalidAmount`] - amount is zero or negative.
    /// - [`EscrowError::SelfDeal`] - initiator and partner are the same participant.
    /// - [`EscrowError::UserNotFound`] - initiator or partner is not registered.
    /// - [`EscrowError::SellerWalletNotSet`] - a seller-side initiator has no
    ///   payout address for the deal currency.
    pub fn create_deal(
        &self,
        initiator: UserId,
        initiator_role: PartyRole,
        partner: UserId,
        amount: Decimal,
        currency: Currency,
    ) -> Result<DealRecord, EscrowError> {
        if amount <= Decimal::ZERO {
            return Err(EscrowError::InvalidAmount);
        }
        if initiator == partner {
            return Err(EscrowError::SelfDeal);
        }
        let initiator_row = self.registry.get(initiator).ok_or(EscrowError::UserNotFound)?;
        let partner_row = self.registry.get(partner).ok_or(EscrowError::UserNotFound)?;
        // A seller-side initiator must already be payable in the deal currency.
        if initiator_role == PartyRole::Seller && initiator_row.wallet(currency).is_none() {
            return Err(EscrowError::SellerWalletNotSet);
        }

        let (buyer_id, seller_id) = match initiator_role {
            PartyRole::Buyer => (initiator, partner),
            PartyRole::Seller => (partner, initiator),
        };
        let now = self.clock.now();
        let deal_id = DealId(self.next_deal_id.fetch_add(1, Ordering::Relaxed));
        let record = DealRecord {
            deal_id,
            buyer_id,
            seller_id,
            initiated_by: initiator_role,
            amount,
            currency,
            commission: amount * self.config.commission_rate,
            escrow_address: format!("GARANT_{}_{}_{}", currency, deal_id, now.timestamp_millis()),
            created_at: now,
            expires_at: now + self.config.deal_expiry,
            creation_confirmed: false,
            buyer_confirmed: false,
            seller_confirmed: false,
            status: DealStatus::AwaitingConfirmation,
        };
        self.deals.insert(deal_id, Deal::new(record.clone()));

        self.events.append(
            initiator,
            "deal_created",
            json!({ "deal_id": deal_id.0, "amount": amount, "currency": currency.code() }),
            now,
        );
        self.send(
            partner_row.chat_id,
            &Notice::DealInvitation {
                deal: deal_id,
                from: initiator_row.display_name.clone(),
                amount,
                currency,
            },
        );
        Ok(record)
    }

    /// Counterparty accepts the deal; the buyer receives payment
    /// instructions for the escrow address.
    pub fn confirm_creation(&self, actor: UserId, deal: DealId) -> Result<DealRecord, EscrowError> {
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .confirm_creation(actor)?;
        self.events.append(
            actor,
            "deal_confirmed",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        self.notify_party(
            &record,
            PartyRole::Buyer,
            &Notice::PaymentInstructions {
                deal,
                amount: record.amount,
                currency: record.currency,
                escrow_address: record.escrow_address.clone(),
                expires_hours: self.config.deal_expiry.num_hours(),
            },
        );
        Ok(record)
    }

    /// Counterparty declines the deal; the initiator is told.
    pub fn reject_creation(&self, actor: UserId, deal: DealId) -> Result<DealRecord, EscrowError> {
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .reject_creation(actor)?;
        self.events.append(
            actor,
            "deal_rejected",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        if let Some(initiator) = self.registry.get(record.initiator()) {
            self.send(initiator.chat_id, &Notice::CreationRejected { deal });
        }
        Ok(record)
    }

    /// Buyer reports the outgoing payment; the admin roster is asked to
    /// verify the transfer.
    pub fn report_payment_sent(
        &self,
        actor: UserId,
        deal: DealId,
    ) -> Result<DealRecord, EscrowError> {
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .report_payment_sent(actor)?;
        self.events.append(
            actor,
            "payment_reported",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        let notice = Notice::PaymentReview {
            deal,
            amount: record.amount,
            currency: record.currency,
            escrow_address: record.escrow_address.clone(),
        };
        for admin_chat in &self.config.admins {
            self.send(*admin_chat, &notice);
        }
        Ok(record)
    }

    /// Admin confirms the funds arrived in escrow. Both parties learn
    /// the deal is live: the buyer that the payment is held, the seller
    /// that goods can change hands.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::Unauthorized`] - actor lacks the admin role.
    /// - [`EscrowError::DealNotFound`] - deal does not exist.
    /// - [`EscrowError::IllegalTransition`] - deal is not awaiting admin confirmation.
    pub fn admin_confirm_payment(
        &self,
        actor: UserId,
        deal: DealId,
    ) -> Result<DealRecord, EscrowError> {
        self.ensure_admin(actor)?;
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .confirm_payment()?;
        self.events.append(
            actor,
            "payment_confirmed",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        self.notify_party(&record, PartyRole::Buyer, &Notice::PaymentVerified { deal });
        self.notify_party(
            &record,
            PartyRole::Seller,
            &Notice::ShipGoods {
                deal,
                amount: record.amount,
                currency: record.currency,
            },
        );
        Ok(record)
    }

    /// Admin could not verify the transfer; the buyer is told.
    ///
    /// The deal parks in `payment_rejected`, which only an admin
    /// force-cancel can leave.
    pub fn admin_reject_payment(
        &self,
        actor: UserId,
        deal: DealId,
    ) -> Result<DealRecord, EscrowError> {
        self.ensure_admin(actor)?;
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .reject_payment()?;
        self.events.append(
            actor,
            "payment_rejected",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        self.notify_party(&record, PartyRole::Buyer, &Notice::PaymentRejected { deal });
        Ok(record)
    }

    /// Records the actor's delivery confirmation. When the second side
    /// confirms, the deal completes, the counterparty is told, and the
    /// seller receives a settlement receipt.
    ///
    /// Confirming twice from the same side is a no-op, not an error.
    pub fn confirm_delivery(
        &self,
        actor: UserId,
        deal: DealId,
    ) -> Result<DeliveryOutcome, EscrowError> {
        let outcome = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .confirm_delivery(actor)?;
        match &outcome {
            DeliveryOutcome::Recorded(_) => {
                self.events.append(
                    actor,
                    "delivery_confirmed",
                    json!({ "deal_id": deal.0 }),
                    self.clock.now(),
                );
            }
            DeliveryOutcome::Completed(record) => {
                let now = self.clock.now();
                self.events.append(
                    actor,
                    "delivery_confirmed",
                    json!({ "deal_id": deal.0 }),
                    now,
                );
                self.events
                    .append(actor, "deal_completed", json!({ "deal_id": deal.0 }), now);
                if let Some(other) = record.counterparty_of(actor) {
                    if let Some(row) = self.registry.get(other) {
                        self.send(row.chat_id, &Notice::DealCompleted { deal });
                    }
                }
                self.issue_receipt(record);
            }
            DeliveryOutcome::AlreadyRecorded(_) => {}
        }
        Ok(outcome)
    }

    /// Either party backs out before the admin gets involved; the other
    /// party is told.
    pub fn cancel_deal(&self, actor: UserId, deal: DealId) -> Result<DealRecord, EscrowError> {
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .cancel(actor)?;
        self.events.append(
            actor,
            "deal_cancelled",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        if let Some(other) = record.counterparty_of(actor) {
            if let Some(row) = self.registry.get(other) {
                self.send(row.chat_id, &Notice::DealCancelled { deal });
            }
        }
        Ok(record)
    }

    /// Admin cancellation from any non-terminal state. Both parties are
    /// told.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::Unauthorized`] - actor lacks the admin role.
    /// - [`EscrowError::DealNotFound`] - deal does not exist.
    /// - [`EscrowError::IllegalTransition`] - deal is already terminal.
    pub fn force_cancel(&self, actor: UserId, deal: DealId) -> Result<DealRecord, EscrowError> {
        self.ensure_admin(actor)?;
        let record = self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .force_cancel()?;
        self.events.append(
            actor,
            "deal_force_cancelled",
            json!({ "deal_id": deal.0 }),
            self.clock.now(),
        );
        let notice = Notice::CancelledByAdmin { deal };
        self.notify_party(&record, PartyRole::Buyer, &notice);
        self.notify_party(&record, PartyRole::Seller, &notice);
        Ok(record)
    }

    /// Expires every deal still awaiting payment past its deadline.
    ///
    /// Safe to call at any time and idempotent: deals that transitioned
    /// away concurrently are skipped, because the row lock re-checks
    /// status and deadline before mutating. Parties are not notified;
    /// the expiry is audited under the system actor.
    pub fn expire_stale(&self) -> Vec<DealRecord> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for row in self.deals.iter() {
            if let Some(record) = row.value().expire_if_overdue(now) {
                self.events.append(
                    SYSTEM_ACTOR,
                    "deal_expired",
                    json!({ "deal_id": record.deal_id.0 }),
                    now,
                );
                tracing::info!(deal = record.deal_id.0, "deal expired");
                expired.push(record);
            }
        }
        expired
    }

    // === Queries ===

    /// Snapshot of one deal.
    pub fn get_deal(&self, deal: DealId) -> Result<DealRecord, EscrowError> {
        Ok(self
            .deal(&deal)
            .ok_or(EscrowError::DealNotFound)?
            .snapshot())
    }

    /// Retrieves a deal row by ID.
    ///
    /// Returns `None` if no deal exists for the given ID.
    pub fn deal(&self, deal_id: &DealId) -> Option<dashmap::mapref::one::Ref<'_, DealId, Deal>> {
        self.deals.get(deal_id)
    }

    /// Returns an iterator over all deal rows.
    ///
    /// Useful for generating output reports of final deal states.
    pub fn deals(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, DealId, Deal>> {
        self.deals.iter()
    }

    /// Deals the participant is a party to, newest first, optionally
    /// filtered by status.
    pub fn deals_for(&self, user: UserId, status: Option<DealStatus>) -> Vec<DealView> {
        let mut views: Vec<DealView> = self
            .deals
            .iter()
            .filter_map(|row| {
                let record = row.value().snapshot();
                let role = record.role_of(user)?;
                if let Some(want) = status {
                    if record.status != want {
                        return None;
                    }
                }
                Some(DealView { role, record })
            })
            .collect();
        views.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.record.deal_id.cmp(&a.record.deal_id))
        });
        views
    }

    /// Profile read model for one participant, with deal counters
    /// computed from live rows.
    pub fn profile(&self, user: UserId) -> Result<ProfileView, EscrowError> {
        let participant = self.participant(user)?;
        let deals = self.deals_for(user, None);
        let total = deals.len();
        let completed = deals
            .iter()
            .filter(|view| view.record.status == DealStatus::Completed)
            .count();
        let active = deals
            .iter()
            .filter(|view| view.record.status.is_active())
            .count();
        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Ok(ProfileView {
            participant,
            total_deals: total,
            completed_deals: completed,
            active_deals: active,
            success_rate,
        })
    }

    /// System-wide statistics. Requires the admin role.
    pub fn system_stats(&self, actor: UserId) -> Result<SystemStats, EscrowError> {
        self.ensure_admin(actor)?;
        let snapshots: Vec<DealRecord> = self
            .deals
            .iter()
            .map(|row| row.value().snapshot())
            .collect();

        let count = |status: DealStatus| snapshots.iter().filter(|d| d.status == status).count();
        let completed_by_currency = Currency::ALL
            .iter()
            .map(|&currency| CurrencyCount {
                currency,
                completed: snapshots
                    .iter()
                    .filter(|d| d.status == DealStatus::Completed && d.currency == currency)
                    .count(),
            })
            .collect();
        let total_volume: Decimal = snapshots
            .iter()
            .filter(|d| d.status == DealStatus::Completed)
            .map(|d| d.amount)
            .sum();

        Ok(SystemStats {
            total_participants: self.registry.len(),
            total_deals: snapshots.len(),
            active_deals: snapshots.iter().filter(|d| d.status.is_active()).count(),
            completed_deals: count(DealStatus::Completed),
            cancelled_deals: count(DealStatus::Cancelled),
            expired_deals: count(DealStatus::Expired),
            completed_by_currency,
            total_volume,
        })
    }

    /// All participants, newest first. Requires the admin role.
    pub fn participants(&self, actor: UserId) -> Result<Vec<Participant>, EscrowError> {
        self.ensure_admin(actor)?;
        Ok(self.registry.all())
    }

    /// All deals, newest first. Requires the admin role.
    pub fn all_deals(&self, actor: UserId) -> Result<Vec<DealRecord>, EscrowError> {
        self.ensure_admin(actor)?;
        let mut records: Vec<DealRecord> = self
            .deals
            .iter()
            .map(|row| row.value().snapshot())
            .collect();
        records.sort_by(|a, b| b.deal_id.cmp(&a.deal_id));
        Ok(records)
    }

    // === Internals ===

    fn ensure_admin(&self, actor: UserId) -> Result<Participant, EscrowError> {
        let row = self.registry.get(actor).ok_or(EscrowError::Unauthorized)?;
        if !row.is_admin() {
            return Err(EscrowError::Unauthorized);
        }
        Ok(row)
    }

    /// Fire-and-forget delivery; a failure is logged per recipient.
    fn send(&self, recipient: ChatId, notice: &Notice) {
        if let Err(error) = self.notifier.notify(recipient, notice) {
            tracing::warn!(recipient = recipient.0, %error, "notice delivery failed");
        }
    }

    fn notify_party(&self, record: &DealRecord, role: PartyRole, notice: &Notice) {
        if let Some(row) = self.registry.get(record.party(role)) {
            self.send(row.chat_id, notice);
        }
    }

    /// Builds the settlement receipt and delivers it to the seller.
    fn issue_receipt(&self, record: &DealRecord) {
        let Some(seller) = self.registry.get(record.seller_id) else {
            return;
        };
        let Some(buyer) = self.registry.get(record.buyer_id) else {
            return;
        };
        let facts = ReceiptFacts {
            deal_id: record.deal_id,
            buyer_id: buyer.user_id,
            buyer_name: buyer.display_name.clone(),
            seller_id: seller.user_id,
            seller_name: seller.display_name.clone(),
            amount: record.amount,
            currency: record.currency,
            payout_address: seller.wallet(record.currency).map(str::to_string),
            completed_at: self.clock.now(),
        };
        match self.receipts.generate(&facts) {
            Ok(document) => {
                let filename = self.receipts.filename(&facts);
                if let Err(error) =
                    self.notifier
                        .deliver_document(seller.chat_id, &filename, &document)
                {
                    tracing::warn!(
                        deal = record.deal_id.0,
                        recipient = seller.chat_id.0,
                        %error,
                        "receipt delivery failed"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(deal = record.deal_id.0, %error, "receipt generation failed");
            }
        }
    }
}

impl Default for EscrowEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

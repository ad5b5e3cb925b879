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

use chrono::Duration;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use garant_rs::{
    ChatId, Currency, DealId, EngineConfig, EscrowEngine, EscrowError, PartyRole, TracingNotifier,
    UserId,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Escrow Engine - Replay deal operation CSV files
///
/// Reads operations from a CSV file, drives them through the escrow
/// engine, and outputs final deal states to stdout. Rejected operations
/// are logged to stderr and skipped, like a live gateway would do.
#[derive(Parser, Debug)]
#[command(name = "garant-rs")]
#[command(about = "An escrow engine that replays deal operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,actor,name,partner,role,deal,amount,currency,address
    /// Example: cargo run -- operations.csv > deals.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Chat id granted the admin role (repeat for several admins)
    #[arg(long = "admin", value_name = "CHAT_ID")]
    admins: Vec<i64>,

    /// Hours until an unpaid deal expires
    #[arg(long, default_value_t = 2)]
    expiry_hours: i64,

    /// Commission rate as a decimal fraction of the deal amount
    #[arg(long, default_value = "0.01")]
    commission_rate: Decimal,
}

fn main() {
    // Diagnostics go to stderr; stdout stays clean for the CSV report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match replay_operations(engine_config(&args), BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error replaying operations: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_deals(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn engine_config(args: &Args) -> EngineConfig {
    let mut config = EngineConfig::default()
        .with_expiry(Duration::hours(args.expiry_hours))
        .with_commission_rate(args.commission_rate);
    for admin in &args.admins {
        config = config.with_admin(ChatId(*admin));
    }
    config
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, actor, name, partner, role, deal, amount, currency, address`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    actor: Option<i64>,
    name: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    partner: Option<u64>,
    role: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    deal: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    currency: Option<String>,
    address: Option<String>,
}

/// The acting participant of a replayed row, by chat identity.
#[derive(Debug)]
struct ActorRef {
    chat: ChatId,
    name: String,
}

#[derive(Debug)]
enum Op {
    Actor(ActorRef, Action),
    Sweep,
}

#[derive(Debug)]
enum Action {
    Register,
    SetWallet { currency: Currency, address: String },
    Create { role: PartyRole, partner: UserId, amount: Decimal, currency: Currency },
    ConfirmCreation(DealId),
    RejectCreation(DealId),
    PaymentSent(DealId),
    AdminConfirm(DealId),
    AdminReject(DealId),
    ConfirmDelivery(DealId),
    Cancel(DealId),
    ForceCancel(DealId),
}

impl CsvRecord {
    /// Converts a CSV record into an operation.
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_op(self) -> Option<Op> {
        let op = self.op.to_lowercase();
        if op == "sweep" {
            return Some(Op::Sweep);
        }

        let actor = ActorRef {
            chat: ChatId(self.actor?),
            name: self.name.unwrap_or_else(|| "unnamed".to_string()),
        };
        let deal = self.deal.map(DealId);
        let action = match op.as_str() {
            "register" => Action::Register,
            "set_wallet" => Action::SetWallet {
                currency: Currency::from_code(self.currency.as_deref()?)?,
                address: self.address?,
            },
            "create" => Action::Create {
                role: PartyRole::from_code(self.role.as_deref()?)?,
                partner: UserId(self.partner?),
                amount: self.amount?,
                currency: Currency::from_code(self.currency.as_deref()?)?,
            },
            "confirm_creation" => Action::ConfirmCreation(deal?),
            "reject_creation" => Action::RejectCreation(deal?),
            "payment_sent" => Action::PaymentSent(deal?),
            "admin_confirm" => Action::AdminConfirm(deal?),
            "admin_reject" => Action::AdminReject(deal?),
            "confirm_delivery" => Action::ConfirmDelivery(deal?),
            "cancel" => Action::Cancel(deal?),
            "force_cancel" => Action::ForceCancel(deal?),
            _ => return None,
        };
        Some(Op::Actor(actor, action))
    }
}

fn apply(engine: &EscrowEngine, op: Op) -> Result<(), EscrowError> {
    match op {
        Op::Sweep => {
            engine.expire_stale();
            Ok(())
        }
        Op::Actor(actor, action) => {
            // Every acting row resolves its participant first, the same
            // way a gateway resolves an incoming chat message.
            let user = engine.register(actor.chat, &actor.name).user_id;
            match action {
                Action::Register => Ok(()),
                Action::SetWallet { currency, address } => engine
                    .set_payout_address(user, currency, &address)
                    .map(|_| ()),
                Action::Create {
                    role,
                    partner,
                    amount,
                    currency,
                } => engine
                    .create_deal(user, role, partner, amount, currency)
                    .map(|_| ()),
                Action::ConfirmCreation(deal) => engine.confirm_creation(user, deal).map(|_| ()),
                Action::RejectCreation(deal) => engine.reject_creation(user, deal).map(|_| ()),
                Action::PaymentSent(deal) => engine.report_payment_sent(user, deal).map(|_| ()),
                Action::AdminConfirm(deal) => engine.admin_confirm_payment(user, deal).map(|_| ()),
                Action::AdminReject(deal) => engine.admin_reject_payment(user, deal).map(|_| ()),
                Action::ConfirmDelivery(deal) => engine.confirm_delivery(user, deal).map(|_| ()),
                Action::Cancel(deal) => engine.cancel_deal(user, deal).map(|_| ()),
                Action::ForceCancel(deal) => engine.force_cancel(user, deal).map(|_| ()),
            }
        }
    }
}

/// Replay operations from a CSV reader.
///
/// Streaming: rows are applied as they parse, so arbitrarily large files
/// work without loading everything into memory. Malformed rows and
/// rejected operations are logged and skipped; a rejected operation
/// never halts the replay.
///
/// # CSV Format
///
/// Expected columns: `op, actor, name, partner, role, deal, amount, currency, address`
/// - `op`: register, set_wallet, create, confirm_creation, reject_creation,
///   payment_sent, admin_confirm, admin_reject, confirm_delivery, cancel,
///   force_cancel, sweep
/// - `actor`: chat id of the acting participant (empty for sweep)
/// - `name`: display name, captured at first contact
/// - `partner`: partner's participant id (create only)
/// - `role`: buyer or seller, the initiator's side (create only)
/// - `deal`: deal id (lifecycle ops)
/// - `amount`: decimal deal amount (create only)
/// - `currency`: TON or BTC (create, set_wallet)
/// - `address`: payout address (set_wallet only)
///
/// # Example
///
/// ```csv
/// op,actor,name,partner,role,deal,amount,currency,address
/// register,1002,bob,,,,,,
/// create,1001,alice,1,buyer,,100,TON,
/// confirm_creation,1002,bob,,,1,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails. Individual operation errors
/// are logged but don't stop processing.
pub fn replay_operations<R: Read>(
    config: EngineConfig,
    reader: R,
) -> Result<EscrowEngine, csv::Error> {
    let engine = EscrowEngine::new(config).with_notifier(Arc::new(TracingNotifier));

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " create "
        .flexible(true) // Allow rows with trailing fields left off
        .has_headers(true) // Skip first row as header
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let op_name = record.op.clone();
                let Some(op) = record.into_op() else {
                    tracing::debug!(op = %op_name, "skipping invalid operation record");
                    continue;
                };
                if let Err(error) = apply(&engine, op) {
                    tracing::warn!(op = %op_name, %error, "operation rejected");
                }
            }
            Err(error) => {
                tracing::debug!(%error, "skipping malformed row");
                continue;
            }
        }
    }

    Ok(engine)
}

/// Write final deal states to a CSV writer, ordered by deal id.
///
/// # CSV Format
///
/// Columns: `deal, buyer, seller, amount, currency, commission, status,
/// buyer_confirmed, seller_confirmed`
///
/// # Example
///
/// ```csv
/// deal,buyer,seller,amount,currency,commission,status,buyer_confirmed,seller_confirmed
/// 1,2,1,100,TON,1.00,completed,true,true
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_deals<W: Write>(engine: &EscrowEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut ids: Vec<DealId> = engine.deals().map(|row| *row.key()).collect();
    ids.sort();
    for id in ids {
        if let Some(deal) = engine.deal(&id) {
            wtr.serialize(&*deal)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

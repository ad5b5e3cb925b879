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

//! Background expiry sweep.
//!
//! One thread, one job: on every tick, expire overdue deals through the
//! engine. A sweep finding nothing is normal; the loop only exits when
//! the handle is stopped or dropped. Sweeps are idempotent, so an extra
//! run is harmless.

use crate::engine::EscrowEngine;
use crossbeam::channel::{RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Handle to the background sweeper thread.
///
/// Stopping (or dropping) the handle signals the thread and joins it.
#[derive(Debug)]
pub struct Sweeper {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the sweep loop with the engine's configured interval.
    pub fn spawn(engine: Arc<EscrowEngine>) -> Sweeper {
        let interval = engine.config().sweep_interval;
        Self::spawn_with_interval(engine, interval)
    }

    /// Spawns the sweep loop with an explicit interval.
    pub fn spawn_with_interval(engine: Arc<EscrowEngine>, interval: Duration) -> Sweeper {
        let (shutdown, ticks) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "expiry sweeper started");
            loop {
                match ticks.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let expired = engine.expire_stale();
                        if !expired.is_empty() {
                            info!(count = expired.len(), "expired overdue deals");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("expiry sweeper stopped");
        });
        Sweeper {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signals the thread and waits for it to finish.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

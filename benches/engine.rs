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

//! Benchmarks for the escrow engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded deal creation and full lifecycles
//! - Multi-threaded concurrent deal processing
//! - Rejection and cancellation paths
//! - Expiry sweeps and read models over growing state

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use garant_rs::{
    ChatId, Currency, DealId, EngineConfig, EscrowEngine, ManualClock, PartyRole, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;

use rayon::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

const ADMIN_CHAT: i64 = 9;

fn ton(amount: i64) -> Decimal {
    Decimal::new(amount, 4)
}

fn engine_with_admin() -> EscrowEngine {
    EscrowEngine::new(EngineConfig::default().with_admin(ChatId(ADMIN_CHAT)))
}

fn register_admin(engine: &EscrowEngine) -> UserId {
    engine.register(ChatId(ADMIN_CHAT), "admin").user_id
}

fn register_pair(engine: &EscrowEngine, pair: i64) -> (UserId, UserId) {
    let buyer = engine.register(ChatId(1_000 + pair * 2), "buyer").user_id;
    let seller = engine.register(ChatId(1_001 + pair * 2), "seller").user_id;
    (buyer, seller)
}

fn create_deal(engine: &EscrowEngine, buyer: UserId, seller: UserId) -> DealId {
    engine
        .create_deal(buyer, PartyRole::Buyer, seller, ton(100_000), Currency::Ton)
        .unwrap()
        .deal_id
}

/// Drives one deal from creation to completion in six operations.
fn run_lifecycle(engine: &EscrowEngine, buyer: UserId, seller: UserId, admin: UserId) -> DealId {
    let deal = create_deal(engine, buyer, seller);
    engine.confirm_creation(seller, deal).unwrap();
    engine.report_payment_sent(buyer, deal).unwrap();
    engine.admin_confirm_payment(admin, deal).unwrap();
    engine.confirm_delivery(buyer, deal).unwrap();
    engine.confirm_delivery(seller, deal).unwrap();
    deal
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_single_registration(c: &mut Criterion) {
    c.bench_function("single_registration", |b| {
        b.iter(|| {
            let engine = engine_with_admin();
            black_box(engine.register(ChatId(1), "alice"));
        })
    });
}

fn bench_single_deal_creation(c: &mut Criterion) {
    c.bench_function("single_deal_creation", |b| {
        b.iter(|| {
            let engine = engine_with_admin();
            let (buyer, seller) = register_pair(&engine, 0);
            black_box(create_deal(&engine, buyer, seller));
        })
    });
}

fn bench_full_lifecycle(c: &mut Criterion) {
    c.bench_function("full_lifecycle", |b| {
        b.iter(|| {
            let engine = engine_with_admin();
            let admin = register_admin(&engine);
            let (buyer, seller) = register_pair(&engine, 0);
            black_box(run_lifecycle(&engine, buyer, seller, admin));
        })
    });
}

fn bench_creation_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("creation_throughput");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = engine_with_admin();
                let (buyer, seller) = register_pair(&engine, 0);
                for _ in 0..count {
                    create_deal(&engine, buyer, seller);
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_lifecycle_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle_throughput");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = engine_with_admin();
                let admin = register_admin(&engine);
                let (buyer, seller) = register_pair(&engine, 0);
                for _ in 0..count {
                    run_lifecycle(&engine, buyer, seller, admin);
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Rejection Path Benchmarks
// =============================================================================

fn bench_rejection_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("rejection_paths");

    // Counterparty declines the invitation
    group.bench_function("counterparty_rejection", |b| {
        b.iter(|| {
            let engine = engine_with_admin();
            let (buyer, seller) = register_pair(&engine, 0);
            let deal = create_deal(&engine, buyer, seller);
            engine.reject_creation(seller, black_box(deal)).unwrap();
        })
    });

    // Admin bounces the claimed payment
    group.bench_function("payment_rejection", |b| {
        b.iter(|| {
            let engine = engine_with_admin();
            let admin = register_admin(&engine);
            let (buyer, seller) = register_pair(&engine, 0);
            let deal = create_deal(&engine, buyer, seller);
            engine.confirm_creation(seller, deal).unwrap();
            engine.report_payment_sent(buyer, deal).unwrap();
            engine.admin_reject_payment(admin, black_box(deal)).unwrap();
        })
    });

    // Admin closes a parked deal
    group.bench_function("force_cancel_after_rejection", |b| {
        b.iter(|| {
            let engine = engine_with_admin();
            let admin = register_admin(&engine);
            let (buyer, seller) = register_pair(&engine, 0);
            let deal = create_deal(&engine, buyer, seller);
            engine.confirm_creation(seller, deal).unwrap();
            engine.report_payment_sent(buyer, deal).unwrap();
            engine.admin_reject_payment(admin, deal).unwrap();
            engine.force_cancel(admin, black_box(deal)).unwrap();
        })
    });

    group.finish();
}

// =============================================================================
// Multi-Pair Benchmarks
// =============================================================================

fn bench_multi_pair_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_pair_sequential");

    for num_pairs in [10, 100, 1_000].iter() {
        let deals_per_pair = 10;
        let total_deals = *num_pairs as u64 * deals_per_pair;

        group.throughput(Throughput::Elements(total_deals));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_pairs),
            num_pairs,
            |b, &num_pairs| {
                b.iter(|| {
                    let engine = engine_with_admin();
                    for pair in 0..num_pairs {
                        let (buyer, seller) = register_pair(&engine, pair as i64);
                        for _ in 0..deals_per_pair {
                            create_deal(&engine, buyer, seller);
                        }
                    }
                    black_box(&engine);
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_creation_same_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_creation_same_pair");

    for count in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = Arc::new(engine_with_admin());
                let (buyer, seller) = register_pair(&engine, 0);

                (0..count).into_par_iter().for_each(|_| {
                    create_deal(&engine, buyer, seller);
                });

                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_parallel_creation_many_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_creation_many_pairs");
    let num_pairs = 1_000usize;

    for count in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || {
                    let engine = Arc::new(engine_with_admin());
                    let pairs: Vec<(UserId, UserId)> = (0..num_pairs)
                        .map(|pair| register_pair(&engine, pair as i64))
                        .collect();
                    (engine, pairs)
                },
                |(engine, pairs)| {
                    (0..count).into_par_iter().for_each(|i| {
                        let (buyer, seller) = pairs[i % num_pairs];
                        create_deal(&engine, buyer, seller);
                    });
                    black_box(&engine);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_parallel_lifecycles(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_lifecycles");
    let num_pairs = 100usize;

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter_batched(
                || {
                    let engine = Arc::new(engine_with_admin());
                    let admin = register_admin(&engine);
                    let pairs: Vec<(UserId, UserId)> = (0..num_pairs)
                        .map(|pair| register_pair(&engine, pair as i64))
                        .collect();
                    (engine, pairs, admin)
                },
                |(engine, pairs, admin)| {
                    (0..count).into_par_iter().for_each(|i| {
                        let (buyer, seller) = pairs[i % num_pairs];
                        run_lifecycle(&engine, buyer, seller, admin);
                    });
                    black_box(&engine);
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_parallel_confirmations(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_confirmations");

    for num_deals in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*num_deals as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_deals),
            num_deals,
            |b, &num_deals| {
                b.iter_batched(
                    || {
                        // Setup: fresh deals waiting on the counterparty
                        let engine = Arc::new(engine_with_admin());
                        let (buyer, seller) = register_pair(&engine, 0);
                        let deals: Vec<DealId> = (0..num_deals)
                            .map(|_| create_deal(&engine, buyer, seller))
                            .collect();
                        (engine, deals, seller)
                    },
                    |(engine, deals, seller)| {
                        deals.par_iter().for_each(|&deal| {
                            engine.confirm_creation(seller, deal).unwrap();
                        });
                        black_box(&engine);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Scaling Benchmarks
// =============================================================================

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_deals = 100_000usize;
    let num_pairs = 1_000usize;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(total_deals as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                // Configure rayon thread pool for this benchmark
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter_batched(
                    || {
                        let engine = Arc::new(engine_with_admin());
                        let pairs: Vec<(UserId, UserId)> = (0..num_pairs)
                            .map(|pair| register_pair(&engine, pair as i64))
                            .collect();
                        (engine, pairs)
                    },
                    |(engine, pairs)| {
                        pool.install(|| {
                            (0..total_deals).into_par_iter().for_each(|i| {
                                let (buyer, seller) = pairs[i % num_pairs];
                                create_deal(&engine, buyer, seller);
                            });
                        });
                        black_box(&engine);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let total_ops = 10_000usize;

    // Fewer deals = more contention (more threads competing for the
    // same deal locks). Repeat confirmations are accepted no-ops, so
    // every op takes the contended lock.
    for num_deals in [1, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(total_ops as u64));
        group.bench_with_input(
            BenchmarkId::new("deals", num_deals),
            num_deals,
            |b, &num_deals| {
                b.iter_batched(
                    || {
                        let engine = Arc::new(engine_with_admin());
                        let admin = register_admin(&engine);
                        let (buyer, seller) = register_pair(&engine, 0);
                        let deals: Vec<DealId> = (0..num_deals)
                            .map(|_| {
                                let deal = create_deal(&engine, buyer, seller);
                                engine.confirm_creation(seller, deal).unwrap();
                                engine.report_payment_sent(buyer, deal).unwrap();
                                engine.admin_confirm_payment(admin, deal).unwrap();
                                deal
                            })
                            .collect();
                        (engine, deals, buyer)
                    },
                    |(engine, deals, buyer)| {
                        (0..total_ops).into_par_iter().for_each(|i| {
                            let deal = deals[i % deals.len()];
                            engine.confirm_delivery(buyer, deal).unwrap();
                        });
                        black_box(&engine);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Expiry Sweep Benchmarks
// =============================================================================

fn bench_expiry_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry_sweep");

    for num_deals in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*num_deals as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_deals),
            num_deals,
            |b, &num_deals| {
                b.iter_batched(
                    || {
                        // Setup: deals stuck in awaiting_payment past their deadline
                        let clock = Arc::new(ManualClock::new(Utc::now()));
                        let engine = EscrowEngine::with_clock(
                            EngineConfig::default().with_admin(ChatId(ADMIN_CHAT)),
                            clock.clone(),
                        );
                        let (buyer, seller) = register_pair(&engine, 0);
                        for _ in 0..num_deals {
                            let deal = create_deal(&engine, buyer, seller);
                            engine.confirm_creation(seller, deal).unwrap();
                        }
                        clock.advance(Duration::hours(3));
                        engine
                    },
                    |engine| {
                        let expired = engine.expire_stale();
                        black_box(expired);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Read Model Benchmarks
// =============================================================================

fn bench_read_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_models");

    // Read models are computed from live rows on every call, so their
    // cost grows with the number of deals.
    for num_deals in [100, 1_000, 10_000].iter() {
        let engine = engine_with_admin();
        let admin = register_admin(&engine);
        let (buyer, seller) = register_pair(&engine, 0);
        for _ in 0..*num_deals {
            run_lifecycle(&engine, buyer, seller, admin);
        }

        group.bench_with_input(
            BenchmarkId::new("system_stats", num_deals),
            num_deals,
            |b, _| b.iter(|| black_box(engine.system_stats(admin).unwrap())),
        );
        group.bench_with_input(
            BenchmarkId::new("deals_for", num_deals),
            num_deals,
            |b, _| b.iter(|| black_box(engine.deals_for(buyer, None))),
        );
        group.bench_with_input(
            BenchmarkId::new("profile", num_deals),
            num_deals,
            |b, _| b.iter(|| black_box(engine.profile(buyer).unwrap())),
        );
    }
    group.finish();
}

// =============================================================================
// Memory/Allocation Benchmarks
// =============================================================================

fn bench_registration_volume(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration_volume");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = engine_with_admin();
                for i in 0..count {
                    engine.register(ChatId(i as i64 + 1), "participant");
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_deal_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("deal_history");

    // Benchmark how creating one more deal behaves as the deal map grows
    for history_size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(history_size),
            history_size,
            |b, &history_size| {
                b.iter_batched(
                    || {
                        let engine = engine_with_admin();
                        let (buyer, seller) = register_pair(&engine, 0);
                        for _ in 0..history_size {
                            create_deal(&engine, buyer, seller);
                        }
                        (engine, buyer, seller)
                    },
                    |(engine, buyer, seller)| {
                        black_box(create_deal(&engine, buyer, seller));
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    single_threaded,
    bench_single_registration,
    bench_single_deal_creation,
    bench_full_lifecycle,
    bench_creation_throughput,
    bench_lifecycle_throughput,
);

criterion_group!(rejections, bench_rejection_paths,);

criterion_group!(multi_pair, bench_multi_pair_sequential,);

criterion_group!(
    multi_threaded,
    bench_parallel_creation_same_pair,
    bench_parallel_creation_many_pairs,
    bench_parallel_lifecycles,
    bench_parallel_confirmations,
);

criterion_group!(scaling, bench_thread_scaling, bench_contention,);

criterion_group!(sweeping, bench_expiry_sweep,);

criterion_group!(reads, bench_read_models,);

criterion_group!(memory, bench_registration_volume, bench_deal_history,);

criterion_main!(
    single_threaded,
    rejections,
    multi_pair,
    multi_threaded,
    scaling,
    sweeping,
    reads,
    memory
);

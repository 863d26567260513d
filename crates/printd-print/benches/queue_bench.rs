// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the job queue hot path, payload hashing, and
// label/receipt rendering in the printd-print crate.

use std::collections::HashSet;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use printd_core::types::{Payload, PayloadKind, PrintJob};
use printd_print::JobQueue;
use printd_print::integrity::hash_bytes;
use printd_print::render::{TsplLabel, escpos_receipt};

fn job(printer: &str) -> PrintJob {
    PrintJob::new(
        printer,
        "bench",
        PayloadKind::Raw,
        Payload::inline(b"x".to_vec()),
        hash_bytes(b"x"),
        1,
    )
}

/// Submit, select, and finish 1000 jobs on one printer.
fn bench_queue_lifecycle(c: &mut Criterion) {
    c.bench_function("queue lifecycle (1000 jobs)", |b| {
        b.iter(|| {
            let queue = JobQueue::new(1000);
            for _ in 0..1000 {
                queue.submit(job("P1")).expect("submit");
            }
            while let Some(next) = queue.next() {
                queue.begin(&next.id).expect("begin");
                queue.succeed(&next.id, None).expect("succeed");
            }
            black_box(queue.pending_count());
        });
    });
}

/// Selection while most pending jobs sit behind a blocked printer.
fn bench_next_skipping(c: &mut Criterion) {
    let queue = JobQueue::new(1001);
    for _ in 0..1000 {
        queue.submit(job("Offline")).expect("submit");
    }
    queue.submit(job("Online")).expect("submit");
    let blocked: HashSet<String> = ["Offline".to_string()].into();

    c.bench_function("next_skipping (1000 blocked)", |b| {
        b.iter(|| black_box(queue.next_skipping(black_box(&blocked))));
    });
}

fn bench_payload_hash(c: &mut Criterion) {
    let data = vec![0x42u8; 1024 * 1024];
    c.bench_function("hash_bytes (1 MiB)", |b| {
        b.iter(|| black_box(hash_bytes(black_box(&data))));
    });
}

fn bench_render(c: &mut Criterion) {
    let text = "Order 1042\nLatte x2\nCroissant x1\nTotal 11.40\n".repeat(10);
    c.bench_function("tspl label render", |b| {
        b.iter(|| black_box(TsplLabel::new(40, 30).text(black_box(&text)).render()));
    });
    c.bench_function("escpos receipt render", |b| {
        b.iter(|| black_box(escpos_receipt(black_box(&text), 48)));
    });
}

criterion_group!(
    benches,
    bench_queue_lifecycle,
    bench_next_skipping,
    bench_payload_hash,
    bench_render,
);
criterion_main!(benches);

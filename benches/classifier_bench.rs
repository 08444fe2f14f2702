// Benchmark for firmware line classification
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use mmu_monitor::classifier::classify_line;
use mmu_monitor::store::MmuStore;
use mmu_shared::PrinterProfile;

fn mk3_log() -> Vec<String> {
    let mut lines = Vec::new();
    for i in 0..2_000 {
        let slot = i % 5;
        lines.push(format!("MMU2:<T{} A*", slot));
        for progress in ["5", "5", "6", "7"] {
            lines.push(format!("MMU2:<T{} P{}*", slot, progress));
        }
        lines.push("ok T:215.0 /215.0 B:60.0 /60.0".to_string());
        lines.push(format!("MMU2:<T{} F0*", slot));
    }
    lines
}

fn terse_log() -> Vec<String> {
    let mut lines = Vec::new();
    for _ in 0..2_000 {
        for line in [
            "MMU2:Unloading to FINDA",
            "MMU2:Unloading filament",
            "MMU2:OK",
            "MMU2:Feeding to FINDA",
            "MMU2:Feeding to extruder",
            "MMU2:Feeding to FSensor",
            "MMU2:OK",
            "echo:busy: processing",
        ] {
            lines.push(line.to_string());
        }
    }
    lines
}

fn run(profile: PrinterProfile, lines: &[String]) -> usize {
    let mut store = MmuStore::new();
    let mut changes = 0;
    for line in lines {
        for delta in classify_line(profile, store.state(), line) {
            if store.apply(&delta).1 {
                changes += 1;
            }
        }
    }
    changes
}

fn bench_structured(c: &mut Criterion) {
    let lines = mk3_log();
    c.bench_function("classify 14k MK3 lines", |b| {
        b.iter(|| assert!(run(PrinterProfile::Mk3, &lines) > 0));
    });
}

fn bench_terse(c: &mut Criterion) {
    let lines = terse_log();
    c.bench_function("classify 16k MK4 lines", |b| {
        b.iter(|| assert!(run(PrinterProfile::Mk4, &lines) > 0));
    });
}

criterion_group!(benches, bench_structured, bench_terse);
criterion_main!(benches);

use cellmap::models::{CellRecord, ParsedPlugin, PluginHeader, PluginRecord};
use cellmap::services::cell_conflicts::CellConflictService;
use cellmap::services::load_order::{reconcile, render_load_order};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// A modded setup: `count` plugins with 40 overworld cells each, half of them listed.
fn records(count: usize) -> Vec<PluginRecord> {
    (0..count)
        .map(|i| {
            let cells = (0..40)
                .map(|c| CellRecord {
                    form_id: c as u32,
                    editor_id: None,
                    is_persistent: false,
                    world_form_id: Some(60),
                    x: Some(((i + c) % 80) as i32 - 40),
                    y: Some((c % 60) as i32 - 30),
                })
                .collect();
            PluginRecord {
                filename: format!("Plugin{:04}.esp", i),
                last_modified: (i % 17) as i64,
                hash: format!("{:x}", i),
                size: 1024,
                parsed: Some(ParsedPlugin {
                    header: PluginHeader {
                        masters: vec!["Skyrim.esm".to_string()],
                        ..PluginHeader::default()
                    },
                    cells,
                    worlds: Vec::new(),
                }),
                parse_error: None,
                enabled: true,
            }
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let records = records(1000);
    let listed: Vec<PluginRecord> = records.iter().step_by(2).rev().cloned().collect();
    let text = render_load_order(&listed);

    c.bench_function("reconcile 1000 plugins", |b| {
        b.iter_batched(
            || records.clone(),
            |records| reconcile(records, black_box(&text)),
            BatchSize::LargeInput,
        )
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let records = records(1000);
    let service = CellConflictService::default();

    c.bench_function("aggregate 1000 plugins", |b| {
        b.iter(|| service.aggregate(black_box(&records)))
    });
}

criterion_group!(benches, bench_reconcile, bench_aggregate);
criterion_main!(benches);

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use hls_trickplay::{PlaylistSnapshot, Segment, SegmentCurator, SmallestIFramesCurator};

const SOURCE_URI: &str = "http://localhost/iframe.m3u8";

/// Two minutes of 25 fps I-frames with pseudo random sizes.
fn iframe_window(media_sequence: u64) -> PlaylistSnapshot {
    let segments = (media_sequence..media_sequence + 3000)
        .map(|sequence| {
            let length = 2_000 + (sequence * 7_919) % 3_000;
            Segment::new(format!("frame_{sequence}.ts"), 40_000).with_byte_range(0, length)
        })
        .collect();
    PlaylistSnapshot::new(SOURCE_URI, media_sequence, segments)
}

fn benchmark_curation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Curation");

    let window = iframe_window(0);
    for subset in [2, 5, 10] {
        let curator = SegmentCurator::new(subset).unwrap();
        group.bench_function(format!("Full window, subset {subset}"), |b| {
            b.iter(|| curator.curate(black_box(&window.segments), window.duration_us()))
        });
    }

    let previous = iframe_window(0);
    let latest = iframe_window(50);
    let mut engine = SmallestIFramesCurator::default();
    let curated = engine
        .generate_curated_playlist(&previous, 5, "http://localhost/iframe.m3u8#5")
        .unwrap();
    group.bench_function("Incremental update, subset 5", |b| {
        b.iter(|| {
            let mut engine = SmallestIFramesCurator::with_previous(&Default::default(), curated.clone());
            engine
                .update_current_curated(black_box(&latest), black_box(&previous), 5)
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_curation);
criterion_main!(benches);

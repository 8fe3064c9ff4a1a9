//! Benchmarks for the Grisaille transform pipeline.
//!
//! Run with: cargo bench -p grisaille-core

use std::io::Cursor;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grisaille_core::archive::ArchiveAssembler;
use grisaille_core::pipeline::{BatchProcessor, DynamicImageCodec, ImageCodec, Operation, TransformJob};
use grisaille_core::{ArchiveRequest, Config, ContentStore, MemoryContentStore};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 90]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

fn benchmark_default_sequence(c: &mut Criterion) {
    let codec = DynamicImageCodec::default();
    let bytes = jpeg(1920, 1080);
    let ops = Operation::default_sequence();

    c.bench_function("transform_1080p_default", |b| {
        b.iter(|| {
            let mut raster = codec.decode(black_box(&bytes)).unwrap();
            for op in &ops {
                raster = codec.apply(raster, op).unwrap();
            }
            codec.encode(&raster).unwrap()
        })
    });
}

fn benchmark_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryContentStore::new());
    let processor = BatchProcessor::new(DynamicImageCodec::default(), store, &Config::default())
        .with_parallel_workers(4);
    let bytes = jpeg(800, 600);

    c.bench_function("batch_16_images_4_workers", |b| {
        b.iter(|| {
            let jobs = (0..16)
                .map(|i| {
                    TransformJob::new(format!("{i}.jpg"), bytes.clone(), Operation::default_sequence())
                })
                .collect();
            rt.block_on(processor.process_batch(jobs))
        })
    });
}

fn benchmark_archive(c: &mut Criterion) {
    let store = Arc::new(MemoryContentStore::new());
    let payload = jpeg(500, 500);
    for i in 0..32 {
        store.write(&format!("{i}.jpg"), &payload).unwrap();
    }
    let staging = tempfile::tempdir().unwrap();
    let assembler = ArchiveAssembler::new(store, staging.path());
    let request: ArchiveRequest = (0..32).map(|i| format!("{i}.jpg")).collect();

    c.bench_function("archive_32_entries", |b| {
        b.iter(|| assembler.build_archive(black_box(&request)).unwrap())
    });
}

criterion_group!(
    benches,
    benchmark_default_sequence,
    benchmark_batch,
    benchmark_archive,
);
criterion_main!(benches);

//! Hash table benchmarks for chaindb
//!
//! Measures the hot paths of the chained hash tables: LIFO insertion and
//! key lookup at realistic load factors, for both the record and slab
//! variants.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use chaindb::memory::FileStorage;
use chaindb::primitives::{
    HashTableHeader, RecordHashTable, RecordManager, SlabHashTable, SlabManager,
    TABLE_HEADER_OFFSET,
};

const BUCKETS: u32 = 10_007;
const VALUE_SIZE: usize = 36;

fn record_table(dir: &TempDir) -> RecordHashTable<32> {
    let path = dir.path().join("bench_records");
    FileStorage::create(&path).unwrap();
    let storage = Arc::new(FileStorage::open(&path, 50).unwrap());

    let header = HashTableHeader::<u32>::new(storage.clone(), BUCKETS);
    let cells_offset = TABLE_HEADER_OFFSET + HashTableHeader::<u32>::size(BUCKETS);
    let manager = RecordManager::new(
        storage,
        cells_offset,
        RecordHashTable::<32>::record_size(VALUE_SIZE),
    );

    let table = RecordHashTable::new(header, manager).unwrap();
    table.create().unwrap();
    table
}

fn slab_table(dir: &TempDir) -> SlabHashTable<32> {
    let path = dir.path().join("bench_slabs");
    FileStorage::create(&path).unwrap();
    let storage = Arc::new(FileStorage::open(&path, 50).unwrap());

    let header = HashTableHeader::<u64>::new(storage.clone(), BUCKETS);
    let cells_offset = TABLE_HEADER_OFFSET + HashTableHeader::<u64>::size(BUCKETS);
    let manager = SlabManager::new(storage, cells_offset);

    let table = SlabHashTable::new(header, manager);
    table.create().unwrap();
    table
}

fn key_of(index: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&index.wrapping_mul(0x9e37_79b9_7f4a_7c15).to_le_bytes());
    key
}

fn bench_record_store(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table = record_table(&dir);
    let mut index = 0u64;

    c.bench_function("record_store", |b| {
        b.iter(|| {
            let key = key_of(index);
            index += 1;
            table
                .store(black_box(&key), |value| {
                    value.extend_from_slice(&[0xab; VALUE_SIZE])
                })
                .unwrap()
        });
    });
}

fn bench_record_find(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table = record_table(&dir);

    for index in 0..20_000u64 {
        table
            .store(&key_of(index), |value| {
                value.extend_from_slice(&[0xab; VALUE_SIZE])
            })
            .unwrap();
    }

    let mut index = 0u64;
    c.bench_function("record_find", |b| {
        b.iter(|| {
            let key = key_of(index % 20_000);
            index += 1;
            black_box(table.find(black_box(&key)).unwrap().is_some())
        });
    });
}

fn bench_slab_store(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table = slab_table(&dir);
    let payload = [0xcd_u8; 250];
    let mut index = 0u64;

    c.bench_function("slab_store", |b| {
        b.iter(|| {
            let key = key_of(index);
            index += 1;
            table
                .store(black_box(&key), payload.len() as u64, |value| {
                    value.extend_from_slice(&payload)
                })
                .unwrap()
        });
    });
}

fn bench_slab_find(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table = slab_table(&dir);
    let payload = [0xcd_u8; 250];

    for index in 0..20_000u64 {
        table
            .store(&key_of(index), payload.len() as u64, |value| {
                value.extend_from_slice(&payload)
            })
            .unwrap();
    }

    let mut index = 0u64;
    c.bench_function("slab_find", |b| {
        b.iter(|| {
            let key = key_of(index % 20_000);
            index += 1;
            black_box(table.find(black_box(&key)).unwrap().is_some())
        });
    });
}

criterion_group!(
    benches,
    bench_record_store,
    bench_record_find,
    bench_slab_store,
    bench_slab_find
);
criterion_main!(benches);

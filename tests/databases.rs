//! # Table Database Scenarios
//!
//! End-to-end coverage of the four table files through an open store:
//! blocks by hash and height, transactions with arrival order, spends,
//! and address histories.

use tempfile::TempDir;

use chaindb::{Settings, Store};

fn open_store(dir: &TempDir, index_addresses: bool) -> Store {
    let mut settings = Settings::with_directory(dir.path().join("chain"));
    settings.block_table_buckets = 100;
    settings.transaction_table_buckets = 100;
    settings.spend_table_buckets = 100;
    settings.history_table_buckets = 100;
    settings.index_addresses = index_addresses;

    Store::create(&settings).unwrap();
    Store::open(settings).unwrap()
}

fn fake_hash(seed: u8) -> [u8; 32] {
    let mut hash = [seed; 32];
    hash[0] = seed.wrapping_mul(31);
    hash
}

#[test]
fn blocks_by_hash_and_by_height() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, false);
    let blocks = store.blocks();

    assert_eq!(blocks.height(), None);

    let genesis_hash = fake_hash(1);
    let next_hash = fake_hash(2);

    let genesis_offset = blocks.store(&genesis_hash, 0, b"genesis-payload").unwrap();
    let next_offset = blocks.store(&next_hash, 1, b"block-one").unwrap();

    // Reachable by hash before indexing, not yet by height.
    let result = blocks.get(&genesis_hash).unwrap().expect("stored by hash");
    assert_eq!(result.height(), 0);
    assert_eq!(result.bytes(), b"genesis-payload");
    drop(result);

    assert_eq!(blocks.index(genesis_offset).unwrap(), 0);
    assert_eq!(blocks.index(next_offset).unwrap(), 1);
    assert_eq!(blocks.height(), Some(1));

    let result = blocks.get_by_height(1).unwrap();
    assert_eq!(result.bytes(), b"block-one");
    drop(result);

    // The header index advances independently.
    assert_eq!(blocks.header_height(), None);
    assert_eq!(blocks.index_header(genesis_offset).unwrap(), 0);
    assert_eq!(blocks.header_height(), Some(0));
    let header = blocks.get_header_by_height(0).unwrap();
    assert_eq!(header.bytes(), b"genesis-payload");
    drop(header);

    store.commit().unwrap();
    store.close().unwrap();
}

#[test]
fn transactions_store_get_and_arrival_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, false);
    let transactions = store.transactions();

    let hash1 = fake_hash(10);
    let hash2 = fake_hash(20);

    transactions.store(&hash1, 110, 88, b"first-transaction").unwrap();
    transactions.store(&hash2, 4, 6, b"second-transaction").unwrap();

    let result1 = transactions.get(&hash1).unwrap().expect("tx1 stored");
    assert_eq!(result1.height(), 110);
    assert_eq!(result1.position(), 88);
    assert_eq!(result1.bytes(), b"first-transaction");
    drop(result1);

    let result2 = transactions.get(&hash2).unwrap().expect("tx2 stored");
    assert_eq!(result2.height(), 4);
    assert_eq!(result2.position(), 6);
    drop(result2);

    assert_eq!(transactions.count(), 2);
    let by_number = transactions.get_by_number(1).unwrap();
    assert_eq!(by_number.bytes(), b"second-transaction");
    drop(by_number);

    assert!(transactions.get(&fake_hash(99)).unwrap().is_none());

    store.commit().unwrap();
    store.close().unwrap();
}

#[test]
fn spends_map_outpoints_to_inpoints() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, false);
    let spends = store.spends();

    let mut outpoint = [0u8; 36];
    outpoint[..32].copy_from_slice(&fake_hash(3));
    outpoint[32..].copy_from_slice(&7u32.to_le_bytes());

    let mut inpoint = [0u8; 36];
    inpoint[..32].copy_from_slice(&fake_hash(4));
    inpoint[32..].copy_from_slice(&0u32.to_le_bytes());

    spends.store(&outpoint, &inpoint).unwrap();
    assert_eq!(spends.get(&outpoint).unwrap(), Some(inpoint));

    let info = spends.statinfo();
    assert_eq!(info.buckets, 100);
    assert_eq!(info.rows, 1);

    assert!(spends.unlink(&outpoint).unwrap());
    assert_eq!(spends.get(&outpoint).unwrap(), None);
    assert!(!spends.unlink(&outpoint).unwrap());

    // Unlinked rows stay allocated: space is leaked by design.
    assert_eq!(spends.statinfo().rows, 1);

    store.commit().unwrap();
    store.close().unwrap();
}

#[test]
fn histories_accumulate_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir, true);
    let history = store.history().expect("address indexing enabled");

    let address1 = [0xaau8; 20];
    let address2 = [0xbbu8; 20];

    history.store(&address1, |row| row.extend_from_slice(&[1u8; 48])).unwrap();
    history.store(&address1, |row| row.extend_from_slice(&[2u8; 48])).unwrap();
    history.store(&address2, |row| row.extend_from_slice(&[3u8; 48])).unwrap();

    let rows = history.get(&address1, None).unwrap();
    assert_eq!(rows, vec![[2u8; 48], [1u8; 48]]);

    let limited = history.get(&address1, Some(1)).unwrap();
    assert_eq!(limited, vec![[2u8; 48]]);

    assert_eq!(history.get(&address2, None).unwrap(), vec![[3u8; 48]]);
    assert!(history.get(&[0u8; 20], None).unwrap().is_empty());

    // Popping rows newest-first until the mapping disappears.
    assert!(history.unlink(&address1).unwrap());
    assert_eq!(history.get(&address1, None).unwrap(), vec![[1u8; 48]]);
    assert!(history.unlink(&address1).unwrap());
    assert!(history.get(&address1, None).unwrap().is_empty());
    assert!(!history.unlink(&address1).unwrap());

    assert_eq!(history.statinfo().rows, 3);

    store.commit().unwrap();
    store.close().unwrap();
}

#[test]
fn histories_persist_across_sessions() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::with_directory(dir.path().join("chain"));
    settings.block_table_buckets = 100;
    settings.transaction_table_buckets = 100;
    settings.spend_table_buckets = 100;
    settings.history_table_buckets = 100;
    settings.index_addresses = true;

    Store::create(&settings).unwrap();

    let address = [0xccu8; 20];
    {
        let store = Store::open(settings.clone()).unwrap();
        let history = store.history().unwrap();
        history.store(&address, |row| row.extend_from_slice(&[7u8; 48])).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
    }

    let store = Store::open(settings).unwrap();
    let rows = store.history().unwrap().get(&address, None).unwrap();
    assert_eq!(rows, vec![[7u8; 48]]);
    store.close().unwrap();
}

// SPDX-License-Identifier: MIT
//
// End-to-end scenarios against a live `Engine`, covering the concrete
// round-trip, migration, bulk-cycle, and reader/writer coexistence cases.

use behaviordb::{Config, Engine, NPOS};
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> Engine {
    Engine::open(Config::builder(dir).min_size(32).prefix_bits(20).dir_count(16).handle_range(0, 100_000).build()).unwrap()
}

#[test]
fn single_small_blob_round_trip() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let h = db.put(b"yang").unwrap();
    let mut buf = [0u8; 64];
    let n = db.get(h, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"yang");
    db.del(h).unwrap();
    assert!(!db.is_acquired(h));
}

#[test]
fn append_within_same_size_class() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let h = db.put(b"yang").unwrap();
    let h2 = db.insert(h, NPOS, b"acer").unwrap();
    assert_eq!(h, h2);
    let mut buf = [0u8; 32];
    let n = db.get(h2, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"yangacer");
}

#[test]
fn overflow_past_dir_zero_migrates_keeping_handle() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let a = vec![b'A'; 30];
    let h = db.put(&a).unwrap();
    let b = vec![b'B'; 10];
    let h2 = db.insert(h, NPOS, &b).unwrap();
    assert_eq!(h, h2);

    let mut expected = a;
    expected.extend_from_slice(&b);
    let mut buf = vec![0u8; 64];
    let n = db.get(h2, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], expected.as_slice());
}

#[test]
fn ten_thousand_put_then_delete_restores_full_availability() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let handles: Vec<_> = (0..10_000).map(|_| db.put(b"acer").unwrap()).collect();
    for h in handles {
        db.del(h).unwrap();
    }
    // A fresh put after full drain proves the bitmap/handle table recovered.
    let h = db.put(b"acer").unwrap();
    assert!(db.is_acquired(h));
    let mut buf = [0u8; 8];
    let n = db.get(h, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"acer");
}

#[test]
fn streamed_write_assembles_ten_chunks_of_ten_bytes() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let s = db.ostream(100).unwrap();
    for k in 0..10u8 {
        db.stream_write(s, &[k; 10]).unwrap();
    }
    let h = db.stream_finish(s).unwrap().unwrap();
    let mut buf = [0u8; 100];
    let n = db.get(h, 0, &mut buf).unwrap();
    assert_eq!(n, 100);
    for k in 0..10usize {
        assert_eq!(&buf[k * 10..k * 10 + 10], &[k as u8; 10]);
    }
}

#[test]
fn reader_pinning_keeps_the_old_body_visible_until_its_own_finish() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let h = db.put(b"0123456789").unwrap();

    let r = db.istream(10, h, 0).unwrap();
    let mut before = [0u8; 10];
    assert_eq!(db.stream_read(r, &mut before).unwrap(), 10);
    assert_eq!(&before, b"0123456789");

    let w = db.ostream_existing(6, h, 10).unwrap();
    db.stream_write(w, b"abcdef").unwrap();
    let h2 = db.stream_finish(w).unwrap().unwrap();
    assert_eq!(h2, h);

    // The reader's stream source address is untouched; completing it now
    // performs the deferred free the concurrent writer left pending.
    db.stream_finish(r).unwrap();

    let mut buf = [0u8; 32];
    let n = db.get(h, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"0123456789abcdef");
}

#[test]
fn partial_erase_shifts_the_tail_left() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let h = db.put(b"helloworld").unwrap();
    let new_size = db.erase(h, 2, 3).unwrap();
    assert_eq!(new_size, 7);
    let mut buf = [0u8; 32];
    let n = db.get(h, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"heworld");
}

#[test]
fn get_to_vec_reads_the_whole_blob_without_a_preallocated_buffer() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    let payload = vec![b'q'; 500];
    let h = db.put(&payload).unwrap();
    let mut out = Vec::new();
    let n = db.get_to_vec(h, 0, 1 << 16, &mut out).unwrap();
    assert_eq!(n, 500);
    assert_eq!(out, payload);
}

#[test]
fn address_iteration_and_stats_agree_on_live_count() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    for _ in 0..5 {
        db.put(b"x").unwrap();
    }
    assert_eq!(db.addresses().count(), 5);
    let stats = db.stats();
    assert_eq!(stats.handles_acquired, 5);
}

#[test]
fn reopen_after_restart_resolves_surviving_handles() {
    let dir = tempdir().unwrap();
    let h = {
        let mut db = open(dir.path());
        db.put(b"durable").unwrap()
    };
    let mut db2 = open(dir.path());
    assert!(db2.is_acquired(h));
    let mut buf = [0u8; 16];
    let n = db2.get(h, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"durable");
}

//! Concurrency and thread safety tests for vpdedup

use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use vpdedup::{
    BackendConfig, Fingerprint, HashStore, IndexConfig, MatchEngine, MatchMetrics, MatchMode,
    MatchStats, VpTree, set_match_metrics,
};

fn word(v: u64) -> Fingerprint {
    Fingerprint::from_words("ahash64", 64, &[v]).unwrap()
}

#[test]
fn concurrent_writers_and_readers_share_one_store() {
    let store: Arc<dyn HashStore> = Arc::from(
        BackendConfig::tree_with(IndexConfig::new().with_allow_duplicates(false))
            .build(MatchEngine::with_defaults())
            .unwrap(),
    );
    let barrier = Arc::new(Barrier::new(12));

    let writers: Vec<_> = (0..4u64)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Every writer stores the same 100 hashes; only one copy survives.
                for i in 0..100u64 {
                    store.store(word(i << 8).with_provenance(format!("w{t}/{i}"))).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..8u64)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    let hits = store.all_within(&word(t << 8), 8.0).unwrap();
                    assert!(hits.iter().all(|n| n.distance <= 8.0));
                    let _ = store.find_matches(MatchMode::Strict).unwrap();
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    assert_eq!(store.len().unwrap(), 100);
    assert!(store.find_matches(MatchMode::Exact).unwrap().is_empty());
}

#[test]
fn shared_tree_answers_identically_across_threads() {
    let items: Vec<_> = (0..2_000u64).map(|i| word(i.wrapping_mul(0xA24B_AED4_963E_E407))).collect();
    let tree = Arc::new(VpTree::build(items, IndexConfig::new().with_parallel_threshold(100)).unwrap());
    let query = word(0xDEAD_BEEF);
    let expected = tree.k_nearest(&query, 10).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tree = Arc::clone(&tree);
            let query = query.clone();
            thread::spawn(move || tree.k_nearest(&query, 10).unwrap())
        })
        .collect();

    for handle in handles {
        let got = handle.join().unwrap();
        let distances: Vec<_> = got.iter().map(|n| n.distance).collect();
        let want: Vec<_> = expected.iter().map(|n| n.distance).collect();
        assert_eq!(distances, want);
    }
}

#[derive(Default)]
struct CountingMetrics {
    calls: Mutex<Vec<(MatchMode, u64)>>,
}

impl MatchMetrics for CountingMetrics {
    fn record_match(&self, mode: MatchMode, _latency: Duration, stats: &MatchStats) {
        self.calls.lock().unwrap().push((mode, stats.matched));
    }
}

#[test]
fn metrics_observer_sees_every_concurrent_run() {
    let metrics = Arc::new(CountingMetrics::default());
    set_match_metrics(Some(metrics.clone() as Arc<dyn MatchMetrics>));

    let engine = Arc::new(MatchEngine::with_defaults());
    let items: Arc<Vec<_>> = Arc::new((0..64u64).map(|i| word(i / 2)).collect());
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let items = Arc::clone(&items);
            thread::spawn(move || engine.find_matches(&items, MatchMode::Exact).len())
        })
        .collect();
    let counts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    set_match_metrics(None);

    assert!(counts.iter().all(|&c| c == 32));
    let calls = metrics.calls.lock().unwrap();
    let ours = calls
        .iter()
        .filter(|(mode, matched)| *mode == MatchMode::Exact && *matched == 32)
        .count();
    assert_eq!(ours, 6);
}

use std::env;
use std::error::Error;

use vpdedup::{Fingerprint, MatchMode, VpdedupConfig, group_matches, init_logging, open_store};

/// Small end-to-end demo: load `VPDEDUP_CONFIG` (or defaults), store a batch of
/// synthetic near-duplicate hashes and print the duplicate groups.
fn main() -> Result<(), Box<dyn Error>> {
    let config = match env::var("VPDEDUP_CONFIG") {
        Ok(path) => VpdedupConfig::from_file(path)?,
        Err(_) => VpdedupConfig::default(),
    };
    init_logging(&config)?;

    let store = open_store(&config)?;
    let batch = (0..64u64)
        .map(|i| {
            // Eight "originals", each with seven copies a couple of bits off.
            let base = (i / 8).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            let noise = (i % 8) & 0b11;
            Fingerprint::from_words("dhash64", 64, &[base ^ noise])
                .map(|fp| fp.with_provenance(format!("/photos/{i:03}.jpg")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    store.store_all(batch)?;

    let mode = config.matcher.mode;
    let records = store.find_matches(mode)?;
    let groups = group_matches(&records);
    println!(
        "{} fingerprints in {} store, {} matches under {mode}, {} duplicate groups",
        store.len()?,
        store.backend_name(),
        records.len(),
        groups.len()
    );

    let query = Fingerprint::from_words("dhash64", 64, &[1])?;
    if let Some(nearest) = store.nearest_neighbor(&query)? {
        println!(
            "nearest to query: {} at distance {}",
            nearest.provenance().unwrap_or("<unknown>"),
            query.distance(&nearest)?
        );
    }
    for mode in MatchMode::ALL {
        println!("{mode}: {} matches", store.find_matches(mode)?.len());
    }
    Ok(())
}

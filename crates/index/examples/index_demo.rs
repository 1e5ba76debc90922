use fingerprint::Fingerprint;
use index::{IndexConfig, IndexError, VpTree};

fn main() -> Result<(), IndexError> {
    // Seed the tree with a handful of dHash values from two near-duplicate families.
    let hashes = [
        ("beach.jpg", 0xF0F0_F0F0_0F0F_0F0Fu64),
        ("beach_small.jpg", 0xF0F0_F0F0_0F0F_0F0E),
        ("beach_crop.jpg", 0xF0F0_F0F1_0F0F_0F1E),
        ("city.png", 0x0123_4567_89AB_CDEF),
        ("city_edit.png", 0x0123_4567_89AB_CDEE),
        ("forest.webp", 0xAAAA_5555_AAAA_5555),
    ];
    let items = hashes
        .iter()
        .map(|(path, word)| Ok(Fingerprint::from_words("dhash64", 64, &[*word])?.with_provenance(*path)))
        .collect::<Result<Vec<_>, IndexError>>()?;

    let mut tree = VpTree::build(items, IndexConfig::default().with_seed(42))?;
    println!("Indexed {} fingerprints (depth {}).", tree.len(), tree.depth());

    let query = Fingerprint::from_words("dhash64", 64, &[0xF0F0_F0F0_0F0F_0F0C])?;
    for hit in tree.k_nearest(&query, 3)? {
        println!(
            "  {:>16} at distance {}",
            hit.fingerprint.provenance().unwrap_or("?"),
            hit.distance
        );
    }

    let close = tree.within(&query, 6.0)?;
    println!("{} fingerprints within distance 6.", close.len());

    tree.insert(Fingerprint::from_words("dhash64", 64, &[0xAAAA_5555_AAAA_5554])?.with_provenance("forest_2.webp"))?;
    tree.rebuild()?;
    println!("After insert + rebuild: {} members, depth {}.", tree.len(), tree.depth());

    Ok(())
}

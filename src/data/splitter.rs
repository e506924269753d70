// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Splits caption samples into a training and a validation set.
//
// Why not just shuffle the rows?
//   Every Flickr8K image has five captions. Shuffling rows and
//   cutting at 80% would put captions of the same image on both
//   sides, so validation would score the model on images it has
//   already been trained on.
//
// Instead we:
//   1. Group rows by image (its feature file)
//   2. Shuffle the distinct images
//   3. Cut the image list at floor(images * fraction)
//   4. Expand each side back into its caption rows
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: Rust Book §8 (Vectors, Hash Maps)
//            rand crate documentation

use rand::{seq::SliceRandom, Rng};
use std::{collections::HashMap, hash::Hash};

/// Shuffle `samples` and split into (train, validation).
///
/// The cut point is floor(len * train_fraction), clamped to len.
pub fn split_train_val<T, R: Rng + ?Sized>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).floor() as usize;
    let split_at = split_at.min(total);

    // split_off(n) removes elements [n..] and returns them
    let val = samples.split_off(split_at);
    (samples, val)
}

/// Split `items` so that all items sharing a key land on the same side.
///
/// Groups keep the order in which their items appeared; it is the
/// groups themselves that are shuffled.
pub fn split_grouped<T, K, F, R>(
    items:          Vec<T>,
    key:            F,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>)
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
    R: Rng + ?Sized,
{
    let total = items.len();

    // First-seen order of keys, so results only depend on the rng
    let mut order:  Vec<K>             = Vec::new();
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    for item in items {
        let k = key(&item);
        groups
            .entry(k.clone())
            .or_insert_with(|| {
                order.push(k);
                Vec::new()
            })
            .push(item);
    }

    let (train_keys, val_keys) = split_train_val(order, train_fraction, rng);

    let mut expand = |keys: Vec<K>| -> Vec<T> {
        keys.into_iter()
            .flat_map(|k| groups.remove(&k).unwrap_or_default())
            .collect()
    };
    let train = expand(train_keys);
    let val   = expand(val_keys);

    tracing::debug!(
        "Grouped split: {} train, {} validation ({}% / {}%)",
        train.len(),
        val.len(),
        (train.len() * 100) / total.max(1),
        (val.len()   * 100) / total.max(1),
    );

    (train, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, &mut rng());
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_split_floors_the_cut() {
        // 9 * 0.8 = 7.2 → 7
        let items: Vec<usize> = (0..9).collect();
        let (train, val)      = split_train_val(items, 0.8, &mut rng());
        assert_eq!(train.len(), 7);
        assert_eq!(val.len(),   2);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, val)      = split_train_val(items, 0.7, &mut rng());
        assert_eq!(train.len() + val.len(), 50);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.8, &mut rng());
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn test_grouped_split_has_no_leakage() {
        // 10 images × 5 captions each
        let items: Vec<(usize, usize)> = (0..10)
            .flat_map(|img| (0..5).map(move |cap| (img, cap)))
            .collect();

        let (train, val) = split_grouped(items, |&(img, _)| img, 0.8, &mut rng());

        assert_eq!(train.len(), 40);
        assert_eq!(val.len(),   10);

        let train_imgs: HashSet<usize> = train.iter().map(|&(img, _)| img).collect();
        let val_imgs:   HashSet<usize> = val.iter().map(|&(img, _)| img).collect();
        assert_eq!(train_imgs.len(), 8);
        assert_eq!(val_imgs.len(),   2);
        assert!(train_imgs.is_disjoint(&val_imgs));
    }

    #[test]
    fn test_grouped_split_is_reproducible_with_seed() {
        let items: Vec<usize> = (0..30).collect();
        let a = split_grouped(items.clone(), |&i| i % 6, 0.5, &mut rng());
        let b = split_grouped(items,         |&i| i % 6, 0.5, &mut rng());
        assert_eq!(a, b);
    }
}

//! Seed-addressable shuffles.
//!
//! Both shuffles draw from ChaCha8 keyed by the seed (8 little-endian bytes,
//! zero padded to 32). The hierarchy shuffle reads stream 0 and the option
//! shuffle for the question at 1-based position `idx` reads stream `idx`, so
//! every order can be rebuilt from `(seed, idx)` alone. The Fisher–Yates loop
//! and the index reduction below are part of that contract.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::models::{CanonicalSet, QuestionHierarchy, QuestionKind, QuizOption, Seed};

const HIERARCHY_STREAM: u64 = 0;

fn rng_for(seed: Seed, stream: u64) -> ChaCha8Rng {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.0.to_le_bytes());
    let mut rng = ChaCha8Rng::from_seed(key);
    rng.set_stream(stream);
    rng
}

/// Uniform index in `0..bound` via a widening multiply.
fn bounded(rng: &mut ChaCha8Rng, bound: usize) -> usize {
    ((rng.next_u64() as u128 * bound as u128) >> 64) as usize
}

/// Permutation of `0..len` where position `d` holds the source index shown
/// there.
fn permutation(seed: Seed, stream: u64, len: usize) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..len).collect();
    if len < 2 {
        return perm;
    }
    let mut rng = rng_for(seed, stream);
    for i in (1..len).rev() {
        let j = bounded(&mut rng, i + 1);
        perm.swap(i, j);
    }
    perm
}

/// Reorders the top-level nodes of `hierarchy`. Group children keep their
/// relative order.
pub fn shuffle_hierarchy(seed: Seed, hierarchy: &QuestionHierarchy) -> QuestionHierarchy {
    hierarchy.permuted(&permutation(seed, HIERARCHY_STREAM, hierarchy.len()))
}

/// Display permutation of a question's options at 1-based position `idx`.
/// Entry `d` is the canonical index of the option displayed at `d`.
pub fn option_permutation(seed: Seed, idx: usize, len: usize) -> Vec<usize> {
    permutation(seed, idx as u64, len)
}

/// Options in the order they are displayed for position `idx`.
pub fn shuffle_options(seed: Seed, idx: usize, options: &[QuizOption]) -> Vec<QuizOption> {
    option_permutation(seed, idx, options.len())
        .into_iter()
        .map(|i| options[i].clone())
        .collect()
}

/// Result of drawing a seed for a new attempt.
#[derive(Debug, Clone)]
pub struct SeedDraw {
    pub seed: Seed,
    pub hierarchy: QuestionHierarchy,
    /// False when every draw left some ordering question in its solved order.
    pub ordering_scrambled: bool,
    pub draws: u32,
}

/// Lays out `hierarchy` for a new attempt with `seed`.
pub fn arrange(seed: Seed, hierarchy: &QuestionHierarchy, keep_order: bool) -> QuestionHierarchy {
    if keep_order {
        hierarchy.clone()
    } else {
        shuffle_hierarchy(seed, hierarchy)
    }
}

/// True when no ordering question with two or more options is displayed in
/// its canonical (solved) order.
pub fn ordering_scrambled(seed: Seed, arranged: &QuestionHierarchy, set: &CanonicalSet) -> bool {
    arranged
        .flatten()
        .iter()
        .enumerate()
        .filter_map(|(i, id)| set.question(id).map(|q| (i + 1, q)))
        .filter(|(_, q)| q.kind == QuestionKind::Ordering && q.options.len() > 1)
        .all(|(idx, q)| {
            option_permutation(seed, idx, q.options.len())
                .iter()
                .enumerate()
                .any(|(d, &c)| d != c)
        })
}

/// Draws seeds from `next_seed` until ordering questions are scrambled or
/// `max_draws` is exhausted, in which case the last draw is kept.
pub fn draw_seed<F>(
    set: &CanonicalSet,
    hierarchy: &QuestionHierarchy,
    keep_order: bool,
    max_draws: u32,
    mut next_seed: F,
) -> SeedDraw
where
    F: FnMut() -> Seed,
{
    let max_draws = max_draws.max(1);
    let mut draws = 0;
    loop {
        draws += 1;
        let seed = next_seed();
        let arranged = arrange(seed, hierarchy, keep_order);
        let scrambled = ordering_scrambled(seed, &arranged, set);
        if scrambled || draws >= max_draws {
            return SeedDraw {
                seed,
                hierarchy: arranged,
                ordering_scrambled: scrambled,
                draws,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HierarchyNode, Question};
    use proptest::prelude::*;

    fn flat(n: usize) -> QuestionHierarchy {
        QuestionHierarchy::from_question_ids((1..=n).map(|i| format!("q{}", i))).unwrap()
    }

    fn options(n: usize) -> Vec<QuizOption> {
        (1..=n)
            .map(|i| QuizOption {
                key: format!("key-{}", i),
                label: String::new(),
                text: format!("option {}", i),
                correctness: i == 1,
                rendered_url: None,
            })
            .collect()
    }

    fn ordering_set(option_count: usize) -> CanonicalSet {
        CanonicalSet {
            id: "set".to_string(),
            unit_id: "unit".to_string(),
            hierarchy: flat(1),
            questions: vec![Question {
                external_id: "q1".to_string(),
                kind: QuestionKind::Ordering,
                stem: String::new(),
                options: options(option_count),
                point: 1,
                group_id: None,
            }],
        }
    }

    // Stored attempts are replayed from their seed, so these orders must never
    // change across releases.
    #[test]
    fn permutations_match_recorded_vectors() {
        assert_eq!(permutation(Seed(42), 0, 10), vec![7, 6, 5, 1, 0, 4, 8, 9, 2, 3]);
        assert_eq!(permutation(Seed(0), 0, 6), vec![1, 2, 4, 0, 3, 5]);
        assert_eq!(option_permutation(Seed(42), 3, 5), vec![0, 1, 3, 4, 2]);
        assert_eq!(option_permutation(Seed(7), 1, 4), vec![2, 1, 0, 3]);

        let ids = shuffle_hierarchy(Seed(42), &flat(10)).flatten();
        assert_eq!(
            ids,
            vec!["q8", "q7", "q6", "q2", "q1", "q5", "q9", "q10", "q3", "q4"]
        );
    }

    #[test]
    fn shuffle_is_reproducible() {
        let hierarchy = flat(20);
        assert_eq!(
            shuffle_hierarchy(Seed(7), &hierarchy),
            shuffle_hierarchy(Seed(7), &hierarchy)
        );
    }

    #[test]
    fn different_seeds_give_different_orders() {
        let hierarchy = flat(20);
        assert_ne!(
            shuffle_hierarchy(Seed(1), &hierarchy).flatten(),
            shuffle_hierarchy(Seed(2), &hierarchy).flatten()
        );
    }

    #[test]
    fn group_children_stay_together_in_order() {
        let hierarchy = QuestionHierarchy::new(vec![
            HierarchyNode::question("q1"),
            HierarchyNode::group("g1", ["q2", "q3", "q4"]),
            HierarchyNode::question("q5"),
            HierarchyNode::question("q6"),
        ])
        .unwrap();

        for seed in 0..50 {
            let ids = shuffle_hierarchy(Seed(seed), &hierarchy).flatten();
            let start = ids.iter().position(|id| id == "q2").unwrap();
            assert_eq!(&ids[start..start + 3], &["q2", "q3", "q4"]);
        }
    }

    #[test]
    fn single_and_empty_hierarchies_are_unchanged() {
        assert_eq!(shuffle_hierarchy(Seed(9), &flat(1)), flat(1));
        assert_eq!(shuffle_hierarchy(Seed(9), &flat(0)), flat(0));
    }

    #[test]
    fn option_order_depends_on_position() {
        let opts = options(8);
        let first = shuffle_options(Seed(5), 1, &opts);
        assert!((2..10).any(|idx| shuffle_options(Seed(5), idx, &opts) != first));
        assert_eq!(
            shuffle_options(Seed(5), 3, &opts),
            shuffle_options(Seed(5), 3, &opts)
        );
    }

    #[test]
    fn keep_order_skips_top_level_shuffle() {
        let hierarchy = flat(10);
        assert_eq!(arrange(Seed(3), &hierarchy, true), hierarchy);
    }

    #[test]
    fn draw_seed_retries_until_ordering_is_scrambled() {
        let set = ordering_set(2);
        let solved: Vec<u64> = (0..200)
            .filter(|s| !ordering_scrambled(Seed(*s), &set.hierarchy, &set))
            .take(2)
            .collect();
        let scrambled = (0..200)
            .find(|s| ordering_scrambled(Seed(*s), &set.hierarchy, &set))
            .unwrap();

        let mut seeds = vec![solved[0], solved[1], scrambled].into_iter();
        let draw = draw_seed(&set, &set.hierarchy, false, 10, || {
            Seed(seeds.next().unwrap())
        });
        assert_eq!(draw.seed, Seed(scrambled));
        assert_eq!(draw.draws, 3);
        assert!(draw.ordering_scrambled);
    }

    #[test]
    fn draw_seed_keeps_last_seed_when_exhausted() {
        let set = ordering_set(2);
        let solved = (0..200)
            .find(|s| !ordering_scrambled(Seed(*s), &set.hierarchy, &set))
            .unwrap();
        let draw = draw_seed(&set, &set.hierarchy, false, 3, || Seed(solved));
        assert_eq!(draw.draws, 3);
        assert!(!draw.ordering_scrambled);
    }

    #[test]
    fn single_option_ordering_needs_no_redraw() {
        let set = ordering_set(1);
        let draw = draw_seed(&set, &set.hierarchy, false, 10, || Seed(11));
        assert_eq!(draw.draws, 1);
        assert!(draw.ordering_scrambled);
    }

    proptest! {
        #[test]
        fn hierarchy_shuffle_is_a_permutation(seed in any::<u64>(), n in 0usize..40) {
            let hierarchy = flat(n);
            let mut shuffled = shuffle_hierarchy(Seed(seed), &hierarchy).flatten();
            shuffled.sort();
            let mut original = hierarchy.flatten();
            original.sort();
            prop_assert_eq!(shuffled, original);
        }

        #[test]
        fn option_permutation_is_a_bijection(seed in any::<u64>(), idx in 1usize..500, len in 0usize..12) {
            let mut perm = option_permutation(Seed(seed), idx, len);
            perm.sort_unstable();
            prop_assert_eq!(perm, (0..len).collect::<Vec<_>>());
        }
    }
}

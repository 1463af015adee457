//! Property-based tests for distribution merging.

use super::distribution::{merge, Distribution};
use proptest::prelude::*;

fn build(template: &Distribution, samples: &[f64]) -> Distribution {
    let mut dist = template.clone();
    for sample in samples {
        dist.add_sample(*sample).unwrap();
    }
    dist
}

fn templates() -> impl Strategy<Value = Distribution> {
    prop_oneof![
        (1usize..12, 1.1f64..4.0, 0.1f64..10.0)
            .prop_map(|(n, g, s)| Distribution::create_exponential(n, g, s).unwrap()),
        (1usize..12, 0.5f64..20.0, -50.0f64..50.0)
            .prop_map(|(n, w, o)| Distribution::create_linear(n, w, o).unwrap()),
        prop::collection::btree_set(-100i32..100, 0..8).prop_map(|bounds| {
            let bounds: Vec<f64> = bounds.into_iter().map(f64::from).collect();
            Distribution::create_explicit(&bounds).unwrap()
        }),
    ]
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

proptest! {
    #[test]
    fn test_split_then_merge_matches_whole(
        template in templates(),
        samples in prop::collection::vec(-200.0f64..200.0, 0..60),
        split in any::<prop::sample::Index>(),
    ) {
        let cut = split.index(samples.len() + 1);
        let (left, right) = samples.split_at(cut);

        let whole = build(&template, &samples);
        let prior = build(&template, left);
        let mut latest = build(&template, right);
        merge(&prior, &mut latest).unwrap();

        prop_assert_eq!(latest.count(), whole.count());
        prop_assert_eq!(latest.bucket_counts(), whole.bucket_counts());
        prop_assert_eq!(latest.minimum(), whole.minimum());
        prop_assert_eq!(latest.maximum(), whole.maximum());
        prop_assert!(close(latest.mean(), whole.mean()), "{} vs {}", latest.mean(), whole.mean());
        prop_assert!(
            close(latest.sum_of_squared_deviation(), whole.sum_of_squared_deviation()),
            "{} vs {}",
            latest.sum_of_squared_deviation(),
            whole.sum_of_squared_deviation()
        );
    }

    #[test]
    fn test_merge_order_does_not_matter(
        template in templates(),
        a in prop::collection::vec(-200.0f64..200.0, 1..30),
        b in prop::collection::vec(-200.0f64..200.0, 1..30),
    ) {
        let da = build(&template, &a);
        let db = build(&template, &b);

        let mut ab = db.clone();
        merge(&da, &mut ab).unwrap();
        let mut ba = da.clone();
        merge(&db, &mut ba).unwrap();

        prop_assert_eq!(ab.count(), ba.count());
        prop_assert_eq!(ab.bucket_counts(), ba.bucket_counts());
        prop_assert_eq!(ab.minimum(), ba.minimum());
        prop_assert_eq!(ab.maximum(), ba.maximum());
        prop_assert!(close(ab.mean(), ba.mean()));
    }
}

use rand::rngs::StdRng;
use rand::SeedableRng;
use relay_core::RelayError;
use relay_sampler::{Weighted, WeightedSampler};

#[test]
fn test_rejects_invalid_tables() {
    let empty: Vec<Weighted<&str>> = Vec::new();
    assert!(matches!(WeightedSampler::new(empty), Err(RelayError::InvalidArgument(_))));

    for bad in [-1.0, f64::NAN, f64::INFINITY] {
        let table = vec![Weighted::new("a", 1.0), Weighted::new("b", bad)];
        assert!(matches!(WeightedSampler::new(table), Err(RelayError::InvalidArgument(_))));
    }

    let zeros = vec![Weighted::new("a", 0.0), Weighted::new("b", 0.0)];
    assert!(matches!(WeightedSampler::new(zeros), Err(RelayError::InvalidArgument(_))));
}

#[test]
fn test_single_value_is_always_drawn() {
    let sampler = WeightedSampler::new(vec![Weighted::new("only", 0.2)]).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        assert_eq!(*sampler.sample(&mut rng), "only");
    }
    assert_eq!(sampler.next_from_sample(), "only");
    assert_eq!(sampler.len(), 1);
    assert!(!sampler.is_empty());
}

#[test]
fn test_frequencies_converge_to_weights() {
    let weights = [1.0, 2.0, 7.0];
    let table: Vec<Weighted<usize>> = weights.iter().enumerate().map(|(i, &w)| (i, w).into()).collect();
    let sampler = WeightedSampler::new(table).unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    let draws = 100_000;
    let mut counts = [0usize; 3];
    for _ in 0..draws {
        counts[*sampler.sample(&mut rng)] += 1;
    }

    for (i, &w) in weights.iter().enumerate() {
        let observed = counts[i] as f64 / draws as f64;
        let expected = w / 10.0;
        assert!(
            (observed - expected).abs() < 0.01,
            "value {i}: observed {observed}, expected {expected}"
        );
    }
}

#[test]
fn test_zero_weight_values_never_drawn() {
    let sampler = WeightedSampler::new(vec![
        Weighted::new("never", 0.0),
        Weighted::new("sometimes", 1.0),
        Weighted::new("often", 3.0),
    ])
    .unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..10_000 {
        assert_ne!(*sampler.sample(&mut rng), "never");
    }
}

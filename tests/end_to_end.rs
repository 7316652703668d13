use approx::assert_relative_eq;
use design_stats::prelude::*;
use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Outcomes with a true effect of 2 and a block-level shift
fn blocked_experiment(seed: u64) -> (Vec<f64>, Vec<f64>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut y = Vec::new();
    let mut z = Vec::new();
    let mut blocks = Vec::new();
    for b in 0..4 {
        let mut arm = vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        arm.shuffle(&mut rng);
        for t in arm {
            y.push(b as f64 + 2.0 * t + rng.gen_range(-1.0..1.0));
            z.push(t);
            blocks.push(b);
        }
    }
    (y, z, blocks)
}

#[test]
fn blocked_experiment_through_every_estimator() -> anyhow::Result<()> {
    init_tracing();
    let (y, z, labels) = blocked_experiment(42);
    let blocks = Grouping::from_labels(&labels)?;
    let declaration = Declaration::blocked(blocks.clone(), vec![0.5; y.len()])?;

    let ht = HorvitzThompson::new().estimate(&y, &z, &declaration)?;
    let dim = DifferenceInMeans::new().with_blocks(blocks).estimate(&y, &z)?;

    // Equal-sized balanced blocks make the two point estimates identical
    assert_relative_eq!(ht.estimate().unwrap(), dim.estimate().unwrap(), epsilon = 1e-10);
    assert_eq!(dim.design, DimDesign::Blocked);
    assert_eq!(dim.df(), Some(24.0 - 8.0));

    let constant = HorvitzThompson::new()
        .with_se_type(HtVariance::Constant)
        .estimate(&y, &z, &declaration)?;
    assert!(constant.confidence_interval().unwrap().contains(constant.estimate().unwrap()));
    Ok(())
}

#[test]
fn simulated_permutations_approximate_declared_design() -> anyhow::Result<()> {
    init_tracing();
    let n = 6;
    let draws = 4000;
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut permutations = DMatrix::zeros(n, draws);
    for r in 0..draws {
        let mut assignment = vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        assignment.shuffle(&mut rng);
        for (i, t) in assignment.into_iter().enumerate() {
            permutations[(i, r)] = t;
        }
    }

    let simulated = permutations_to_condition_pr_mat(&permutations)?;
    let exact = Declaration::complete(vec![1.0 / 3.0; n])?.condition_pr_matrix()?;
    let tolerance = 5.0 / (draws as f64).sqrt();
    for i in 0..2 * n {
        for j in 0..2 * n {
            assert!((simulated.matrix()[(i, j)] - exact.matrix()[(i, j)]).abs() < tolerance);
        }
    }
    Ok(())
}

#[test]
fn regression_and_difference_in_means_agree_on_clusters() -> anyhow::Result<()> {
    init_tracing();
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let labels: Vec<usize> = (0..20).map(|i| i / 4).collect();
    let z: Vec<f64> = labels.iter().map(|&c| (c % 2) as f64).collect();
    let y: Vec<f64> = z.iter().map(|t| 1.5 * t + rng.gen_range(-1.0..1.0)).collect();
    let clusters = Grouping::from_labels(&labels)?;

    let data = ModelData::from_columns(&[("z", &z)], &y, true)?.with_clusters(clusters.clone())?;
    let fit = lm_robust(&data, &LmRobustOptions::default())?;
    let dim = DifferenceInMeans::new().with_clusters(clusters).estimate(&y, &z)?;

    let row = fit.coefficient("z").unwrap();
    assert_eq!(fit.se_type, VarianceType::CR2);
    assert_relative_eq!(row.estimate.unwrap(), dim.estimate().unwrap(), epsilon = 1e-10);
    assert_relative_eq!(row.std_error.unwrap(), dim.std_error().unwrap(), epsilon = 1e-10);
    // Regression uses the CR2 adjusted df, difference in means uses S - 2
    assert_eq!(dim.df(), Some(3.0));
    Ok(())
}

//! End-to-end properties of the solvers on synthetic data

use approx::assert_relative_eq;
use lightsvm::core::{
    CoordinateDescentConfig, Dataset, LearningRate, Multiclass, Penalty, Selection, SgdConfig,
    Termination,
};
use lightsvm::utils::{accuracy, binary_labels, make_classification, predict_classes};
use lightsvm::{
    CoordinateDescent, DenseDataset, KernelRowCache, KernelSpec, Loss, Matrix, SparseDataset,
    StochasticGradient,
};

fn blobs(n_classes: usize, seed: u64) -> (DenseDataset, Vec<usize>) {
    let generated = make_classification(90, 12, 8, n_classes, 2.0, seed).expect("Should generate");
    let y = generated.labels.iter().map(|&l| l as usize).collect();
    (generated.data, y)
}

fn sparse_copy(ds: &DenseDataset) -> SparseDataset {
    let rows: Vec<Vec<f64>> = (0..ds.n_samples()).map(|i| ds.dense_row(i).to_vec()).collect();
    SparseDataset::from_dense(&rows).expect("Should build sparse dataset")
}

/// errors[k][i] == 1 - y_k(i) f_k(x_i) for binary and one-vs-rest fits
fn assert_binary_errors(scores: &Matrix, errors: &Matrix, y: &[usize]) {
    let n_vectors = scores.cols();
    for k in 0..n_vectors {
        let positive = if n_vectors == 1 { 1 } else { k };
        for (i, &c) in y.iter().enumerate() {
            let yi = if c == positive { 1.0 } else { -1.0 };
            assert_relative_eq!(errors.get(k, i), 1.0 - yi * scores.get(i, k), epsilon = 1e-6);
        }
    }
}

#[test]
fn test_cd_errors_track_coefficients() {
    let (ds, y) = blobs(2, 1);
    let sparse = sparse_copy(&ds);
    let labels = binary_labels(&y);

    for penalty in [Penalty::L2, Penalty::L1] {
        for loss in [Loss::SquaredHinge { threshold: 1.0 }, Loss::Log, Loss::ModifiedHuber] {
            let config = CoordinateDescentConfig::default()
                .with_penalty(penalty)
                .with_loss(loss)
                .with_selection(Selection::Permute)
                .with_seed(11);
            let sol = CoordinateDescent::new(config)
                .expect("Valid config")
                .fit(&sparse, &labels)
                .expect("Should fit");
            let scores = sol.decision_function(&sparse).expect("Should score");
            assert_binary_errors(&scores, &sol.errors, &y);
        }
    }
}

#[test]
fn test_l1_sparsity_grows_as_c_shrinks() {
    let (ds, y) = blobs(2, 2);
    let labels = binary_labels(&y);

    let nnz = |c: f64| {
        let config = CoordinateDescentConfig::default()
            .with_penalty(Penalty::L1)
            .with_c(c);
        CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &labels)
            .expect("Should fit")
            .n_nonzero()
    };

    let tiny = nnz(1e-4);
    let moderate = nnz(0.05);
    let large = nnz(10.0);
    assert_eq!(tiny, 0);
    assert!(moderate > 0);
    assert!(moderate <= large);
}

#[test]
fn test_empty_model_has_unit_errors() {
    let (ds, y) = blobs(3, 3);
    let config = CoordinateDescentConfig::default()
        .with_penalty(Penalty::L1)
        .with_c(1e-5);
    let sol = CoordinateDescent::new(config)
        .expect("Valid config")
        .fit_multiclass(&ds, &y, 3)
        .expect("Should fit");

    assert_eq!(sol.n_nonzero(), 0);
    assert!(sol.converged);
    assert!(sol.errors.as_slice().iter().all(|&e| e == 1.0));
}

#[test]
fn test_group_penalty_zeroes_whole_columns() {
    let (ds, y) = blobs(3, 4);
    let config = CoordinateDescentConfig::default()
        .with_penalty(Penalty::L1L2)
        .with_loss(Loss::Log)
        .with_c(0.05);
    let sol = CoordinateDescent::new(config)
        .expect("Valid config")
        .fit_multiclass(&ds, &y, 3)
        .expect("Should fit");

    assert_eq!(sol.coef.rows(), 3);
    assert_eq!(sol.n_nonzero() % 3, 0);
    for j in 0..sol.coef.cols() {
        let nonzero = (0..3).filter(|&k| sol.coef.get(k, j) != 0.0).count();
        assert!(nonzero == 0 || nonzero == 3, "column {} is partially zero", j);
    }

    // errors[k][i] = 1 - (s_y - s_k)
    let scores = sol.decision_function(&ds).expect("Should score");
    for (i, &c) in y.iter().enumerate() {
        for k in 0..3 {
            let expected = 1.0 - (scores.get(i, c) - scores.get(i, k));
            assert_relative_eq!(sol.errors.get(k, i), expected, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_linear_kernel_matches_precomputed_gram() {
    let (ds, y) = blobs(2, 5);
    let labels = binary_labels(&y);
    let gram = KernelSpec::Linear.gram_matrix(&ds).expect("Should build gram matrix");

    let fit = |kernel: KernelSpec, data: &DenseDataset| {
        let config = CoordinateDescentConfig::default()
            .with_kernel(kernel)
            .with_max_iter(20);
        CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(data, &labels)
            .expect("Should fit")
    };

    let direct = fit(KernelSpec::Linear, &ds);
    let precomputed = fit(KernelSpec::Precomputed, &gram);
    for j in 0..ds.n_samples() {
        assert_relative_eq!(direct.coef.get(0, j), precomputed.coef.get(0, j), epsilon = 1e-4);
    }
    assert_eq!(direct.n_iter, precomputed.n_iter);
}

#[test]
fn test_warm_start_never_increases_objective() {
    let (ds, y) = blobs(2, 6);
    let labels = binary_labels(&y);
    let config = CoordinateDescentConfig::default()
        .with_penalty(Penalty::L1)
        .with_c(0.5)
        .with_warm_start(true);
    let mut solver = CoordinateDescent::new(config).expect("Valid config");

    let first = solver.fit(&ds, &labels).expect("Should fit");
    let second = solver.fit(&ds, &labels).expect("Should fit");
    assert!(second.objective <= first.objective + 1e-9);

    // A warm path over C starts from the previous solution
    solver.set_c(1.0).expect("Valid C");
    let warm = solver.fit(&ds, &labels).expect("Should fit");
    let mut cold = CoordinateDescent::new(
        CoordinateDescentConfig::default()
            .with_penalty(Penalty::L1)
            .with_c(1.0)
            .with_tol(1e-6)
            .with_max_iter(500),
    )
    .expect("Valid config");
    let reference = cold.fit(&ds, &labels).expect("Should fit");
    assert!(warm.objective >= reference.objective - 1e-3 * reference.objective.abs());
}

#[test]
fn test_n_components_stops_at_target() {
    let (ds, y) = blobs(2, 7);
    let labels = binary_labels(&y);
    let config = CoordinateDescentConfig::default()
        .with_penalty(Penalty::L1)
        .with_c(10.0)
        .with_termination(Termination::NComponents(3));
    let sol = CoordinateDescent::new(config)
        .expect("Valid config")
        .fit(&ds, &labels)
        .expect("Should fit");
    assert_eq!(sol.n_nonzero(), 3);
}

#[test]
fn test_shrinking_reaches_the_same_objective() {
    let (ds, y) = blobs(2, 8);
    let labels = binary_labels(&y);
    let fit = |shrinking: bool| {
        let config = CoordinateDescentConfig::default()
            .with_penalty(Penalty::L1)
            .with_c(0.2)
            .with_tol(1e-5)
            .with_max_iter(1000)
            .with_shrinking(shrinking);
        CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &labels)
            .expect("Should fit")
    };

    let with = fit(true);
    let without = fit(false);
    assert_relative_eq!(with.objective, without.objective, max_relative = 1e-3);
}

#[test]
fn test_max_iterations_termination_runs_every_pass() {
    let (ds, y) = blobs(3, 9);
    let config = CoordinateDescentConfig::default()
        .with_termination(Termination::MaxIterations)
        .with_max_iter(4);
    let sol = CoordinateDescent::new(config)
        .expect("Valid config")
        .fit_multiclass(&ds, &y, 3)
        .expect("Should fit");
    assert_eq!(sol.n_iter, 4);
    assert_eq!(sol.coef.rows(), 3);
}

#[test]
fn test_one_vs_rest_shares_the_cache() {
    let (ds, y) = blobs(3, 10);
    let kernel = KernelSpec::Rbf { gamma: 0.1 };
    let mut cache = KernelRowCache::for_dataset(kernel, &ds, 1 << 24).expect("Should build cache");
    let config = CoordinateDescentConfig::default()
        .with_kernel(kernel)
        .with_max_iter(5);
    let mut solver = CoordinateDescent::new(config).expect("Valid config");

    let sol = solver
        .fit_multiclass_with_cache(&ds, &y, 3, &mut cache)
        .expect("Should fit");
    let stats = cache.stats();
    assert!(stats.hits > 0);
    assert_eq!(stats.rows, ds.n_samples());

    let scores = sol
        .kernel_decision_function(&kernel, &ds, &ds)
        .expect("Should score");
    assert_binary_errors(&scores, &sol.errors, &y);
}

#[test]
fn test_sgd_is_deterministic_per_seed() {
    let (ds, y) = blobs(3, 11);
    let config = SgdConfig::default().with_seed(42).with_max_iter(3);
    let a = StochasticGradient::new(config.clone())
        .expect("Valid config")
        .fit_multiclass(&ds, &y, 3)
        .expect("Should fit");
    let b = StochasticGradient::new(config)
        .expect("Valid config")
        .fit_multiclass(&ds, &y, 3)
        .expect("Should fit");
    assert_eq!(a.coef, b.coef);
    assert_eq!(a.intercept, b.intercept);
}

#[test]
fn test_sgd_natural_multiclass_learns_blobs() {
    let (ds, y) = blobs(3, 12);
    let config = SgdConfig::default()
        .with_multiclass(Multiclass::Natural)
        .with_loss(Loss::Log)
        .with_max_iter(15);
    let sol = StochasticGradient::new(config)
        .expect("Valid config")
        .fit_multiclass(&ds, &y, 3)
        .expect("Should fit");

    let scores = sol.decision_function(&ds).expect("Should score");
    for (i, &c) in y.iter().enumerate() {
        assert_relative_eq!(sol.errors.get(c, i), 1.0, epsilon = 1e-12);
    }
    let predicted = predict_classes(&scores);
    let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
    assert!(correct as f64 / y.len() as f64 > 0.7);
}

fn training_accuracy(scores: &Matrix, y: &[usize]) -> f64 {
    accuracy(&predict_classes(scores), y)
}

#[test]
fn test_loss_and_active_selection_fit_kernel_l1() {
    let (ds, y) = blobs(2, 13);
    let labels = binary_labels(&y);
    let kernel = KernelSpec::Rbf { gamma: 0.1 };

    for selection in [Selection::Loss, Selection::Active] {
        let config = CoordinateDescentConfig::default()
            .with_kernel(kernel)
            .with_penalty(Penalty::L1)
            .with_c(1.0)
            .with_selection(selection)
            .with_max_iter(50);
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &labels)
            .expect("Should fit");

        assert!(sol.n_nonzero() > 0, "{:?} left the model empty", selection);
        let scores = sol
            .kernel_decision_function(&kernel, &ds, &ds)
            .expect("Should score");
        assert_binary_errors(&scores, &sol.errors, &y);
        assert!(
            training_accuracy(&scores, &y) > 0.9,
            "{:?} selection underfits",
            selection
        );
    }
}

#[test]
fn test_support_grows_along_warm_c_path() {
    let generated = make_classification(200, 40, 10, 2, 2.0, 14).expect("Should generate");
    let y: Vec<usize> = generated.labels.iter().map(|&l| l as usize).collect();
    let labels = binary_labels(&y);
    let config = CoordinateDescentConfig::default()
        .with_penalty(Penalty::L1)
        .with_c(1e-3)
        .with_tol(1e-4)
        .with_max_iter(500)
        .with_warm_start(true);
    let mut solver = CoordinateDescent::new(config).expect("Valid config");

    let mut path = Vec::new();
    for &c in &[1e-3, 1e-2, 1e-1, 1.0] {
        solver.set_c(c).expect("Valid C");
        let sol = solver.fit(&generated.data, &labels).expect("Should fit");
        path.push(sol.n_nonzero());
    }

    for pair in path.windows(2) {
        assert!(pair[0] <= pair[1], "support shrank along the path: {:?}", path);
    }
    assert!(path[0] < path[path.len() - 1], "support never grew: {:?}", path);
}

#[test]
fn test_n_components_kernel_losses() {
    let (ds, y) = blobs(2, 15);
    let labels = binary_labels(&y);
    let kernel = KernelSpec::Rbf { gamma: 0.1 };
    let cases = [
        (Penalty::L2, Loss::SquaredHinge { threshold: 1.0 }, 1.0),
        (Penalty::L1, Loss::SquaredHinge { threshold: 1.0 }, 10.0),
        (Penalty::L2, Loss::Log, 1.0),
    ];

    for (penalty, loss, c) in cases {
        let config = CoordinateDescentConfig::default()
            .with_kernel(kernel)
            .with_penalty(penalty)
            .with_loss(loss)
            .with_c(c)
            .with_termination(Termination::NComponents(10));
        let sol = CoordinateDescent::new(config)
            .expect("Valid config")
            .fit(&ds, &labels)
            .expect("Should fit");

        assert_eq!(sol.n_nonzero(), 10, "{:?} with {:?}", penalty, loss.name());
        assert_eq!(sol.n_support_vectors(), 10);
        let scores = sol
            .kernel_decision_function(&kernel, &ds, &ds)
            .expect("Should score");
        assert_binary_errors(&scores, &sol.errors, &y);
    }
}

#[test]
fn test_debiasing_refits_the_sparse_support() {
    let (ds, y) = blobs(2, 16);
    let labels = binary_labels(&y);
    let sparse_config = CoordinateDescentConfig::default()
        .with_penalty(Penalty::L1)
        .with_c(0.01)
        .with_tol(1e-6)
        .with_max_iter(1000);

    let sparse = CoordinateDescent::new(sparse_config.clone())
        .expect("Valid config")
        .fit(&ds, &labels)
        .expect("Should fit");
    let support = sparse.support_indices();
    assert!(!support.is_empty());
    assert!(support.len() < ds.n_features());

    let debiased = CoordinateDescent::new(sparse_config.clone().with_debias(1.0))
        .expect("Valid config")
        .fit(&ds, &labels)
        .expect("Should fit");
    assert!(debiased.support_indices().iter().all(|j| support.contains(j)));
    let scores = debiased.decision_function(&ds).expect("Should score");
    assert_binary_errors(&scores, &debiased.errors, &y);

    // Same optimum as an L2 fit restricted to the sparse support
    let restricted = CoordinateDescent::new(
        sparse_config
            .with_penalty(Penalty::L2)
            .with_c(1.0)
            .with_components(support.clone()),
    )
    .expect("Valid config")
    .fit(&ds, &labels)
    .expect("Should fit");
    assert_relative_eq!(debiased.objective, restricted.objective, max_relative = 1e-4);
    for j in 0..ds.n_features() {
        assert_relative_eq!(debiased.coef.get(0, j), restricted.coef.get(0, j), epsilon = 1e-2);
    }
}

#[test]
fn test_sgd_l1_truncation() {
    let (ds, y) = blobs(2, 17);
    let labels = binary_labels(&y);
    let fit = |lambda: f64| {
        let config = SgdConfig::default()
            .with_penalty(Penalty::L1)
            .with_learning_rate(LearningRate::Constant)
            .with_lambda(lambda)
            .with_seed(3);
        StochasticGradient::new(config)
            .expect("Valid config")
            .fit(&ds, &labels)
            .expect("Should fit")
    };

    // Every touched weight is truncated by more than any single step adds
    let heavy = fit(100.0);
    assert_eq!(heavy.n_nonzero(), 0);

    let light = fit(1e-4);
    assert!(light.n_nonzero() > 0);
    let scores = light.decision_function(&ds).expect("Should score");
    assert_binary_errors(&scores, &light.errors, &y);
    assert!(training_accuracy(&scores, &y) > 0.8);
}

#[test]
fn test_sgd_group_truncation_keeps_whole_columns() {
    let (ds, y) = blobs(3, 18);
    for lambda in [1e-3, 100.0] {
        let config = SgdConfig::default()
            .with_penalty(Penalty::L1L2)
            .with_multiclass(Multiclass::Natural)
            .with_loss(Loss::Log)
            .with_learning_rate(LearningRate::Constant)
            .with_lambda(lambda)
            .with_seed(5);
        let sol = StochasticGradient::new(config)
            .expect("Valid config")
            .fit_multiclass(&ds, &y, 3)
            .expect("Should fit");

        for j in 0..sol.coef.cols() {
            let nonzero = (0..3).filter(|&k| sol.coef.get(k, j) != 0.0).count();
            assert!(nonzero == 0 || nonzero == 3, "column {} is partially zero", j);
        }
        if lambda > 1.0 {
            assert_eq!(sol.n_nonzero(), 0);
        } else {
            let scores = sol.decision_function(&ds).expect("Should score");
            assert!(training_accuracy(&scores, &y) > 0.7);
        }
    }
}

#[test]
fn test_sgd_natural_hinge_multiclass() {
    let (ds, y) = blobs(3, 19);
    for fit_intercept in [true, false] {
        let config = SgdConfig::default()
            .with_multiclass(Multiclass::Natural)
            .with_loss(Loss::Hinge { threshold: 1.0 })
            .with_fit_intercept(fit_intercept)
            .with_max_iter(15);
        let sol = StochasticGradient::new(config)
            .expect("Valid config")
            .fit_multiclass(&ds, &y, 3)
            .expect("Should fit");

        for (i, &c) in y.iter().enumerate() {
            assert_relative_eq!(sol.errors.get(c, i), 1.0, epsilon = 1e-12);
        }
        let scores = sol.decision_function(&ds).expect("Should score");
        assert!(training_accuracy(&scores, &y) > 0.7);
    }
}

#[test]
fn test_sgd_kernel_multiclass() {
    let (ds, y) = blobs(3, 20);
    let kernel = KernelSpec::Rbf { gamma: 0.1 };
    for multiclass in [Multiclass::OneVsRest, Multiclass::Natural] {
        let config = SgdConfig::default()
            .with_kernel(kernel)
            .with_multiclass(multiclass)
            .with_max_iter(15);
        let sol = StochasticGradient::new(config)
            .expect("Valid config")
            .fit_multiclass(&ds, &y, 3)
            .expect("Should fit");

        assert_eq!(sol.coef.rows(), 3);
        assert_eq!(sol.coef.cols(), ds.n_samples());
        let scores = sol
            .kernel_decision_function(&kernel, &ds, &ds)
            .expect("Should score");
        if multiclass == Multiclass::OneVsRest {
            assert_binary_errors(&scores, &sol.errors, &y);
        }
        assert!(
            training_accuracy(&scores, &y) > 0.7,
            "{:?} kernel sgd underfits",
            multiclass
        );
    }
}

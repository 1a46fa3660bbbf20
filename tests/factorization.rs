use approx::assert_relative_eq;
use binfactor::boolean::coverage_score;
use binfactor::{
    ExhaustiveRowRefinerBuilder, FactorPair, FactorizationAlgorithm, FactorizationError,
    GreedyHyperSynthesizerBuilder, InitMethod, PenalizedAlternatingOptimizerBuilder, Termination,
    WeightScheme,
};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::Array2;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn from_rectangles(rows: usize, cols: usize, rectangles: &[(&[usize], &[usize])]) -> CsrMatrix<f64> {
    let mut dense = Array2::<f64>::zeros((rows, cols));
    for (rs, cs) in rectangles {
        for &i in rs.iter() {
            for &j in cs.iter() {
                dense[[i, j]] = 1.0;
            }
        }
    }
    binfactor::sparse::dense_to_csr(dense.view())
}

fn cells(x: &CsrMatrix<f64>) -> Vec<(usize, usize)> {
    x.triplet_iter().map(|(i, j, _)| (i, j)).collect()
}

fn block_matrix() -> CsrMatrix<f64> {
    from_rectangles(6, 6, &[(&[0, 1, 2], &[0, 1, 2]), (&[3, 4, 5], &[3, 4, 5])])
}

#[test]
fn penalty_then_refine_recovers_blocks() {
    init_logging();
    let x = block_matrix();

    let mut start = Array2::from_elem((6, 2), 0.1);
    for i in 0..3 {
        start[[i, 0]] = 0.8;
        start[[i + 3, 1]] = 0.8;
    }
    let optimizer = PenalizedAlternatingOptimizerBuilder::new()
        .k(2)
        .weight_scheme(WeightScheme::Full)
        .init_method(InitMethod::Custom(FactorPair::new(start.clone(), start).unwrap()))
        .tol(1e-6)
        .max_iter(60)
        .build()
        .unwrap();
    let relaxed = optimizer.fit(&x, None).unwrap();
    assert!(matches!(
        relaxed.termination,
        Termination::Converged | Termination::MaxIterReached
    ));

    let refiner = ExhaustiveRowRefinerBuilder::new()
        .factors(relaxed.factors.binarize(0.5, 0.5))
        .w(0.5)
        .build()
        .unwrap();
    let refined = refiner.fit(&x, None).unwrap();
    assert_eq!(refined.termination, Termination::Completed);
    assert!(refined.factors.is_binary());

    let reconstruction = refined.factors.boolean_reconstruction().unwrap();
    assert_eq!(cells(&reconstruction), cells(&x));
    let score = coverage_score(&x, &reconstruction, 0.5, None)
        .unwrap()
        .total()
        .unwrap();
    assert_relative_eq!(score, 0.5);
    assert_relative_eq!(refined.logs.series("refinements", "score")[0], 0.5);
}

#[test]
fn hyper_covers_overlapping_rectangles_exactly() {
    init_logging();
    let x = from_rectangles(
        10,
        8,
        &[
            (&[0, 1, 2, 3, 4], &[0, 1, 2]),
            (&[3, 4, 5, 6], &[2, 3, 4, 5]),
            (&[7, 8, 9], &[5, 6, 7]),
            (&[0, 9], &[7]),
        ],
    );
    let synthesizer = GreedyHyperSynthesizerBuilder::new()
        .min_support(0.2)
        .build()
        .unwrap();
    let result = synthesizer.fit(&x, Some(&x)).unwrap();

    assert_eq!(result.termination, Termination::Covered);
    assert!(result.factors.is_binary());
    assert_eq!((result.factors.m(), result.factors.n()), (10, 8));
    let reconstruction = result.factors.boolean_reconstruction().unwrap();
    assert_eq!(cells(&reconstruction), cells(&x));

    let uncovered = result.logs.series("updates", "uncovered");
    assert_eq!(uncovered.len(), result.factors.k());
    assert_eq!(uncovered.last().copied(), Some(0.0));
    for pair in uncovered.windows(2) {
        assert!(pair[1] < pair[0]);
    }
}

#[test]
fn empty_training_matrix_is_rejected() {
    let x: CsrMatrix<f64> = CsrMatrix::zeros(0, 4);
    let synthesizer = GreedyHyperSynthesizerBuilder::new().build().unwrap();
    let err = synthesizer.fit(&x, None).unwrap_err();
    assert_eq!(
        err.downcast_ref::<FactorizationError>(),
        Some(&FactorizationError::MissingTrainingData { rows: 0, cols: 4 })
    );
}

#[test]
fn validation_shape_must_match() {
    let x = block_matrix();
    let val = CsrMatrix::from(&CooMatrix::<f64>::new(6, 5));
    let optimizer = PenalizedAlternatingOptimizerBuilder::new().k(2).build().unwrap();
    let err = optimizer.fit(&x, Some(&val)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FactorizationError>(),
        Some(FactorizationError::ShapeMismatch { .. })
    ));
}

#[test]
fn penalty_requires_rank() {
    let err = PenalizedAlternatingOptimizerBuilder::new().build().unwrap_err();
    assert_eq!(
        err.downcast_ref::<FactorizationError>(),
        Some(&FactorizationError::MissingRank)
    );
}

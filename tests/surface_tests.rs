mod test_utils;

use std::sync::atomic::AtomicBool;

use rand::seq::SliceRandom;
use sabr_surface::data::TENOR_TOLERANCE;
use sabr_surface::{
    get_full_surface, get_smile, same_tenor, CalibrationParams, ErrorKind, SabrSurface,
    SurfaceBuild,
};
use test_utils::{
    create_sequential_test_config, create_test_config, load_test_dataset, seeded_rng,
};

fn build_all(parallel: bool) -> SurfaceBuild {
    let dataset = load_test_dataset();
    let config = if parallel {
        create_test_config()
    } else {
        create_sequential_test_config()
    };
    get_full_surface(
        &dataset,
        &dataset.tenors(),
        &CalibrationParams::default(),
        &config,
    )
}

#[test]
fn test_full_surface_on_fixture() {
    let build = build_all(true);
    let grid = &build.grid;

    assert!(build.is_complete(), "failures: {:?}", build.failures);
    assert_eq!(grid.rows(), 15);
    assert_eq!(grid.columns(), 11);
    assert_eq!(grid.vol_matrix.len(), 15);
    assert!(grid.vol_matrix.iter().all(|row| row.len() == 11));
    assert!(grid.converged.iter().all(|&c| c));
    assert_eq!(grid.params.len(), 15);

    // Logical axes stay in economic units
    assert_eq!(grid.tenors.first(), Some(&1.0));
    assert_eq!(grid.tenors.last(), Some(&30.0));
    assert!((grid.strikes[0] - 0.01).abs() < 1e-15);
    assert!((grid.strikes[10] - 0.07).abs() < 1e-15);

    // Normalized axes are index-spaced on [0, 1]
    assert_eq!(grid.normalized_tenor_axis.len(), 15);
    assert_eq!(grid.normalized_tenor_axis[0], 0.0);
    assert_eq!(grid.normalized_tenor_axis[14], 1.0);
    assert!((grid.normalized_tenor_axis[7] - 0.5).abs() < 1e-15);
    assert_eq!(grid.normalized_strike_axis.len(), 11);
    assert!((grid.normalized_strike_axis[1] - 0.1).abs() < 1e-15);

    for row in &grid.vol_matrix {
        assert!(row.iter().all(|v| v.is_finite() && *v > 0.0));
    }
}

#[test]
fn test_rows_match_single_tenor_smiles() {
    let dataset = load_test_dataset();
    let config = create_test_config();
    let calib_params = CalibrationParams::default();
    let build = get_full_surface(&dataset, &[2.0, 10.0, 25.0], &calib_params, &config);

    for tenor in [2.0, 10.0, 25.0] {
        let smile = get_smile(&dataset, tenor, &calib_params, &config).unwrap();
        assert_eq!(build.grid.row(tenor), Some(smile.fitted_vols.as_slice()));
        assert_eq!(smile.market_vols, dataset.quotes(tenor).unwrap().market_vols);
    }
}

#[test]
fn test_parallel_equals_sequential() {
    let parallel = build_all(true);
    let sequential = build_all(false);
    assert_eq!(parallel, sequential);
}

/// Fitting tenors in a shuffled order, alone or together, gives identical rows.
#[test]
fn test_tenor_independence() {
    let dataset = load_test_dataset();
    let config = create_sequential_test_config();
    let calib_params = CalibrationParams::default();
    let surface = SabrSurface::new(&dataset, calib_params, config);

    let reference = surface.full_surface_all();

    let mut shuffled = dataset.tenors();
    shuffled.shuffle(&mut seeded_rng(7));
    let reordered = surface.full_surface(&shuffled);
    assert_eq!(reordered, reference);

    let alone = surface.calibrate_tenor(12.0).unwrap();
    assert_eq!(reference.grid.row(12.0), Some(alone.fitted_vols.as_slice()));
}

#[test]
fn test_missing_tenor_reported_not_fatal() {
    let dataset = load_test_dataset();
    let build = get_full_surface(
        &dataset,
        &[1.0, 11.0, 30.0],
        &CalibrationParams::default(),
        &create_test_config(),
    );
    assert_eq!(build.grid.tenors, vec![1.0, 30.0]);
    assert_eq!(build.grid.normalized_tenor_axis, vec![0.0, 1.0]);
    assert_eq!(build.failures.len(), 1);
    assert_eq!(build.failures[0].tenor, 11.0);
    assert_eq!(build.failures[0].kind, ErrorKind::Validation);
}

/// Dataset quotes, grid rows and request de-duplication agree on tenor keys.
#[test]
fn test_tenor_keys_agree_between_dataset_and_grid() {
    let dataset = load_test_dataset();
    let calib_params = CalibrationParams::default();
    let config = create_sequential_test_config();
    let build = get_full_surface(&dataset, &[2.0, 5.0], &calib_params, &config);

    for tenor in [2.0, 5.0] {
        for delta in [0.0, 0.5e-9, -0.9e-9, TENOR_TOLERANCE, 1.1e-9, -5e-9] {
            let key = tenor + delta;
            let in_grid = build.grid.row(key).is_some();
            assert_eq!(dataset.quotes(key).is_some(), in_grid, "tenor {key}");
            assert_eq!(same_tenor(key, tenor), in_grid, "tenor {key}");
        }
    }

    let collapsed = get_full_surface(&dataset, &[5.0, 2.0 + 0.5e-9, 2.0], &calib_params, &config);
    assert_eq!(collapsed.grid.rows(), 2);
    assert!(collapsed.is_complete());
}

#[test]
fn test_cancelled_build_reports_skipped_tenors() {
    let dataset = load_test_dataset();
    let surface = SabrSurface::new(
        &dataset,
        CalibrationParams::default(),
        create_sequential_test_config(),
    );
    let cancel = AtomicBool::new(true);
    let build = surface.full_surface_with_cancel(&dataset.tenors(), &cancel);
    assert!(build.grid.is_empty());
    assert_eq!(build.skipped, dataset.tenors());

    let not_cancelled = AtomicBool::new(false);
    let build = surface.full_surface_with_cancel(&[1.0, 2.0], &not_cancelled);
    assert!(build.is_complete());
    assert_eq!(build.grid.rows(), 2);
}

#[test]
fn test_interpolated_surface_between_rows() {
    let build = build_all(false);
    let grid = &build.grid;

    // Nodes are reproduced
    let node = grid.vol_at(5.0, grid.strikes[4]).unwrap();
    assert!((node - grid.row(5.0).unwrap()[4]).abs() < 1e-12);

    // Between 12Y and 15Y total variance is interpolated linearly
    let k = grid.strikes[6];
    let v12 = grid.row(12.0).unwrap()[6];
    let v15 = grid.row(15.0).unwrap()[6];
    let w = (v12 * v12 * 12.0 + v15 * v15 * 15.0) / 2.0;
    let v = grid.vol_at(13.5, k).unwrap();
    assert!((v - (w / 13.5).sqrt()).abs() < 1e-12);

    assert!(grid.vol_at(0.5, k).is_err());
    assert!(grid.vol_at(31.0, k).is_err());
}

#[test]
fn test_smile_curve_is_smooth_and_bounded() {
    let dataset = load_test_dataset();
    let smile = get_smile(
        &dataset,
        5.0,
        &CalibrationParams::default(),
        &create_test_config(),
    )
    .unwrap();
    let (strikes, vols) = smile.curve(121).unwrap();
    assert_eq!(strikes.len(), 121);
    assert!((strikes[0] - 0.01).abs() < 1e-15);
    assert!((strikes[120] - 0.07).abs() < 1e-15);
    assert!(vols.iter().all(|v| v.is_finite() && *v > 0.0));
    // Fitted within a vol point of every quote
    assert!(smile.max_abs_error() < 0.01);
}

use lgcpd_core::point_cloud::{points_from_point3, points_from_rows, stack_rows};
use lgcpd_core::{is_positive_semi_definite, ComputeMode, Error};
use nalgebra::{DMatrix, Point3};

#[test]
fn test_point_array_result_handling() {
    // 1. Valid rows
    let rows = vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]];
    let cloud = points_from_rows(&rows);
    assert!(cloud.is_ok());
    assert_eq!(cloud.unwrap().shape(), (2, 3));

    // 2. Ragged rows
    let ragged = vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0]];
    let err = points_from_rows(&ragged).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(err.to_string().contains("2-dimensional"));

    // 3. Empty input
    assert!(points_from_rows(&[]).is_err());
    assert!(points_from_rows(&[vec![]]).is_err());
}

#[test]
fn test_point3_conversion_and_stacking() {
    let points = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.0)];
    let m = points_from_point3(&points);
    assert_eq!(m[(1, 2)], 6.0);

    let landmarks = DMatrix::from_row_slice(1, 3, &[7.0, 8.0, 9.0]);
    let stacked = stack_rows(&m, &landmarks).unwrap();
    assert_eq!(stacked.nrows(), 3);
    assert_eq!(stacked[(2, 0)], 7.0);

    let wrong = DMatrix::zeros(1, 2);
    assert!(matches!(
        stack_rows(&m, &wrong),
        Err(Error::DimensionMismatch { expected: 3, actual: 2, .. })
    ));
}

#[test]
fn test_psd_scaled_identity() {
    let b = DMatrix::identity(3, 3) * 2.5;
    assert!(is_positive_semi_definite(&b));
    assert!(!is_positive_semi_definite(&(b * -1.0)));
}

#[test]
fn test_compute_mode_default_is_auto() {
    assert_eq!(ComputeMode::default(), ComputeMode::Auto);
}

//! "LAMBDA idempotence" (section 8): applying the search to an
//! already-integer float vector returns that same integer vector, with
//! the best/second-best residual gap collapsing to zero.
#[cfg(test)]
mod test {
    use nalgebra::{DMatrix, DVector};
    use rtk_core::rtk::ambiguity::lambda_search;

    #[test]
    fn integer_input_is_a_fixed_point() {
        let afloat = DVector::from_vec(vec![3.0, -1.0, 7.0, 0.0]);
        let q_b = DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.1, 0.0, 0.0, //
                0.1, 1.0, 0.1, 0.0, //
                0.0, 0.1, 1.0, 0.1, //
                0.0, 0.0, 0.1, 1.0,
            ],
        );

        let result = lambda_search(&afloat, &q_b).unwrap();
        let expected: Vec<i64> = afloat.iter().map(|v| v.round() as i64).collect();
        assert_eq!(result.best, expected);
        assert_eq!(result.s1, 0.0);
    }

    #[test]
    fn near_integer_input_resolves_to_nearest_integers() {
        let afloat = DVector::from_vec(vec![2.98, -0.97, 5.03]);
        let q_b = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.5, 0.05, 0.0, //
                0.05, 0.5, 0.05, //
                0.0, 0.05, 0.5,
            ],
        );

        let result = lambda_search(&afloat, &q_b).unwrap();
        assert_eq!(result.best, vec![3, -1, 5]);
        assert!(result.s2 >= result.s1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::aggregate::{Mean, Median, Reducer, ResultMatrix, net, reduce};
    use crate::error::ArtifactKind;
    use crate::operation::Operation;
    use crate::runner::{RawSamples, Sample, SampleKey};

    fn ms(v: u64) -> Sample {
        Sample::Measured(Duration::from_millis(v))
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn mean_of_three_repetitions() {
        let mut raw = RawSamples::new();
        let key = SampleKey::new(Operation::At, "libX", 3, ArtifactKind::Full);
        for v in [100, 200, 600] {
            raw.record(key.clone(), ms(v));
        }
        let agg = reduce(&raw, false, &Mean);
        assert!(agg.raw.is_none());
        let matrix = &agg.results[&Operation::At];
        assert!(close(matrix.get(3, "libX"), 0.3));
    }

    #[test]
    fn reducers_leave_empty_input_missing() {
        assert_eq!(Mean.reduce(&[]), None);
        assert_eq!(Median.reduce(&[]), None);
        assert_eq!(Mean.reduce(&[Duration::ZERO]), Some(0.0));
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        let secs = |v: &[u64]| v.iter().map(|s| Duration::from_secs(*s)).collect::<Vec<_>>();
        assert_eq!(Median.reduce(&secs(&[5, 1, 3])), Some(3.0));
        assert_eq!(Median.reduce(&secs(&[4, 1, 3, 2])), Some(2.5));
    }

    #[test]
    fn failed_cell_is_missing_not_zero() {
        let mut raw = RawSamples::new();
        raw.add_column(Operation::Take, "a");
        raw.add_column(Operation::Take, "b");
        raw.record(SampleKey::new(Operation::Take, "a", 1, ArtifactKind::Full), Sample::Failed);
        raw.record(
            SampleKey::new(Operation::Take, "b", 1, ArtifactKind::Full),
            Sample::Measured(Duration::ZERO),
        );
        let agg = reduce(&raw, false, &Mean);
        let matrix = &agg.results[&Operation::Take];
        assert_eq!(matrix.get(1, "a"), None);
        assert_eq!(matrix.get(1, "b"), Some(0.0));
    }

    #[test]
    fn net_is_floored_and_raw_is_kept() {
        let mut raw = RawSamples::new();
        let full = SampleKey::new(Operation::Filter, "mp", 2, ArtifactKind::Full);
        let base = SampleKey::new(Operation::Filter, "mp", 2, ArtifactKind::Baseline);
        raw.record(full, ms(100));
        raw.record(base, ms(150));
        let agg = reduce(&raw, true, &Mean);
        assert_eq!(agg.results[&Operation::Filter].get(2, "mp"), Some(0.0));
        let raw_matrix = &agg.raw.as_ref().unwrap()[&Operation::Filter];
        assert!(close(raw_matrix.get(2, "mp"), -0.05));
    }

    #[test]
    fn net_requires_both_sides() {
        assert_eq!(net(Some(1.0), None), (None, None));
        assert_eq!(net(None, Some(1.0)), (None, None));
        assert_eq!(net(Some(3.0), Some(1.0)), (Some(2.0), Some(2.0)));
        assert_eq!(net(Some(1.0), Some(3.0)), (Some(0.0), Some(-2.0)));
    }

    #[test]
    fn rows_are_the_union_of_attempted_sizes() {
        let mut raw = RawSamples::new();
        raw.record(SampleKey::new(Operation::Drop, "a", 5, ArtifactKind::Full), ms(1));
        raw.record(SampleKey::new(Operation::Drop, "b", 2, ArtifactKind::Full), ms(1));
        let agg = reduce(&raw, false, &Mean);
        let matrix = &agg.results[&Operation::Drop];
        assert_eq!(matrix.sizes().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(matrix.columns(), ["a", "b"]);
        assert_eq!(matrix.get(2, "a"), None);
        assert_eq!(matrix.get(5, "b"), None);
    }

    #[test]
    fn matrix_rejects_unknown_columns() {
        let mut matrix = ResultMatrix::new(vec!["mp".to_string()]);
        assert!(!matrix.set(1, "meta", Some(1.0)));
        assert!(matrix.is_empty());
        assert!(matrix.set(1, "mp", Some(1.0)));
        assert_eq!(matrix.get(1, "mp"), Some(1.0));
    }
}

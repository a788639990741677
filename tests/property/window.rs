//! Property tests for the rolling outcome window.

use breakwater::RollingWindow;
use proptest::collection::vec;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The window always agrees with a naive "last N outcomes" model.
    #[test]
    fn matches_a_naive_last_n_model(
        size in 1usize..=16,
        outcomes in vec(any::<bool>(), 0..200),
    ) {
        let mut window = RollingWindow::new(size);
        for &outcome in &outcomes {
            window.record(outcome);
        }

        let tracked: Vec<bool> = outcomes
            .iter()
            .rev()
            .take(size)
            .copied()
            .collect();

        prop_assert_eq!(window.len(), tracked.len());
        prop_assert_eq!(
            window.failures(),
            tracked.iter().filter(|&&failure| failure).count()
        );

        let rate = window.failure_rate();
        prop_assert!((0.0..=1.0).contains(&rate));
        if tracked.is_empty() {
            prop_assert_eq!(rate, 0.0);
        } else {
            let expected = window.failures() as f64 / window.len() as f64;
            prop_assert!((rate - expected).abs() < 1e-12);
        }
    }

    /// Reset always produces an empty window, whatever came before.
    #[test]
    fn reset_forgets_all_history(
        size in 1usize..=16,
        outcomes in vec(any::<bool>(), 0..100),
        after in vec(any::<bool>(), 0..8),
    ) {
        let mut window = RollingWindow::new(size);
        for &outcome in &outcomes {
            window.record(outcome);
        }
        window.reset();
        prop_assert_eq!(window.len(), 0);
        prop_assert_eq!(window.failures(), 0);
        prop_assert_eq!(window.failure_rate(), 0.0);

        for &outcome in &after {
            window.record(outcome);
        }
        prop_assert_eq!(window.len(), after.len().min(size));
    }
}

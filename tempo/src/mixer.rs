use crate::error::WorkloadError;
use crate::variant::Variant;
use rand::Rng;

/// Weighted selection over an ordered list of variants.
///
/// `[0, 1)` is split into contiguous intervals, one per variant in list order, each sized
/// by the variant's share of the total weight. Intervals are closed-open, so a draw that
/// lands exactly on a boundary belongs to the following variant.
#[derive(Debug)]
pub struct Mixer {
    variants: Vec<Variant>,
    /// Upper bound of each variant's interval.
    bounds: Vec<f64>,
    /// Index of the last variant with a non-empty interval.
    last_selectable: usize,
}

impl Mixer {
    pub fn new(variants: Vec<Variant>) -> Result<Self, WorkloadError> {
        if variants.is_empty() {
            return Err(WorkloadError::Empty);
        }

        if let Some(bad) = variants
            .iter()
            .find(|v| !v.weight.is_finite() || v.weight < 0.)
        {
            return Err(WorkloadError::InvalidWeight {
                metric: bad.metric.to_string(),
                weight: bad.weight,
            });
        }

        let total: f64 = variants.iter().map(|v| v.weight).sum();
        if total <= 0. || !total.is_finite() {
            return Err(WorkloadError::ZeroTotalWeight);
        }

        let mut cumulative = 0.;
        let bounds = variants
            .iter()
            .map(|v| {
                cumulative += v.weight;
                cumulative / total
            })
            .collect();

        let last_selectable = variants
            .iter()
            .rposition(|v| v.weight > 0.)
            .ok_or(WorkloadError::ZeroTotalWeight)?;

        Ok(Self {
            variants,
            bounds,
            last_selectable,
        })
    }

    /// Pick the variant whose interval contains `draw`, which must be in `[0, 1)`.
    pub fn select(&self, draw: f64) -> &Variant {
        // First interval whose upper bound lies strictly above the draw. Zero-width
        // intervals share their bound with the previous one and are skipped.
        let idx = self.bounds.partition_point(|&upper| upper <= draw);
        &self.variants[idx.min(self.last_selectable)]
    }

    pub fn draw<R: Rng>(&self, rng: &mut R) -> &Variant {
        self.select(rng.gen::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Outcome;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn variant(metric: &str, weight: f64) -> Variant {
        Variant::new(metric, weight, |_| async {
            Outcome::completed(200, Duration::ZERO, vec![])
        })
    }

    fn mixer(weights: &[(&str, f64)]) -> Mixer {
        Mixer::new(weights.iter().map(|(m, w)| variant(m, *w)).collect()).unwrap()
    }

    #[test]
    fn boundaries_belong_to_following_interval() {
        let mixer = mixer(&[("a", 1.), ("b", 1.), ("c", 2.)]);

        assert_eq!(mixer.select(0.).metric(), "a");
        assert_eq!(mixer.select(0.2499).metric(), "a");
        assert_eq!(mixer.select(0.25).metric(), "b");
        assert_eq!(mixer.select(0.4999).metric(), "b");
        assert_eq!(mixer.select(0.5).metric(), "c");
        assert_eq!(mixer.select(0.9999).metric(), "c");
    }

    #[test]
    fn zero_weight_variants_are_never_selected() {
        let mixer = mixer(&[("never", 0.), ("only", 3.), ("also_never", 0.)]);

        for draw in [0., 0.25, 0.5, 0.999_999, 1. - f64::EPSILON] {
            assert_eq!(mixer.select(draw).metric(), "only");
        }
    }

    #[test]
    fn converges_to_configured_probabilities() {
        let mixer = mixer(&[("browse", 0.8), ("submit", 0.2)]);
        let mut rng = SmallRng::seed_from_u64(7);

        const DRAWS: usize = 100_000;
        let browse = (0..DRAWS)
            .filter(|_| mixer.draw(&mut rng).metric() == "browse")
            .count();

        let share = browse as f64 / DRAWS as f64;
        assert!((share - 0.8).abs() < 0.01, "browse share was {share}");
    }

    #[test]
    fn generalizes_past_two_variants() {
        let mixer = mixer(&[("a", 5.), ("b", 3.), ("c", 1.), ("d", 1.)]);
        let mut rng = SmallRng::seed_from_u64(11);
        let mut counts = [0usize; 4];

        const DRAWS: usize = 100_000;
        for _ in 0..DRAWS {
            let idx = match mixer.draw(&mut rng).metric() {
                "a" => 0,
                "b" => 1,
                "c" => 2,
                _ => 3,
            };
            counts[idx] += 1;
        }

        for (count, expected) in counts.iter().zip([0.5, 0.3, 0.1, 0.1]) {
            let share = *count as f64 / DRAWS as f64;
            assert!((share - expected).abs() < 0.01, "{counts:?}");
        }
    }

    #[test]
    fn rejects_invalid_weights() {
        assert_eq!(Mixer::new(vec![]).unwrap_err(), WorkloadError::Empty);
        assert_eq!(
            Mixer::new(vec![variant("a", 0.), variant("b", 0.)]).unwrap_err(),
            WorkloadError::ZeroTotalWeight
        );
        assert_eq!(
            Mixer::new(vec![variant("a", 1.), variant("neg", -0.5)]).unwrap_err(),
            WorkloadError::InvalidWeight {
                metric: "neg".to_string(),
                weight: -0.5
            }
        );
        assert!(matches!(
            Mixer::new(vec![variant("nan", f64::NAN)]),
            Err(WorkloadError::InvalidWeight { .. })
        ));
    }
}

//! Single-pole exponential moving average.
//!
//! `y[n] = y[n-1] + alpha * (x[n] - y[n-1])`, which is the usual
//! `alpha * x + (1 - alpha) * y` rearranged so a constant input is
//! reproduced exactly. The first sample after construction or
//! [`EmaFilter::reset`] is passed through untouched.

/// Numeric types an [`EmaFilter`] can smooth.
pub trait Smoothing: Copy {
    fn blend(previous: Self, input: Self, alpha: f32) -> Self;
}

impl Smoothing for f32 {
    #[inline]
    fn blend(previous: Self, input: Self, alpha: f32) -> Self {
        previous + alpha * (input - previous)
    }
}

impl Smoothing for f64 {
    #[inline]
    fn blend(previous: Self, input: Self, alpha: f32) -> Self {
        previous + alpha as f64 * (input - previous)
    }
}

macro_rules! impl_integer_smoothing {
    ($($t:ty),*) => {
        $(
            impl Smoothing for $t {
                #[inline]
                fn blend(previous: Self, input: Self, alpha: f32) -> Self {
                    let step = alpha as f64 * (input as f64 - previous as f64);
                    previous + libm::round(step) as $t
                }
            }
        )*
    };
}

impl_integer_smoothing!(i16, i32, i64);

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EmaFilter<T> {
    alpha: f32,
    last: Option<T>,
}

/// `alpha` must lie in `(0, 1]`. Zero would freeze the output at its first
/// sample; NaN would poison it.
pub fn valid_alpha(alpha: f32) -> bool {
    alpha > 0.0 && alpha <= 1.0
}

impl<T: Smoothing> EmaFilter<T> {
    /// An `alpha` outside `(0, 1]` falls back to 1, i.e. no smoothing.
    /// Drivers reject such configs in `initialize`.
    pub fn new(alpha: f32) -> Self {
        let alpha = if valid_alpha(alpha) { alpha } else { 1.0 };
        Self { alpha, last: None }
    }

    pub fn update(&mut self, input: T) -> T {
        let output = match self.last {
            None => input,
            Some(previous) => T::blend(previous, input, self.alpha),
        };
        self.last = Some(output);
        output
    }

    /// Forget history; the next sample passes through.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<T> {
        self.last
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_sample_passes_through() {
        let mut f = EmaFilter::<f32>::new(0.2);
        assert_eq!(f.update(3.75), 3.75);
        assert_eq!(f.last(), Some(3.75));
    }

    #[test]
    fn blends_subsequent_samples() {
        let mut f = EmaFilter::<f32>::new(0.5);
        f.update(0.0);
        assert_eq!(f.update(10.0), 5.0);
        assert_eq!(f.update(10.0), 7.5);
    }

    #[test]
    fn reset_restores_passthrough() {
        let mut f = EmaFilter::<f64>::new(0.05);
        f.update(100.0);
        f.update(0.0);
        f.reset();
        assert_eq!(f.last(), None);
        assert_eq!(f.update(-7.0), -7.0);
    }

    #[test]
    fn alpha_one_tracks_input() {
        let mut f = EmaFilter::<f32>::new(1.0);
        f.update(1.0);
        assert_eq!(f.update(42.0), 42.0);
    }

    #[test]
    fn unusable_alpha_disables_smoothing() {
        for alpha in [0.0, -0.3, 1.5, f32::NAN] {
            let mut f = EmaFilter::<f32>::new(alpha);
            assert_eq!(f.alpha(), 1.0);
            f.update(1.0);
            assert_eq!(f.update(100.0), 100.0);
        }
    }

    #[test]
    fn integer_channels_round_the_step() {
        let mut f = EmaFilter::<i32>::new(0.5);
        f.update(0);
        assert_eq!(f.update(3), 2);
        assert_eq!(f.update(3), 3);
    }

    proptest! {
        #[test]
        fn constant_input_is_a_fixed_point(x in -1.0e6f32..1.0e6, alpha in 0.001f32..=1.0, n in 1usize..64) {
            let mut f = EmaFilter::<f32>::new(alpha);
            for _ in 0..n {
                prop_assert_eq!(f.update(x), x);
            }
        }

        #[test]
        fn fresh_filter_passes_first_sample(x in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
            let mut f = EmaFilter::<f32>::new(0.2);
            prop_assert_eq!(f.update(x), x);
        }

        #[test]
        fn output_stays_between_previous_and_input(prev in -1.0e3f64..1.0e3, x in -1.0e3f64..1.0e3, alpha in 0.01f32..=1.0) {
            let mut f = EmaFilter::<f64>::new(alpha);
            f.update(prev);
            let y = f.update(x);
            let (lo, hi) = if prev < x { (prev, x) } else { (x, prev) };
            prop_assert!(y >= lo - 1e-9 && y <= hi + 1e-9);
        }

        #[test]
        fn integer_constant_input_is_a_fixed_point(x in -100_000i32..100_000, alpha in 0.01f32..=1.0) {
            let mut f = EmaFilter::<i32>::new(alpha);
            f.update(x);
            prop_assert_eq!(f.update(x), x);
        }
    }
}

//! Bracketed root finding by interval halving.
//!
//! The search keeps an interval `[a, b]` on which the function changes sign
//! and halves it until it is narrower than a tolerance or a step budget is
//! exhausted.
use simba::scalar::RealField;

#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    a: T,
    b: T,
}

impl<T: RealField + Copy> Interval<T> {
    /// Returns `None` unless `a <= b`.
    pub fn new(a: T, b: T) -> Option<Self> {
        if b >= a { Some(Self { a, b }) } else { None }
    }

    pub fn size(&self) -> T {
        self.b - self.a
    }

    pub fn midpoint(&self) -> T {
        (self.a + self.b) / (T::one() + T::one())
    }
}

impl<T> Interval<T> {
    pub fn a(&self) -> &T {
        &self.a
    }
    pub fn b(&self) -> &T {
        &self.b
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The interval became narrower than the requested tolerance.
    Tolerance,
    /// The function evaluated to exactly zero.
    ExactRoot,
    /// The step budget ran out first.
    MaxSteps,
}

#[derive(Debug, Clone)]
pub struct Root<T> {
    pub x: T,
    pub steps: usize,
    pub termination: Termination,
}

#[derive(Clone)]
pub struct BisectionSearch<T, F>
where
    F: Fn(&T) -> T,
{
    interval: Interval<T>,
    fa: T,
    f: F,
    exact: bool,
}

impl<T, F> BisectionSearch<T, F>
where
    T: RealField + Copy,
    F: Fn(&T) -> T,
{
    /// Start a search on `interval`.
    ///
    /// Returns `None` if `f` does not change sign over the interval.
    pub fn new(interval: Interval<T>, f: F) -> Option<Self> {
        let fa = f(&interval.a);
        let fb = f(&interval.b);
        if fa == T::zero() {
            let a = interval.a;
            return Some(Self {
                interval: Interval { a, b: a },
                fa,
                f,
                exact: true,
            });
        }
        if fb == T::zero() {
            let b = interval.b;
            return Some(Self {
                interval: Interval { a: b, b },
                fa: fb,
                f,
                exact: true,
            });
        }
        if fa.is_sign_positive() == fb.is_sign_positive() {
            return None;
        }
        Some(Self {
            interval,
            fa,
            f,
            exact: false,
        })
    }

    pub fn interval(&self) -> &Interval<T> {
        &self.interval
    }

    /// Halve the interval once, keeping the half with the sign change.
    pub fn step(mut self) -> Self {
        if self.exact {
            return self;
        }
        let c = self.interval.midpoint();
        let fc = (self.f)(&c);
        if fc == T::zero() {
            self.interval = Interval { a: c, b: c };
            self.fa = fc;
            self.exact = true;
            return self;
        }

        if self.fa.is_sign_positive() != fc.is_sign_positive() {
            self.interval.b = c;
        } else {
            self.interval.a = c;
            self.fa = fc;
        }
        self
    }

    /// Step until the interval is narrower than `tolerance` or `max_steps`
    /// halvings have been done. The returned root is the interval midpoint.
    pub fn solve(mut self, tolerance: T, max_steps: usize) -> Root<T> {
        let mut steps = 0;
        loop {
            if self.exact {
                return Root {
                    x: self.interval.a,
                    steps,
                    termination: Termination::ExactRoot,
                };
            }
            if self.interval.size() < tolerance {
                return Root {
                    x: self.interval.midpoint(),
                    steps,
                    termination: Termination::Tolerance,
                };
            }
            if steps >= max_steps {
                return Root {
                    x: self.interval.midpoint(),
                    steps,
                    termination: Termination::MaxSteps,
                };
            }
            self = self.step();
            steps += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn cubic_root() {
        let search =
            BisectionSearch::new(Interval::new(1.0, 2.0).unwrap(), |x| x * x * x - x - 2.0)
                .unwrap();
        let root = search.solve(1e-12, 100);
        assert_eq!(root.termination, Termination::Tolerance);
        assert!(f64::abs(root.x - 1.5213797068) < 1e-9);
    }

    #[test]
    fn no_sign_change() {
        assert!(BisectionSearch::new(Interval::new(-1.0, 1.0).unwrap(), |x| x * x + 1.0).is_none());
    }

    #[test]
    fn root_on_boundary() {
        let root = BisectionSearch::new(Interval::new(0.0, 3.0).unwrap(), |x: &f64| *x)
            .unwrap()
            .solve(1e-9, 10);
        assert_eq!(root.termination, Termination::ExactRoot);
        assert_eq!(root.x, 0.0);
    }

    #[test]
    fn step_budget() {
        let root = BisectionSearch::new(Interval::new(0.0, 1.0).unwrap(), |x: &f64| x - 0.3)
            .unwrap()
            .solve(1e-30, 5);
        assert_eq!(root.termination, Termination::MaxSteps);
        assert_eq!(root.steps, 5);
        assert!((root.x - 0.3).abs() < 1.0 / 32.0);
    }

    #[test]
    fn reversed_interval_rejected() {
        assert!(Interval::new(2.0, 1.0).is_none());
    }
}

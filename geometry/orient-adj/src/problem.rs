use nalgebra::{DMatrix, DVector, Dyn, Owned};
use tracing::trace;

use ptv_mvg::Camera;

use crate::{Error, N_PARAMS, ParameterMask, ReferencePoint, Result, params};

/// Relative step of the central-difference Jacobian.
const DIFF_STEP: f64 = 1e-6;

/// Reprojection residuals of one camera as a function of its free
/// parameters.
///
/// The full parameter vector is cached; the free entries are set from the
/// solver's reduced vector and the fixed ones keep their starting value.
/// Parameters that do not give a valid camera, or that move a reference
/// point out of view, leave the problem without residuals. The lowest-cost
/// valid parameters seen so far are kept for [`Self::restore_best`].
pub(crate) struct OrientationProblem<'a> {
    base: &'a Camera,
    points: &'a [ReferencePoint],
    /// Indices into the full parameter vector of the free parameters.
    free: Vec<usize>,
    params_cache: [f64; N_PARAMS],
    cam: Camera,
    residuals: Option<DVector<f64>>,
    best: ([f64; N_PARAMS], f64),
}

impl<'a> OrientationProblem<'a> {
    /// Fails if a reference point cannot be projected by `base`.
    pub(crate) fn new(
        base: &'a Camera,
        points: &'a [ReferencePoint],
        mask: &ParameterMask,
    ) -> Result<Self> {
        let params_cache = params::to_vector(base);
        let residuals = residuals_of(base, points)?;
        let cost = residuals.norm_squared();
        Ok(Self {
            base,
            points,
            free: mask.free().map(|p| p.index()).collect(),
            params_cache,
            cam: base.clone(),
            residuals: Some(residuals),
            best: (params_cache, cost),
        })
    }

    pub(crate) fn num_free(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn num_residuals(&self) -> usize {
        self.points.len() * 2
    }

    pub(crate) fn free(&self) -> &[usize] {
        &self.free
    }

    pub(crate) fn camera(&self) -> &Camera {
        &self.cam
    }

    pub(crate) fn full_params(&self) -> &[f64; N_PARAMS] {
        &self.params_cache
    }

    /// Set the free parameters. On error the previous state is kept.
    pub(crate) fn try_set_params(&mut self, x: &DVector<f64>) -> Result<()> {
        debug_assert_eq!(x.nrows(), self.free.len());
        let full = self.expand(x);
        self.apply(full).map(|_| ())
    }

    /// Go back to the lowest-cost valid parameters seen so far and return
    /// their residuals.
    pub(crate) fn restore_best(&mut self) -> Result<DVector<f64>> {
        let (full, _) = self.best;
        self.apply(full)
    }

    fn apply(&mut self, full: [f64; N_PARAMS]) -> Result<DVector<f64>> {
        let cam = params::from_vector(self.base, &full)?;
        let residuals = residuals_of(&cam, self.points)?;
        let cost = residuals.norm_squared();
        if cost < self.best.1 {
            self.best = (full, cost);
        }
        self.cam = cam;
        self.params_cache = full;
        self.residuals = Some(residuals.clone());
        Ok(residuals)
    }

    fn expand(&self, x: &DVector<f64>) -> [f64; N_PARAMS] {
        let mut full = self.params_cache;
        for (k, i) in self.free.iter().enumerate() {
            full[*i] = x[k];
        }
        full
    }

    /// Jacobian of the residuals with respect to the free parameters.
    pub(crate) fn numeric_jacobian(&self) -> Result<DMatrix<f64>> {
        let mut j = DMatrix::zeros(self.num_residuals(), self.free.len());
        for (col, i) in self.free.iter().enumerate() {
            let h = DIFF_STEP * self.params_cache[*i].abs().max(1.0);
            let mut plus = self.params_cache;
            plus[*i] += h;
            let mut minus = self.params_cache;
            minus[*i] -= h;
            let r_plus = residuals_of(&params::from_vector(self.base, &plus)?, self.points)?;
            let r_minus = residuals_of(&params::from_vector(self.base, &minus)?, self.points)?;
            j.set_column(col, &((r_plus - r_minus) / (2.0 * h)));
        }
        Ok(j)
    }
}

impl levenberg_marquardt::LeastSquaresProblem<f64, Dyn, Dyn> for OrientationProblem<'_> {
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        if let Err(e) = self.try_set_params(x) {
            trace!("rejecting parameters: {e}");
            self.params_cache = self.expand(x);
            self.residuals = None;
        }
    }

    /// The free parameters in mask order.
    fn params(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.free.len(),
            self.free.iter().map(|i| self.params_cache[*i]),
        )
    }

    /// Observed minus projected pixel coordinates, two entries per point.
    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals.clone()
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.residuals.as_ref()?;
        self.numeric_jacobian().ok()
    }
}

pub(crate) fn residuals_of(cam: &Camera, points: &[ReferencePoint]) -> Result<DVector<f64>> {
    let mut residuals = DVector::zeros(points.len() * 2);
    for (index, pt) in points.iter().enumerate() {
        let predicted = cam
            .project(&pt.world)
            .ok_or(Error::UnusableReferencePoint { index })?;
        let diff = pt.observed.coords - predicted.coords;
        residuals[2 * index] = diff.x;
        residuals[2 * index + 1] = diff.y;
    }
    Ok(residuals)
}

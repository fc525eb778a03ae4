//! Least-squares refinement of a single camera's orientation.
//!
//! Given reference points with known world coordinates and their observed
//! image positions in one camera, [`refine`] adjusts the free entries of the
//! camera's parameter vector (exterior orientation, interior orientation,
//! distortion and an interface shift, see [`Parameter`]) to minimize the
//! summed squared reprojection error. Projection includes refraction through
//! the camera's interface stack.
//!
//! Minimization uses [`levenberg_marquardt`]. Before solving, the rank of the
//! column-normalized Jacobian is computed with [`lstsq`]; a system whose free
//! parameters cannot be determined from the reference points is reported as
//! [`Error::DegenerateSystem`] instead of producing a calibration.
#![deny(rust_2018_idioms)]

use nalgebra::{DMatrix, DVector, Point3, Vector2};
use serde::{Deserialize, Serialize};
use levenberg_marquardt::LevenbergMarquardt;
use tracing::{debug, info, warn};

use ptv_mvg::{Camera, DistortedPixel, PtvMvgError};

mod params;
mod problem;

pub use params::{N_PARAMS, Parameter, ParameterMask, RefineFlags};

use problem::OrientationProblem;

/// Singular values of the column-normalized Jacobian below this count as
/// zero.
const RANK_EPSILON: f64 = 1e-9;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(
        "cannot determine {n_free} free parameters from {n_points} reference points (jacobian rank {rank:?})"
    )]
    DegenerateSystem {
        n_free: usize,
        n_points: usize,
        /// Rank of the Jacobian if it was computed.
        rank: Option<usize>,
    },
    #[error("normal equations matrix is singular")]
    SingularNormalMatrix,
    #[error("reference point {index} cannot be projected into the camera")]
    UnusableReferencePoint { index: usize },
    #[error("no free parameters")]
    NoFreeParameters,
    #[error("least squares solve failed: {0}")]
    Lstsq(&'static str),
    #[error(transparent)]
    Mvg(#[from] PtvMvgError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A point with known world coordinates and its observed image position.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    pub world: Point3<f64>,
    pub observed: DistortedPixel,
}

pub const DEFAULT_STEP_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

fn default_step_tolerance() -> f64 {
    DEFAULT_STEP_TOLERANCE
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// Stopping criteria of [`refine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefinerConfig {
    /// Stop when the scaled parameter update falls below this fraction of
    /// the scaled parameter norm.
    #[serde(default = "default_step_tolerance")]
    pub step_tolerance: f64,
    /// The solver gives up after `max_iterations * (free + 1)` evaluations
    /// of the residuals. Zero skips the solve.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            step_tolerance: DEFAULT_STEP_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Fit diagnostics of a successful refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementReport {
    /// Evaluations of the residuals made by the solver.
    pub iterations: usize,
    /// `false` if the solver stopped without meeting a tolerance.
    pub converged: bool,
    /// RMS reprojection error in pixels before refinement.
    pub initial_rms: f64,
    /// RMS reprojection error in pixels after refinement.
    pub final_rms: f64,
    /// A posteriori standard deviation of unit weight, in pixels.
    pub sigma0: f64,
    /// Final value of every parameter.
    pub parameters: [f64; N_PARAMS],
    /// Standard error of every free parameter, `None` for fixed ones.
    pub std_errors: [Option<f64>; N_PARAMS],
    /// Observed minus projected position of each reference point.
    pub residuals: Vec<Vector2<f64>>,
}

impl RefinementReport {
    pub fn value(&self, p: Parameter) -> f64 {
        self.parameters[p.index()]
    }

    pub fn std_error(&self, p: Parameter) -> Option<f64> {
        self.std_errors[p.index()]
    }
}

/// RMS of the per-point reprojection distances.
fn rms(residuals: &DVector<f64>) -> f64 {
    let n_points = residuals.len() / 2;
    if n_points == 0 {
        return 0.0;
    }
    (residuals.norm_squared() / n_points as f64).sqrt()
}

/// Rank of `j` after scaling its columns to unit norm.
fn jacobian_rank(j: &DMatrix<f64>, r: &DVector<f64>) -> Result<usize> {
    let mut js = j.clone();
    for mut col in js.column_iter_mut() {
        let norm = col.norm();
        if norm > 0.0 {
            col /= norm;
        }
    }
    let result = lstsq::lstsq(&js, r, RANK_EPSILON).map_err(Error::Lstsq)?;
    Ok(result.rank)
}

/// Refine the free parameters of `camera` from reference points.
///
/// The rank of the Jacobian at the starting point is checked first. The
/// camera then takes the lowest-cost parameters the solver visited.
///
/// `camera` is only modified if `Ok` is returned.
#[tracing::instrument(level = "debug", skip_all, fields(camera = camera.name()))]
pub fn refine(
    camera: &mut Camera,
    points: &[ReferencePoint],
    mask: &ParameterMask,
    config: &RefinerConfig,
) -> Result<RefinementReport> {
    let n_free = mask.count_free();
    let n_points = points.len();
    if n_free == 0 {
        return Err(Error::NoFreeParameters);
    }
    if n_points < n_free {
        return Err(Error::DegenerateSystem {
            n_free,
            n_points,
            rank: None,
        });
    }

    let base = camera.clone();
    let initial_residuals = problem::residuals_of(&base, points)?;
    let problem = OrientationProblem::new(&base, points, mask)?;
    let initial_rms = rms(&initial_residuals);
    debug!(
        "refining {n_free} of {} parameters from {n_points} points, initial rms {initial_rms:.4} px",
        N_PARAMS
    );

    let rank = jacobian_rank(&problem.numeric_jacobian()?, &initial_residuals)?;
    if rank < n_free {
        return Err(Error::DegenerateSystem {
            n_free,
            n_points,
            rank: Some(rank),
        });
    }

    let (mut problem, iterations, converged) = if config.max_iterations == 0 {
        (problem, 0, false)
    } else {
        let (problem, report) = LevenbergMarquardt::new()
            .with_xtol(config.step_tolerance.max(0.0))
            .with_patience(config.max_iterations)
            .minimize(problem);
        debug!(
            "solver stopped: {:?} after {} evaluations",
            report.termination, report.number_of_evaluations
        );
        (
            problem,
            report.number_of_evaluations,
            report.termination.was_successful(),
        )
    };
    let residuals = problem.restore_best()?;
    let cost = residuals.norm_squared();

    // covariance from the unscaled normal equations
    let j = problem.numeric_jacobian()?;
    let n_res = problem.num_residuals();
    let dof = n_res - problem.num_free();
    let sigma0 = if dof > 0 {
        (cost / dof as f64).sqrt()
    } else {
        0.0
    };
    let covariance = (j.transpose() * &j)
        .cholesky()
        .ok_or(Error::SingularNormalMatrix)?
        .inverse();
    let mut std_errors = [None; N_PARAMS];
    for (k, i) in problem.free().iter().enumerate() {
        std_errors[*i] = Some(sigma0 * covariance[(k, k)].sqrt());
    }

    let final_rms = rms(&residuals);
    if !converged {
        warn!(
            "stopped after {iterations} evaluations without converging, rms {final_rms:.4} px"
        );
    }
    info!(
        "refined {}: rms {initial_rms:.4} -> {final_rms:.4} px in {iterations} evaluations, sigma0 {sigma0:.4}",
        base.name()
    );

    let report = RefinementReport {
        iterations,
        converged,
        initial_rms,
        final_rms,
        sigma0,
        parameters: *problem.full_params(),
        std_errors,
        residuals: residuals
            .as_slice()
            .chunks_exact(2)
            .map(|c| Vector2::new(c[0], c[1]))
            .collect(),
    };
    *camera = problem.camera().clone();
    Ok(report)
}

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use ptv_mvg::{AddedParameters, Camera, Exterior, Interior, Result};

pub const N_PARAMS: usize = 17;

/// One entry of the camera parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Parameter {
    X0,
    Y0,
    Z0,
    Omega,
    Phi,
    Kappa,
    Cc,
    Xh,
    Yh,
    K1,
    K2,
    K3,
    P1,
    P2,
    Scx,
    She,
    /// Shift of every interface plane along the stack normal.
    InterfaceShift,
}

impl Parameter {
    pub const ALL: [Parameter; N_PARAMS] = [
        Parameter::X0,
        Parameter::Y0,
        Parameter::Z0,
        Parameter::Omega,
        Parameter::Phi,
        Parameter::Kappa,
        Parameter::Cc,
        Parameter::Xh,
        Parameter::Yh,
        Parameter::K1,
        Parameter::K2,
        Parameter::K3,
        Parameter::P1,
        Parameter::P2,
        Parameter::Scx,
        Parameter::She,
        Parameter::InterfaceShift,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Parameter::X0 => "x0",
            Parameter::Y0 => "y0",
            Parameter::Z0 => "z0",
            Parameter::Omega => "omega",
            Parameter::Phi => "phi",
            Parameter::Kappa => "kappa",
            Parameter::Cc => "cc",
            Parameter::Xh => "xh",
            Parameter::Yh => "yh",
            Parameter::K1 => "k1",
            Parameter::K2 => "k2",
            Parameter::K3 => "k3",
            Parameter::P1 => "p1",
            Parameter::P2 => "p2",
            Parameter::Scx => "scx",
            Parameter::She => "she",
            Parameter::InterfaceShift => "interface_shift",
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which parameters are free in a refinement. Fixed ones keep their value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterMask(pub [bool; N_PARAMS]);

impl ParameterMask {
    pub fn none() -> Self {
        Self([false; N_PARAMS])
    }

    /// Position and angles free, everything else fixed.
    pub fn exterior() -> Self {
        Self::none()
            .with(Parameter::X0, true)
            .with(Parameter::Y0, true)
            .with(Parameter::Z0, true)
            .with(Parameter::Omega, true)
            .with(Parameter::Phi, true)
            .with(Parameter::Kappa, true)
    }

    pub fn with(mut self, p: Parameter, free: bool) -> Self {
        self.0[p.index()] = free;
        self
    }

    pub fn is_free(&self, p: Parameter) -> bool {
        self.0[p.index()]
    }

    pub fn free(&self) -> impl Iterator<Item = Parameter> + '_ {
        Parameter::ALL.into_iter().filter(|p| self.is_free(*p))
    }

    pub fn count_free(&self) -> usize {
        self.0.iter().filter(|f| **f).count()
    }
}

/// Refinement switches as stored in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefineFlags {
    #[serde(default = "default_true")]
    pub position: bool,
    #[serde(default = "default_true")]
    pub angles: bool,
    #[serde(default)]
    pub cc: bool,
    #[serde(default)]
    pub xh: bool,
    #[serde(default)]
    pub yh: bool,
    #[serde(default)]
    pub k1: bool,
    #[serde(default)]
    pub k2: bool,
    #[serde(default)]
    pub k3: bool,
    #[serde(default)]
    pub p1: bool,
    #[serde(default)]
    pub p2: bool,
    #[serde(default)]
    pub scx: bool,
    #[serde(default)]
    pub she: bool,
    #[serde(default)]
    pub interface_shift: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RefineFlags {
    fn default() -> Self {
        Self {
            position: true,
            angles: true,
            cc: false,
            xh: false,
            yh: false,
            k1: false,
            k2: false,
            k3: false,
            p1: false,
            p2: false,
            scx: false,
            she: false,
            interface_shift: false,
        }
    }
}

impl From<&RefineFlags> for ParameterMask {
    fn from(f: &RefineFlags) -> Self {
        use Parameter::*;
        ParameterMask::none()
            .with(X0, f.position)
            .with(Y0, f.position)
            .with(Z0, f.position)
            .with(Omega, f.angles)
            .with(Phi, f.angles)
            .with(Kappa, f.angles)
            .with(Cc, f.cc)
            .with(Xh, f.xh)
            .with(Yh, f.yh)
            .with(K1, f.k1)
            .with(K2, f.k2)
            .with(K3, f.k3)
            .with(P1, f.p1)
            .with(P2, f.p2)
            .with(Scx, f.scx)
            .with(She, f.she)
            .with(InterfaceShift, f.interface_shift)
    }
}

impl From<RefineFlags> for ParameterMask {
    fn from(f: RefineFlags) -> Self {
        (&f).into()
    }
}

/// The parameter vector of `cam`. The interface shift is always zero.
pub(crate) fn to_vector(cam: &Camera) -> [f64; N_PARAMS] {
    let p = cam.exterior().position();
    let (omega, phi, kappa) = cam.exterior().angles();
    let i = cam.interior();
    let a = cam.added();
    [
        p.x, p.y, p.z, omega, phi, kappa, i.cc, i.xh, i.yh, a.k1, a.k2, a.k3, a.p1, a.p2, a.scx,
        a.she, 0.0,
    ]
}

/// A copy of `base` with all parameters taken from `v`.
///
/// The interface shift is applied relative to the stack of `base`.
pub(crate) fn from_vector(base: &Camera, v: &[f64; N_PARAMS]) -> Result<Camera> {
    let exterior = Exterior::new(Point3::new(v[0], v[1], v[2]), v[3], v[4], v[5]);
    let interior = Interior {
        cc: v[6],
        xh: v[7],
        yh: v[8],
    };
    let added = AddedParameters {
        k1: v[9],
        k2: v[10],
        k3: v[11],
        p1: v[12],
        p2: v[13],
        scx: v[14],
        she: v[15],
    };
    let interfaces = if v[16] == 0.0 {
        base.interfaces().clone()
    } else {
        base.interfaces().shifted(v[16])
    };
    Camera::new(
        base.name(),
        exterior,
        interior,
        added,
        base.sensor().clone(),
        interfaces,
    )
}

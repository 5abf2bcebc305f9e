//! Process-wide configuration
//!
//! `Params` plays the role of load-time parameters: how many plain devices to
//! create, the default block geometry and the per-store allocation caps.
//! `Defaults` is the live, shared copy of the geometry. Stores read it when
//! they are created and again on every trim, so changing it affects stores
//! from their next trim on.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::io::{Geometry, StoreLimits, DEFAULT_QSET, DEFAULT_QUANTUM};

/// Default number of plain devices
pub const DEFAULT_NR_DEVS: usize = 4;

/// Errors from reading parameters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    #[error("{name}: cannot parse '{value}' as a number")]
    NotANumber { name: &'static str, value: String },

    #[error("invalid geometry: quantum={quantum} qset={qset}")]
    InvalidGeometry { quantum: usize, qset: usize },
}

/// Load-time parameters of a device registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Number of plain (unrestricted) devices
    pub nr_devs: usize,
    /// Initial default geometry
    pub geometry: Geometry,
    /// Allocation caps applied to every store
    pub limits: StoreLimits,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            nr_devs: DEFAULT_NR_DEVS,
            geometry: Geometry::default(),
            limits: StoreLimits::unlimited(),
        }
    }
}

impl Params {
    /// Read parameters from `SCULL_*` environment variables
    ///
    /// Recognized: `SCULL_NR_DEVS`, `SCULL_QUANTUM`, `SCULL_QSET`,
    /// `SCULL_MAX_QSETS`, `SCULL_MAX_QUANTA`. Unset variables keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is not a number or the resulting
    /// geometry is invalid.
    pub fn from_env() -> Result<Self, ParamsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, with an explicit variable lookup
    ///
    /// # Errors
    ///
    /// See `from_env`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ParamsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &'static str, default: usize| -> Result<usize, ParamsError> {
            match lookup(name) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ParamsError::NotANumber { name, value }),
            }
        };

        let quantum = number("SCULL_QUANTUM", DEFAULT_QUANTUM)?;
        let qset = number("SCULL_QSET", DEFAULT_QSET)?;
        let geometry =
            Geometry::new(quantum, qset).map_err(|_| ParamsError::InvalidGeometry { quantum, qset })?;

        Ok(Self {
            nr_devs: number("SCULL_NR_DEVS", DEFAULT_NR_DEVS)?,
            geometry,
            limits: StoreLimits {
                max_qsets: number("SCULL_MAX_QSETS", 0)?,
                max_quanta: number("SCULL_MAX_QUANTA", 0)?,
            },
        })
    }
}

/// Shared, adjustable default geometry
///
/// Clones share the same value.
#[derive(Debug, Clone)]
pub struct Defaults(Arc<RwLock<Geometry>>);

impl Defaults {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self(Arc::new(RwLock::new(geometry)))
    }

    /// Current default geometry
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        *self.0.read()
    }

    /// Replace the default geometry; stores pick it up on their next trim
    pub fn set(&self, geometry: Geometry) {
        let mut current = self.0.write();
        log::debug!("defaults: geometry {:?} -> {:?}", *current, geometry);
        *current = geometry;
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::new(Geometry::default())
    }
}

//! In-memory model for gridded reforecast data.

pub mod decode;
pub mod netcdf_out;
pub mod transform;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ndarray::ArrayD;

/// Axis of a gridded variable, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Time,
    Member,
    Step,
    Level,
    Latitude,
    Longitude,
}

impl Dim {
    pub fn name(&self) -> &'static str {
        match self {
            Dim::Time => "time",
            Dim::Member => "number",
            Dim::Step => "step",
            Dim::Level => "isobaricInhPa",
            Dim::Latitude => "latitude",
            Dim::Longitude => "longitude",
        }
    }

    pub fn from_name(name: &str) -> Option<Dim> {
        match name {
            "time" => Some(Dim::Time),
            "number" => Some(Dim::Member),
            "step" => Some(Dim::Step),
            "isobaricInhPa" => Some(Dim::Level),
            "latitude" => Some(Dim::Latitude),
            "longitude" => Some(Dim::Longitude),
            _ => None,
        }
    }
}

/// One named data variable and the axes its values are laid out on.
#[derive(Debug, Clone)]
pub struct DataVar {
    pub dims: Vec<Dim>,
    pub values: ArrayD<f64>,
}

impl DataVar {
    pub fn axis_of(&self, dim: Dim) -> Option<usize> {
        self.dims.iter().position(|d| *d == dim)
    }
}

/// A gridded dataset keyed by coordinate axes.
///
/// Decoded from one grib object, mutated in place by the subset/reduce/reshape
/// steps, then persisted to one NetCDF file. The merge step reuses the same
/// type with multi-entry time and member axes.
#[derive(Debug, Clone)]
pub struct GridDataset {
    pub times: Vec<DateTime<Utc>>,
    pub members: Vec<i64>,
    /// Forecast steps in hours; drained by the step reduction.
    pub steps: Vec<i64>,
    pub levels: Option<Vec<f64>>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Scalar coordinates carried along by the decoder, e.g. `surface`.
    pub extra_coords: BTreeMap<String, f64>,
    pub variables: BTreeMap<String, DataVar>,
}

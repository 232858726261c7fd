//! Subset, reduce, and reshape steps applied to each decoded object.

use anyhow::{ensure, Result};
use chrono::Duration;
use ndarray::{ArrayD, Axis};

use super::{DataVar, Dim, GridDataset};
use crate::selection::SelectionWindow;

/// Reduction applied across the forecast-step axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    Mean,
}

/// Coordinate fields the grib decoder carries that the outputs do not need.
pub const REDUNDANT_COORDS: [&str; 2] = ["valid_time", "surface"];

impl GridDataset {
    /// Applies the selection window to the step, latitude, and longitude axes.
    ///
    /// The latitude axis is stored descending, so the window's (max, min)
    /// latitude range selects a contiguous run in storage order.
    pub fn select(mut self, window: &SelectionWindow) -> Result<Self> {
        let (lat_max, lat_min) = window.latitude_range();
        let (lon_min, lon_max) = window.longitude_range();
        let (step_min, step_max) = window.step_hours_range();

        let lat_idx = indices_where(&self.latitudes, |v| v >= lat_min && v <= lat_max);
        let lon_idx = indices_where(&self.longitudes, |v| v >= lon_min && v <= lon_max);
        let step_idx: Vec<usize> = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| (step_min..=step_max).contains(*s))
            .map(|(i, _)| i)
            .collect();

        ensure!(!lat_idx.is_empty(), "selection window keeps no latitudes");
        ensure!(!lon_idx.is_empty(), "selection window keeps no longitudes");
        ensure!(
            !step_idx.is_empty(),
            "selection window keeps no forecast steps"
        );

        for var in self.variables.values_mut() {
            if let Some(axis) = var.axis_of(Dim::Step) {
                var.values = var.values.select(Axis(axis), &step_idx);
            }
            if let Some(axis) = var.axis_of(Dim::Latitude) {
                var.values = var.values.select(Axis(axis), &lat_idx);
            }
            if let Some(axis) = var.axis_of(Dim::Longitude) {
                var.values = var.values.select(Axis(axis), &lon_idx);
            }
        }

        self.latitudes = take_indices(&self.latitudes, &lat_idx);
        self.longitudes = take_indices(&self.longitudes, &lon_idx);
        self.steps = take_indices(&self.steps, &step_idx);

        Ok(self)
    }

    /// Maps longitudes into [-180, 180). Coordinate values only; the data
    /// ordering is untouched, so this runs after the 0-360 selection.
    pub fn normalize_longitudes(mut self) -> Self {
        for lon in &mut self.longitudes {
            *lon = (*lon + 180.0).rem_euclid(360.0) - 180.0;
        }
        self
    }

    /// Anchors the timestamp to its verification time by shifting it forward
    /// by the largest forecast step present.
    pub fn shift_time_to_verification(mut self) -> Self {
        if let Some(max_step) = self.steps.iter().copied().max() {
            for time in &mut self.times {
                *time += Duration::hours(max_step);
            }
        }
        self
    }

    /// Collapses the forecast-step axis. NaN holes left by the fallback
    /// decoder are skipped, matching the combine semantics of the source data.
    pub fn reduce_steps(mut self, reduction: Reduction) -> Self {
        for var in self.variables.values_mut() {
            if let Some(axis) = var.axis_of(Dim::Step) {
                var.values = reduce_axis(&var.values, axis, reduction);
                var.dims.remove(axis);
            }
        }
        self.steps.clear();
        self
    }

    /// Inserts singleton leading time and member axes so every output has a
    /// uniform layout for the final concatenation. A level axis, when one
    /// exists, keeps its place after the inserted pair.
    pub fn into_output_layout(mut self) -> Self {
        let variables = std::mem::take(&mut self.variables);
        self.variables = variables
            .into_iter()
            .map(|(name, var)| {
                let DataVar { mut dims, values } = var;
                let values = values.insert_axis(Axis(0)).insert_axis(Axis(1));
                dims.insert(0, Dim::Time);
                dims.insert(1, Dim::Member);
                (name, DataVar { dims, values })
            })
            .collect();
        self
    }

    /// Drops the fixed set of redundant scalar coordinates, if present.
    pub fn drop_redundant_coords(mut self) -> Self {
        for name in REDUNDANT_COORDS {
            self.extra_coords.remove(name);
        }
        self
    }
}

fn indices_where(values: &[f64], keep: impl Fn(f64) -> bool) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| keep(**v))
        .map(|(i, _)| i)
        .collect()
}

fn take_indices<T: Copy>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i]).collect()
}

fn reduce_axis(values: &ArrayD<f64>, axis: usize, reduction: Reduction) -> ArrayD<f64> {
    values.map_axis(Axis(axis), |lane| {
        let mut sum = 0.0;
        let mut count = 0usize;
        for v in lane.iter() {
            if !v.is_nan() {
                sum += v;
                count += 1;
            }
        }
        match reduction {
            Reduction::Sum => sum,
            Reduction::Mean => {
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            }
        }
    })
}

// -- Tests -------------------------------------------------------------------

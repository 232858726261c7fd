//! Spatial and temporal selection window for reforecast grids.

use anyhow::{bail, Result};

/// A canonical selection descriptor for slicing a gridded dataset.
///
/// Latitude is held descending (north to south, the storage order of the
/// reforecast grids); longitude and forecast step are held ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionWindow {
    latitude: (f64, f64),
    longitude: (f64, f64),
    step_hours: (i64, i64),
}

impl SelectionWindow {
    /// Builds a window from unordered bound pairs. Forecast-day bounds are
    /// converted to whole hours.
    pub fn new(
        latitude_bounds: (f64, f64),
        longitude_bounds: (f64, f64),
        forecast_days_bounds: (f64, f64),
    ) -> Self {
        let (lat_a, lat_b) = latitude_bounds;
        let (lon_a, lon_b) = longitude_bounds;
        let (day_a, day_b) = forecast_days_bounds;

        SelectionWindow {
            latitude: (lat_a.max(lat_b), lat_a.min(lat_b)),
            longitude: (lon_a.min(lon_b), lon_a.max(lon_b)),
            step_hours: (
                (day_a.min(day_b) * 24.0).round() as i64,
                (day_a.max(day_b) * 24.0).round() as i64,
            ),
        }
    }

    /// Latitude range, descending (max, min).
    pub fn latitude_range(&self) -> (f64, f64) {
        self.latitude
    }

    /// Longitude range, ascending (min, max).
    pub fn longitude_range(&self) -> (f64, f64) {
        self.longitude
    }

    /// Forecast-step range in hours, ascending (min, max).
    pub fn step_hours_range(&self) -> (i64, i64) {
        self.step_hours
    }
}

/// Checks the documented bound ranges before any network access.
pub fn validate_bounds(
    latitude_bounds: (f64, f64),
    longitude_bounds: (f64, f64),
    forecast_days_bounds: (f64, f64),
) -> Result<()> {
    let (lat_a, lat_b) = latitude_bounds;
    if lat_a.min(lat_b) < -90.0 || lat_a.max(lat_b) > 90.0 {
        bail!(
            "latitude bounds need to be within -90 and 90, got: ({}, {})",
            lat_a,
            lat_b
        );
    }

    let (lon_a, lon_b) = longitude_bounds;
    if lon_a.min(lon_b) < 0.0 || lon_a.max(lon_b) >= 360.0 {
        bail!(
            "longitude bounds must be positive and between 0-360, got: ({}, {})",
            lon_a,
            lon_b
        );
    }

    let (day_a, day_b) = forecast_days_bounds;
    if day_a.min(day_b) < 0.0 || day_a.max(day_b) > 16.0 {
        bail!(
            "forecast day bounds must be between 0-16 days, got: ({}, {})",
            day_a,
            day_b
        );
    }

    Ok(())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_canonicalise_unordered_bounds() {
        let window = SelectionWindow::new((55.0, 22.0), (291.0, 230.0), (6.5, 5.5));

        assert_eq!(window.latitude_range(), (55.0, 22.0));
        assert_eq!(window.longitude_range(), (230.0, 291.0));
        assert_eq!(window.step_hours_range(), (132, 156));

        // the same bounds in the opposite order produce the same window
        let flipped = SelectionWindow::new((22.0, 55.0), (230.0, 291.0), (5.5, 6.5));
        assert_eq!(window, flipped);
    }

    #[test]
    fn should_convert_fractional_days_to_hours() {
        let window = SelectionWindow::new((0.0, 1.0), (0.0, 1.0), (0.25, 10.0));
        assert_eq!(window.step_hours_range(), (6, 240));
    }

    #[test]
    fn should_accept_documented_bounds() {
        assert!(validate_bounds((22.0, 55.0), (230.0, 291.0), (5.5, 6.5)).is_ok());
        assert!(validate_bounds((-90.0, 90.0), (0.0, 359.9), (0.0, 16.0)).is_ok());
    }

    #[test]
    fn should_reject_out_of_range_latitude() {
        let result = validate_bounds((-95.0, 10.0), (230.0, 291.0), (5.5, 6.5));
        assert!(result.unwrap_err().to_string().contains("latitude"));
    }

    #[test]
    fn should_reject_out_of_range_longitude() {
        let result = validate_bounds((22.0, 55.0), (-10.0, 50.0), (5.5, 6.5));
        assert!(result.unwrap_err().to_string().contains("longitude"));

        // 360 itself is out of the half-open range
        assert!(validate_bounds((22.0, 55.0), (0.0, 360.0), (5.5, 6.5)).is_err());
    }

    #[test]
    fn should_reject_out_of_range_forecast_days() {
        let result = validate_bounds((22.0, 55.0), (230.0, 291.0), (0.0, 17.0));
        assert!(result.unwrap_err().to_string().contains("forecast day"));
    }
}

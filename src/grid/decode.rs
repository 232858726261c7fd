//! GRIB decoding into gridded datasets.
//!
//! The eccodes boundary is kept thin: `read_messages` turns a grib file into
//! plain [`GribField`] values, and the assembly steps below are pure over
//! those.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{anyhow, ensure, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use eccodes::{CodesFile, FallibleIterator, KeyRead, ProductKind};
use ndarray::{Array2, ArrayD, Axis, IxDyn};

use super::{DataVar, Dim, GridDataset};

pub const ISOBARIC_LEVEL_TYPE: &str = "isobaricInhPa";

/// One decoded GRIB message.
#[derive(Debug, Clone)]
pub struct GribField {
    pub short_name: String,
    pub type_of_level: String,
    pub level: i64,
    pub step_hours: i64,
    pub member: i64,
    pub init_time: DateTime<Utc>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub values: Array2<f64>,
}

/// Reads every message in a grib file.
pub fn read_messages(path: &Path) -> Result<Vec<GribField>> {
    let mut handle = CodesFile::new_from_file(path.to_path_buf(), ProductKind::GRIB)?;
    let mut fields = Vec::new();

    while let Some(msg) = handle.ref_message_iter().next()? {
        let short_name: String = msg.read_key("shortName")?;
        let type_of_level: String = msg.read_key("typeOfLevel")?;
        let level: i64 = msg.read_key("level")?;
        let step_hours: i64 = msg.read_key("endStep")?;
        let member: i64 = msg.read_key("number").unwrap_or(0);
        let data_date: i64 = msg.read_key("dataDate")?;
        let data_time: i64 = msg.read_key("dataTime")?;
        let latitudes: Vec<f64> = msg.read_key("distinctLatitudes")?;
        let longitudes: Vec<f64> = msg.read_key("distinctLongitudes")?;
        let values = msg.to_ndarray()?;

        fields.push(GribField {
            short_name,
            type_of_level,
            level,
            step_hours,
            member,
            init_time: parse_init_time(data_date, data_time)?,
            latitudes,
            longitudes,
            values,
        });
    }

    Ok(fields)
}

/// Opens a grib file as a gridded dataset, trying the strict hypercube
/// assembly first and falling back to combining per-variable sub-datasets by
/// coordinate.
pub fn open_dataset(path: &Path) -> Result<GridDataset> {
    let fields = read_messages(path)?;
    match assemble_strict(&fields) {
        Ok(dataset) => Ok(dataset),
        Err(_) => assemble_combined(&fields),
    }
}

/// Assembles messages into one dense hypercube. Fails on mixed level types or
/// ragged step/level coverage.
pub fn assemble_strict(fields: &[GribField]) -> Result<GridDataset> {
    let first = check_uniform(fields)?;

    let level_types: BTreeSet<&str> = fields.iter().map(|f| f.type_of_level.as_str()).collect();
    ensure!(level_types.len() == 1, "grib messages mix level types");

    let steps = distinct_steps(fields);
    let levels = (first.type_of_level == ISOBARIC_LEVEL_TYPE).then(|| distinct_levels(fields));

    let mut dataset = empty_dataset(fields, first, steps, levels);

    let var_names: BTreeSet<&str> = fields.iter().map(|f| f.short_name.as_str()).collect();
    for name in var_names {
        let var_fields: Vec<&GribField> =
            fields.iter().filter(|f| f.short_name == name).collect();
        let var = build_hypercube(
            name,
            &var_fields,
            &dataset.steps,
            dataset.levels.as_deref(),
            true,
        )?;
        dataset.variables.insert(name.to_string(), var);
    }

    Ok(dataset)
}

/// Fallback assembly: each variable becomes its own sub-dataset and the
/// sub-datasets are combined on the union of their coordinates, leaving NaN
/// where a variable has no message for a step/level pair.
pub fn assemble_combined(fields: &[GribField]) -> Result<GridDataset> {
    let first = check_uniform(fields)?;

    let steps = distinct_steps(fields);
    let isobaric: Vec<&GribField> = fields
        .iter()
        .filter(|f| f.type_of_level == ISOBARIC_LEVEL_TYPE)
        .collect();
    let levels = (!isobaric.is_empty()).then(|| {
        isobaric
            .iter()
            .map(|f| f.level)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|l| l as f64)
            .collect::<Vec<f64>>()
    });

    let mut dataset = empty_dataset(fields, first, steps, levels);

    let mut groups: BTreeMap<&str, Vec<&GribField>> = BTreeMap::new();
    for field in fields {
        groups.entry(field.short_name.as_str()).or_default().push(field);
    }

    for (name, var_fields) in groups {
        let var_is_isobaric = var_fields
            .iter()
            .all(|f| f.type_of_level == ISOBARIC_LEVEL_TYPE);
        let var_levels = if var_is_isobaric {
            dataset.levels.as_deref()
        } else {
            ensure!(
                var_fields
                    .iter()
                    .map(|f| f.type_of_level.as_str())
                    .collect::<BTreeSet<_>>()
                    .len()
                    == 1,
                "variable {} mixes level types",
                name
            );
            None
        };
        let var = build_hypercube(name, &var_fields, &dataset.steps, var_levels, false)?;
        dataset.variables.insert(name.to_string(), var);
    }

    Ok(dataset)
}

fn check_uniform(fields: &[GribField]) -> Result<&GribField> {
    let first = fields
        .first()
        .ok_or_else(|| anyhow!("file contains no grib messages"))?;

    for field in &fields[1..] {
        ensure!(
            field.latitudes == first.latitudes && field.longitudes == first.longitudes,
            "grib messages use different grids"
        );
        ensure!(
            field.init_time == first.init_time,
            "grib messages use different initialization times"
        );
        ensure!(
            field.member == first.member,
            "grib messages use different ensemble members"
        );
    }

    Ok(first)
}

fn distinct_steps(fields: &[GribField]) -> Vec<i64> {
    fields
        .iter()
        .map(|f| f.step_hours)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn distinct_levels(fields: &[GribField]) -> Vec<f64> {
    fields
        .iter()
        .map(|f| f.level)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|l| l as f64)
        .collect()
}

fn empty_dataset(
    fields: &[GribField],
    first: &GribField,
    steps: Vec<i64>,
    levels: Option<Vec<f64>>,
) -> GridDataset {
    let mut extra_coords = BTreeMap::new();
    if let Some(max_step) = steps.iter().copied().max() {
        let valid_time = first.init_time + Duration::hours(max_step);
        extra_coords.insert("valid_time".to_string(), valid_time.timestamp() as f64);
    }
    if let Some(surface) = fields.iter().find(|f| f.type_of_level == "surface") {
        extra_coords.insert("surface".to_string(), surface.level as f64);
    }

    GridDataset {
        times: vec![first.init_time],
        members: vec![first.member],
        steps,
        levels,
        latitudes: first.latitudes.clone(),
        longitudes: first.longitudes.clone(),
        extra_coords,
        variables: BTreeMap::new(),
    }
}

fn build_hypercube(
    name: &str,
    fields: &[&GribField],
    steps: &[i64],
    levels: Option<&[f64]>,
    dense: bool,
) -> Result<DataVar> {
    let first = fields
        .first()
        .ok_or_else(|| anyhow!("no messages for variable {}", name))?;
    let (n_lat, n_lon) = first.values.dim();

    let mut shape = vec![steps.len()];
    if let Some(levels) = levels {
        shape.push(levels.len());
    }
    shape.push(n_lat);
    shape.push(n_lon);

    let mut values = ArrayD::from_elem(IxDyn(&shape), f64::NAN);
    let mut seen: BTreeSet<(usize, usize)> = BTreeSet::new();

    for field in fields {
        let step_idx = steps
            .binary_search(&field.step_hours)
            .map_err(|_| anyhow!("variable {} has an unexpected step", name))?;
        let level_idx = match levels {
            Some(levels) => levels
                .iter()
                .position(|l| *l == field.level as f64)
                .ok_or_else(|| anyhow!("variable {} has an unexpected level", name))?,
            None => 0,
        };

        ensure!(
            seen.insert((step_idx, level_idx)),
            "variable {} has duplicate messages",
            name
        );

        let slab = values.index_axis_mut(Axis(0), step_idx);
        let mut slab = if levels.is_some() {
            slab.index_axis_move(Axis(0), level_idx)
        } else {
            slab
        };
        slab.assign(&field.values);
    }

    if dense {
        let expected = steps.len() * levels.map_or(1, <[f64]>::len);
        ensure!(
            seen.len() == expected,
            "variable {} does not cover every step/level pair",
            name
        );
    }

    let mut dims = vec![Dim::Step];
    if levels.is_some() {
        dims.push(Dim::Level);
    }
    dims.push(Dim::Latitude);
    dims.push(Dim::Longitude);

    Ok(DataVar { dims, values })
}

fn parse_init_time(data_date: i64, data_time: i64) -> Result<DateTime<Utc>> {
    let year = (data_date / 10_000) as i32;
    let month = ((data_date / 100) % 100) as u32;
    let day = (data_date % 100) as u32;
    let hour = (data_time / 100) as u32;
    let minute = (data_time % 100) as u32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            anyhow!(
                "grib message has an invalid init time: {}/{}",
                data_date,
                data_time
            )
        })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use ndarray::Array2;

    use super::*;

    fn field(
        short_name: &str,
        type_of_level: &str,
        level: i64,
        step_hours: i64,
        fill: f64,
    ) -> GribField {
        GribField {
            short_name: short_name.to_string(),
            type_of_level: type_of_level.to_string(),
            level,
            step_hours,
            member: 0,
            init_time: Utc.with_ymd_and_hms(2016, 5, 18, 0, 0, 0).unwrap(),
            latitudes: vec![55.0, 40.0],
            longitudes: vec![230.0, 250.0, 290.0],
            values: Array2::from_elem((2, 3), fill),
        }
    }

    #[test]
    fn should_assemble_dense_surface_hypercube() {
        let fields = vec![
            field("cape", "surface", 0, 132, 1.0),
            field("cape", "surface", 0, 135, 2.0),
        ];

        let ds = assemble_strict(&fields).unwrap();

        assert_eq!(ds.steps, vec![132, 135]);
        assert_eq!(ds.levels, None);
        assert_eq!(ds.latitudes, vec![55.0, 40.0]);

        let var = &ds.variables["cape"];
        assert_eq!(
            var.dims,
            vec![Dim::Step, Dim::Latitude, Dim::Longitude]
        );
        assert_eq!(var.values.shape(), &[2, 2, 3]);
        assert_eq!(var.values[[0, 0, 0]], 1.0);
        assert_eq!(var.values[[1, 1, 2]], 2.0);
    }

    #[test]
    fn should_assemble_level_axis_for_isobaric_fields() {
        let fields = vec![
            field("hgt", ISOBARIC_LEVEL_TYPE, 500, 132, 1.0),
            field("hgt", ISOBARIC_LEVEL_TYPE, 850, 132, 2.0),
        ];

        let ds = assemble_strict(&fields).unwrap();

        assert_eq!(ds.levels, Some(vec![500.0, 850.0]));
        let var = &ds.variables["hgt"];
        assert_eq!(
            var.dims,
            vec![Dim::Step, Dim::Level, Dim::Latitude, Dim::Longitude]
        );
        assert_eq!(var.values.shape(), &[1, 2, 2, 3]);
        assert_eq!(var.values[[0, 0, 0, 0]], 1.0);
        assert_eq!(var.values[[0, 1, 0, 0]], 2.0);
    }

    #[test]
    fn should_reject_ragged_coverage_in_strict_mode() {
        // two variables with different step sets make the cube ragged
        let fields = vec![
            field("cape", "surface", 0, 132, 1.0),
            field("cape", "surface", 0, 135, 2.0),
            field("cin", "surface", 0, 132, 3.0),
        ];

        assert!(assemble_strict(&fields).is_err());
    }

    #[test]
    fn should_combine_ragged_coverage_with_nan_holes() {
        let fields = vec![
            field("cape", "surface", 0, 132, 1.0),
            field("cape", "surface", 0, 135, 2.0),
            field("cin", "surface", 0, 132, 3.0),
        ];

        let ds = assemble_combined(&fields).unwrap();

        assert_eq!(ds.steps, vec![132, 135]);
        let cin = &ds.variables["cin"];
        assert_eq!(cin.values[[0, 0, 0]], 3.0);
        assert!(cin.values[[1, 0, 0]].is_nan());
    }

    #[test]
    fn should_record_redundant_scalar_coords() {
        let fields = vec![field("cape", "surface", 0, 132, 1.0)];
        let ds = assemble_strict(&fields).unwrap();

        assert_eq!(ds.extra_coords.get("surface"), Some(&0.0));
        let expected = Utc.with_ymd_and_hms(2016, 5, 23, 12, 0, 0).unwrap();
        assert_eq!(
            ds.extra_coords.get("valid_time"),
            Some(&(expected.timestamp() as f64))
        );
    }

    #[test]
    fn should_reject_mismatched_grids() {
        let mut other = field("cape", "surface", 0, 135, 2.0);
        other.latitudes = vec![10.0, 5.0];
        let fields = vec![field("cape", "surface", 0, 132, 1.0), other];

        assert!(assemble_strict(&fields).is_err());
        assert!(assemble_combined(&fields).is_err());
    }

    #[test]
    fn should_reject_empty_message_list() {
        assert!(assemble_strict(&[]).is_err());
        assert!(assemble_combined(&[]).is_err());
    }

    #[test]
    fn should_parse_init_time_from_grib_keys() {
        let parsed = parse_init_time(20160518, 0).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2016, 5, 18, 0, 0, 0).unwrap());

        assert!(parse_init_time(20161318, 0).is_err());
    }
}

//! NetCDF persistence for gridded datasets and the final merge step.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Result};
use chrono::{DateTime, Utc};
use ndarray::{arr0, Array1, ArrayD, Axis, IxDyn};

use super::{DataVar, Dim, GridDataset};

pub const TIME_UNITS: &str = "hours since 1970-01-01 00:00:00";

/// Writes a dataset to one NetCDF file, downcasting data variables to f32.
pub fn write_dataset(dataset: &GridDataset, path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = netcdf::create(path)?;

    file.add_dimension(Dim::Time.name(), dataset.times.len())?;
    file.add_dimension(Dim::Member.name(), dataset.members.len())?;
    if !dataset.steps.is_empty() {
        file.add_dimension(Dim::Step.name(), dataset.steps.len())?;
    }
    if let Some(levels) = &dataset.levels {
        file.add_dimension(Dim::Level.name(), levels.len())?;
    }
    file.add_dimension(Dim::Latitude.name(), dataset.latitudes.len())?;
    file.add_dimension(Dim::Longitude.name(), dataset.longitudes.len())?;

    {
        let mut var = file.add_variable::<f64>(Dim::Time.name(), &[Dim::Time.name()])?;
        var.put_attribute("units", TIME_UNITS)?;
        let hours: Vec<f64> = dataset
            .times
            .iter()
            .map(|t| t.timestamp() as f64 / 3600.0)
            .collect();
        var.put(Array1::from(hours).view(), ..)?;
    }
    {
        let mut var = file.add_variable::<i64>(Dim::Member.name(), &[Dim::Member.name()])?;
        var.put(Array1::from(dataset.members.clone()).view(), ..)?;
    }
    if !dataset.steps.is_empty() {
        let mut var = file.add_variable::<i64>(Dim::Step.name(), &[Dim::Step.name()])?;
        var.put_attribute("units", "hours")?;
        var.put(Array1::from(dataset.steps.clone()).view(), ..)?;
    }
    if let Some(levels) = &dataset.levels {
        let mut var = file.add_variable::<f64>(Dim::Level.name(), &[Dim::Level.name()])?;
        var.put_attribute("units", "hPa")?;
        var.put(Array1::from(levels.clone()).view(), ..)?;
    }
    {
        let mut var = file.add_variable::<f64>(Dim::Latitude.name(), &[Dim::Latitude.name()])?;
        var.put_attribute("units", "degrees_north")?;
        var.put(Array1::from(dataset.latitudes.clone()).view(), ..)?;
    }
    {
        let mut var =
            file.add_variable::<f64>(Dim::Longitude.name(), &[Dim::Longitude.name()])?;
        var.put_attribute("units", "degrees_east")?;
        var.put(Array1::from(dataset.longitudes.clone()).view(), ..)?;
    }

    for (name, value) in &dataset.extra_coords {
        let mut var = file.add_variable::<f64>(name, &[])?;
        var.put(arr0(*value).view(), &[] as &[usize])?;
    }

    for (name, data_var) in &dataset.variables {
        let dim_names: Vec<&str> = data_var.dims.iter().map(|d| d.name()).collect();
        let mut var = file.add_variable::<f32>(name, &dim_names)?;
        let values: ArrayD<f32> = data_var.values.mapv(|v| v as f32);
        var.put(values.view(), ..)?;
    }

    Ok(())
}

/// Reads a previously written output file back into memory.
pub fn read_dataset(path: &Path) -> Result<GridDataset> {
    ensure!(path.exists(), "no such file: {}", path.display());
    let file = netcdf::open(path)?;

    let times = read_required_f64(&file, Dim::Time.name())?
        .into_iter()
        .map(hours_to_datetime)
        .collect::<Result<Vec<_>>>()?;
    let members = file
        .variable(Dim::Member.name())
        .ok_or_else(|| anyhow!("missing coordinate '{}'", Dim::Member.name()))?
        .get_values::<i64, _>(..)?;
    let steps = match file.variable(Dim::Step.name()) {
        Some(var) => var.get_values::<i64, _>(..)?,
        None => Vec::new(),
    };
    let levels = match file.variable(Dim::Level.name()) {
        Some(var) => Some(var.get_values::<f64, _>(..)?),
        None => None,
    };
    let latitudes = read_required_f64(&file, Dim::Latitude.name())?;
    let longitudes = read_required_f64(&file, Dim::Longitude.name())?;

    let coord_names = [
        Dim::Time.name(),
        Dim::Member.name(),
        Dim::Step.name(),
        Dim::Level.name(),
        Dim::Latitude.name(),
        Dim::Longitude.name(),
    ];

    let mut extra_coords = BTreeMap::new();
    let mut variables = BTreeMap::new();

    for var in file.variables() {
        let name = var.name();
        if coord_names.contains(&name.as_str()) {
            continue;
        }

        if var.dimensions().is_empty() {
            let value = var.get_values::<f64, _>(..)?;
            extra_coords.insert(name, value[0]);
            continue;
        }

        let dims = var
            .dimensions()
            .iter()
            .map(|d| {
                Dim::from_name(&d.name())
                    .ok_or_else(|| anyhow!("unrecognised dimension '{}' in {}", d.name(), name))
            })
            .collect::<Result<Vec<_>>>()?;
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let data = var.get_values::<f64, _>(..)?;
        let values = ArrayD::from_shape_vec(IxDyn(&shape), data)?;

        variables.insert(name, DataVar { dims, values });
    }

    Ok(GridDataset {
        times,
        members,
        steps,
        levels,
        latitudes,
        longitudes,
        extra_coords,
        variables,
    })
}

/// Opens every per-object output in `save_dir` and writes their union to
/// `final_path`. The hard barrier of the pipeline: objects that failed simply
/// have no file here and are absent from the result.
pub fn merge_outputs(save_dir: &Path, final_path: &Path) -> Result<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(save_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "nc"))
        .collect();
    paths.sort();
    ensure!(
        !paths.is_empty(),
        "no processed files found in {}",
        save_dir.display()
    );

    let datasets = paths
        .iter()
        .map(|p| read_dataset(p))
        .collect::<Result<Vec<_>>>()?;
    let combined = combine_by_coords(&datasets)?;
    write_dataset(&combined, final_path)?;

    Ok(final_path.to_path_buf())
}

/// Unions datasets along time and member, aligned by coordinate values. All
/// inputs must share the latitude/longitude/level axes of one selection
/// window; gaps (a variable missing from some file) are NaN-filled.
pub fn combine_by_coords(datasets: &[GridDataset]) -> Result<GridDataset> {
    let first = datasets
        .first()
        .ok_or_else(|| anyhow!("no datasets to combine"))?;

    for dataset in &datasets[1..] {
        ensure!(
            dataset.latitudes == first.latitudes && dataset.longitudes == first.longitudes,
            "output files use different grids"
        );
        ensure!(
            dataset.levels == first.levels,
            "output files use different level axes"
        );
        ensure!(
            dataset.steps == first.steps,
            "output files use different step axes"
        );
    }

    let mut times: Vec<DateTime<Utc>> = datasets
        .iter()
        .flat_map(|d| d.times.iter().copied())
        .collect();
    times.sort();
    times.dedup();

    let mut members: Vec<i64> = datasets
        .iter()
        .flat_map(|d| d.members.iter().copied())
        .collect();
    members.sort();
    members.dedup();

    let var_names: BTreeSet<&str> = datasets
        .iter()
        .flat_map(|d| d.variables.keys().map(String::as_str))
        .collect();

    let mut variables = BTreeMap::new();
    for name in var_names {
        let template = datasets
            .iter()
            .find_map(|d| d.variables.get(name))
            .ok_or_else(|| anyhow!("variable {} vanished during merge", name))?;
        ensure!(
            template.dims.len() >= 2
                && template.dims[0] == Dim::Time
                && template.dims[1] == Dim::Member,
            "variable {} is not in the output layout",
            name
        );

        let mut shape = vec![times.len(), members.len()];
        shape.extend_from_slice(&template.values.shape()[2..]);
        let mut values = ArrayD::from_elem(IxDyn(&shape), f64::NAN);

        for dataset in datasets {
            let Some(var) = dataset.variables.get(name) else {
                continue;
            };
            ensure!(
                var.dims == template.dims,
                "variable {} has inconsistent dimensions across files",
                name
            );

            for (ti_local, time) in dataset.times.iter().enumerate() {
                let ti = times
                    .binary_search(time)
                    .map_err(|_| anyhow!("time axis lookup failed"))?;
                for (mi_local, member) in dataset.members.iter().enumerate() {
                    let mi = members
                        .binary_search(member)
                        .map_err(|_| anyhow!("member axis lookup failed"))?;

                    let src = var.values.index_axis(Axis(0), ti_local);
                    let src = src.index_axis_move(Axis(0), mi_local);
                    let dst = values.index_axis_mut(Axis(0), ti);
                    let mut dst = dst.index_axis_move(Axis(0), mi);
                    dst.assign(&src);
                }
            }
        }

        variables.insert(
            name.to_string(),
            DataVar {
                dims: template.dims.clone(),
                values,
            },
        );
    }

    Ok(GridDataset {
        times,
        members,
        steps: first.steps.clone(),
        levels: first.levels.clone(),
        latitudes: first.latitudes.clone(),
        longitudes: first.longitudes.clone(),
        extra_coords: BTreeMap::new(),
        variables,
    })
}

fn read_required_f64(file: &netcdf::File, name: &str) -> Result<Vec<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| anyhow!("missing coordinate '{}'", name))?;
    Ok(var.get_values::<f64, _>(..)?)
}

fn hours_to_datetime(hours: f64) -> Result<DateTime<Utc>> {
    let seconds = (hours * 3600.0).round() as i64;
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| anyhow!("time value {} is out of range", hours))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn dataset_for(time_hour: u32, member: i64, var_name: &str, fill: f64) -> GridDataset {
        let mut variables = BTreeMap::new();
        variables.insert(
            var_name.to_string(),
            DataVar {
                dims: vec![Dim::Time, Dim::Member, Dim::Latitude, Dim::Longitude],
                values: ArrayD::from_elem(IxDyn(&[1, 1, 2, 3]), fill),
            },
        );

        GridDataset {
            times: vec![Utc
                .with_ymd_and_hms(2016, 5, 24, time_hour, 0, 0)
                .unwrap()],
            members: vec![member],
            steps: Vec::new(),
            levels: None,
            latitudes: vec![55.0, 40.0],
            longitudes: vec![-130.0, -110.0, -70.0],
            extra_coords: BTreeMap::new(),
            variables,
        }
    }

    #[test]
    fn should_round_trip_a_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cape_2016051800_c00.nc");

        let dataset = dataset_for(12, 0, "cape", 3.5);
        write_dataset(&dataset, &path).unwrap();

        let read_back = read_dataset(&path).unwrap();
        assert_eq!(read_back.times, dataset.times);
        assert_eq!(read_back.members, vec![0]);
        assert_eq!(read_back.latitudes, vec![55.0, 40.0]);
        assert_eq!(read_back.longitudes, vec![-130.0, -110.0, -70.0]);

        let var = &read_back.variables["cape"];
        assert_eq!(
            var.dims,
            vec![Dim::Time, Dim::Member, Dim::Latitude, Dim::Longitude]
        );
        assert_eq!(var.values[[0, 0, 0, 0]], 3.5);
    }

    #[test]
    fn should_combine_datasets_along_time() {
        let a = dataset_for(12, 0, "cape", 1.0);
        let b = dataset_for(18, 0, "cape", 2.0);

        let combined = combine_by_coords(&[a, b]).unwrap();

        assert_eq!(combined.times.len(), 2);
        assert_eq!(combined.members, vec![0]);

        let var = &combined.variables["cape"];
        assert_eq!(var.values.shape(), &[2, 1, 2, 3]);
        assert_eq!(var.values[[0, 0, 0, 0]], 1.0);
        assert_eq!(var.values[[1, 0, 0, 0]], 2.0);
    }

    #[test]
    fn should_leave_nan_where_a_variable_is_missing() {
        let a = dataset_for(12, 0, "cape", 1.0);
        let b = dataset_for(18, 0, "cin", 2.0);

        let combined = combine_by_coords(&[a, b]).unwrap();

        let cape = &combined.variables["cape"];
        assert_eq!(cape.values[[0, 0, 0, 0]], 1.0);
        assert!(cape.values[[1, 0, 0, 0]].is_nan());
    }

    #[test]
    fn should_reject_mismatched_grids() {
        let a = dataset_for(12, 0, "cape", 1.0);
        let mut b = dataset_for(18, 0, "cape", 2.0);
        b.latitudes = vec![10.0, 5.0];

        assert!(combine_by_coords(&[a, b]).is_err());
    }

    #[test]
    fn should_merge_surviving_outputs_when_one_object_failed() {
        // three objects were enumerated but only two produced output files
        let dir = TempDir::new().unwrap();
        write_dataset(
            &dataset_for(12, 0, "cape", 1.0),
            &dir.path().join("cape_2016051800_c00.nc"),
        )
        .unwrap();
        write_dataset(
            &dataset_for(18, 0, "cape", 2.0),
            &dir.path().join("cape_2016051900_c00.nc"),
        )
        .unwrap();

        let final_path = dir.path().join("combined.nc");
        merge_outputs(dir.path(), &final_path).unwrap();

        let combined = read_dataset(&final_path).unwrap();
        assert_eq!(combined.times.len(), 2);
        assert_eq!(combined.variables["cape"].values.shape(), &[2, 1, 2, 3]);
    }

    #[test]
    fn should_fail_merge_when_no_outputs_exist() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("combined.nc");

        assert!(merge_outputs(dir.path(), &final_path).is_err());
    }
}

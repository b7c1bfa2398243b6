//! End-to-end reads from an on-disk `.npy` container.

use eoshdf::{Container, DataType, DecodeError, Error};
use ndarray::{ArrayD, array};
use ndarray_npy::write_npy;
use tempfile::TempDir;

fn granule() -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sd")).unwrap();
    std::fs::create_dir(dir.path().join("vs")).unwrap();
    write_npy(
        dir.path().join("sd/temperature.npy"),
        &array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]],
    )
    .unwrap();
    write_npy(dir.path().join("vs/lat.npy"), &array![[10i32], [20], [30], [40]]).unwrap();
    dir
}

#[test]
fn test_temperature_and_lat_scenario() {
    let dir = granule();
    let mut container = Container::open(dir.path());

    let temperature = container.read_data("temperature").unwrap();
    assert_eq!(
        temperature,
        array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn()
    );

    let lat = container.read_data("lat").unwrap();
    assert_eq!(lat, array![10.0, 20.0, 30.0, 40.0].into_dyn());

    match container.read_data("missing") {
        Err(Error::DatasetNotFound { name }) => assert_eq!(name, "missing"),
        other => panic!("expected DatasetNotFound, got {:?}", other),
    }

    assert_eq!(container.list_datasets().unwrap(), vec!["lat", "temperature"]);
    container.close().unwrap();
}

#[test]
fn test_catalogs() {
    let dir = granule();
    let mut container = Container::open(dir.path());

    let tabular = container.list_tabular_datasets().unwrap();
    assert_eq!(tabular.len(), 1);
    assert_eq!(tabular[0].0, "lat");
    assert_eq!(tabular[0].1.records, 4);
    assert_eq!(tabular[0].1.record_size, 4);

    let multidim = container.list_multidim_datasets().unwrap();
    let temperature = &multidim["temperature"];
    assert_eq!(temperature.shape, vec![2, 3]);
    assert_eq!(temperature.data_type, DataType::Float32);
    assert_eq!(temperature.dim_names.len(), 2);
}

#[test]
fn test_name_in_both_interfaces() {
    let dir = granule();
    write_npy(dir.path().join("vs/temperature.npy"), &array![99u8, 98]).unwrap();
    let mut container = Container::open(dir.path());

    let names = container.list_datasets().unwrap();
    assert_eq!(names, vec!["lat", "temperature", "temperature"]);

    let preferred = container.read_data("temperature").unwrap();
    assert_eq!(preferred.shape(), &[2, 3]);

    let tabular: ArrayD<u8> = container.read_tabular_data_as("temperature").unwrap();
    assert_eq!(tabular, array![99u8, 98].into_dyn());
}

#[test]
fn test_missing_container_is_decode_error() {
    let dir = granule();
    let mut container = Container::open(dir.path().join("not-there"));

    let err = container.read_data("temperature").unwrap_err();
    assert!(!err.is_not_found());
    assert!(!container.is_multidim_open());
    container.close().unwrap();
}

#[test]
fn test_listing_survives_undecodable_sibling() {
    let dir = granule();
    write_npy(dir.path().join("sd/flags.npy"), &array![1i64, 2, 3]).unwrap();
    let mut container = Container::open(dir.path());

    assert_eq!(container.list_datasets().unwrap(), vec!["lat", "temperature"]);
    assert_eq!(container.read_data("temperature").unwrap().shape(), &[2, 3]);
    assert!(matches!(
        container.read_data("flags"),
        Err(Error::Decode(DecodeError::UnsupportedType { .. }))
    ));
}

//! Live OSRM tests against a Dockerized `osrm-routed`.
//!
//! Needs Docker and a preprocessed (MLD) `new-york-latest.osrm` dataset in
//! `OSRM_DATA_DIR` (default `osrm-data`). Run with `cargo test -- --ignored`.

mod fixtures;

use std::env;
use std::path::Path;
use std::time::{Duration, Instant};

use testcontainers::core::{IntoContainerPort, Mount};
use testcontainers::ReuseDirective;
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt, TestcontainersError};

use pickup_planner::osrm::{OsrmClient, OsrmConfig};
use pickup_planner::sequencer::validate_permutation;
use pickup_planner::traits::{RouteOptimizer, TravelTimeMatrixProvider};
use pickup_planner::{Coordinates, TravelTimeMatrix};

use fixtures::{DEPOT, DONORS, FOOD_BANKS};

const DATASET: &str = "new-york-latest.osrm";

fn osrm_container() -> Result<(Container<GenericImage>, String), TestcontainersError> {
    let data_dir = env::var("OSRM_DATA_DIR").unwrap_or_else(|_| "osrm-data".to_string());
    let data_dir = Path::new(&data_dir)
        .canonicalize()
        .map_err(|err| TestcontainersError::other(format!("OSRM data dir: {err}")))?;

    let mtime = std::fs::metadata(data_dir.join(DATASET).with_extension("osrm.partition"))
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|time| time.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);
    let container_name = format!("osrm-new-york-mld-{mtime}");

    let image = GenericImage::new("osrm/osrm-backend", "latest")
        .with_exposed_port(5000.tcp())
        .with_mount(Mount::bind_mount(data_dir.to_string_lossy().to_string(), "/data"))
        .with_cmd(vec![
            "osrm-routed".to_string(),
            "--algorithm".to_string(),
            "mld".to_string(),
            format!("/data/{DATASET}"),
        ])
        .with_container_name(container_name)
        .with_startup_timeout(Duration::from_secs(30))
        .with_reuse(ReuseDirective::Always);

    let container = image.start()?;
    let port = container.get_host_port_ipv4(5000.tcp())?;
    Ok((container, format!("http://127.0.0.1:{port}")))
}

fn client(base_url: &str) -> OsrmClient {
    OsrmClient::new(OsrmConfig {
        base_url: base_url.to_string(),
        ..OsrmConfig::default()
    })
    .expect("build OSRM client")
}

fn locations() -> Vec<Coordinates> {
    let mut locations = vec![DEPOT.coords()];
    locations.extend(DONORS[..4].iter().map(|d| d.coords()));
    locations.push(FOOD_BANKS[0].coords());
    locations
}

/// The server answers before its dataset is loaded; poll until it routes.
fn wait_for_matrix(
    container: &Container<GenericImage>,
    client: &OsrmClient,
    locations: &[Coordinates],
) -> TravelTimeMatrix {
    let start = Instant::now();
    loop {
        match client.travel_time_matrix(locations) {
            Ok(matrix) => return matrix,
            Err(err) if start.elapsed() < Duration::from_secs(15) => {
                eprintln!("OSRM not ready: {err}");
                std::thread::sleep(Duration::from_millis(500));
            }
            Err(err) => {
                if let Ok(stderr) = container.stderr_to_vec() {
                    if !stderr.is_empty() {
                        eprintln!("OSRM stderr:\n{}", String::from_utf8_lossy(&stderr));
                    }
                }
                panic!("OSRM table request failed: {err}");
            }
        }
    }
}

// ============================================================================
// Table service
// ============================================================================

#[test]
#[ignore = "needs Docker and a preprocessed New York OSRM dataset"]
fn osrm_table_returns_full_matrix() {
    let (container, base_url) = osrm_container().expect("start OSRM container");
    let client = client(&base_url);
    let locations = locations();

    let matrix = wait_for_matrix(&container, &client, &locations);
    assert_eq!(matrix.size(), locations.len());
    for i in 0..matrix.size() {
        assert_eq!(matrix.get(i, i), 0.0);
        for j in 0..matrix.size() {
            if i != j {
                assert!(matrix.get(i, j) > 0.0, "{i}->{j} should take time");
            }
        }
    }

    drop(container);
}

// ============================================================================
// Trip service
// ============================================================================

#[test]
#[ignore = "needs Docker and a preprocessed New York OSRM dataset"]
fn osrm_trip_keeps_endpoints_fixed() {
    let (container, base_url) = osrm_container().expect("start OSRM container");
    let client = client(&base_url);
    let locations = locations();
    let matrix = wait_for_matrix(&container, &client, &locations);

    let order = client.optimal_order(&locations, false).expect("trip request");
    validate_permutation(&order, locations.len()).expect("trip order is a valid permutation");

    let input_order = (0..locations.len()).collect::<Vec<_>>();
    assert!(
        matrix.path_duration(&order) <= matrix.path_duration(&input_order) * 1.10,
        "trip order should not be much worse than the input order"
    );

    drop(container);
}

//! CSV-backed store tests
//!
//! Persistence across reopen, removal rewrites, claims, and tolerance of
//! hand-edited files.

mod fixtures;

use std::fs;

use tempfile::TempDir;

use pickup_planner::error::{StoreError, ValidationError};
use pickup_planner::store::Store;
use pickup_planner::traits::StopRepository;

use fixtures::{DONORS, FOOD_BANKS};

fn paths(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    (dir.path().join("food_banks.csv"), dir.path().join("pickups.csv"))
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_open_creates_files_with_headers() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);

    let store = Store::open(&food_banks, &pickups).unwrap();
    assert!(store.food_bank_names().is_empty());

    assert_eq!(
        fs::read_to_string(&food_banks).unwrap().trim_end(),
        "name,street1,street2,city,state,zip,latitude,longitude"
    );
    assert_eq!(
        fs::read_to_string(&pickups).unwrap().trim_end(),
        "name,street1,street2,city,state,zip,latitude,longitude,weight"
    );
}

#[test]
fn test_adds_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);

    {
        let store = Store::open(&food_banks, &pickups).unwrap();
        for bank in FOOD_BANKS {
            store.add_food_bank(bank.name, bank.address()).unwrap();
        }
        for (i, donor) in DONORS.iter().enumerate() {
            store
                .add_pickup_location(donor.name, donor.address(), (i + 1) as f64 * 10.0)
                .unwrap();
        }
    }

    let store = Store::open(&food_banks, &pickups).unwrap();
    assert_eq!(store.food_bank_names().len(), FOOD_BANKS.len());
    assert_eq!(store.food_bank(FOOD_BANKS[3].name), Some(FOOD_BANKS[3].address()));
    let listed = store.food_banks();
    assert_eq!(listed[0].0, "City Harvest");
    assert_eq!(listed[0].1, FOOD_BANKS[0].address());

    let snapshot = store.snapshot();
    assert_eq!(snapshot.pickup_count(), DONORS.len());
    let zabars = snapshot.pickup("Zabar's").unwrap();
    assert_eq!(zabars.weight, 60.0);
    assert_eq!(zabars.address, DONORS[5].address());
}

#[test]
fn test_street2_round_trips() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    let address = pickup_planner::Address::new("1 Main St", Some("Suite 4"), "Hoboken", "NJ", "07030")
        .unwrap()
        .with_coordinates(DONORS[0].coords());

    Store::open(&food_banks, &pickups)
        .unwrap()
        .add_pickup_location("Corner Deli", address.clone(), 3.5)
        .unwrap();

    let reopened = Store::open(&food_banks, &pickups).unwrap();
    let pickup = reopened.pickup_location("Corner Deli").unwrap();
    assert_eq!(pickup.address, address);
    assert_eq!(pickup.address.street2(), Some("Suite 4"));
    assert_eq!(pickup.weight, 3.5);
}

#[test]
fn test_later_add_overwrites_on_reopen() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    {
        let store = Store::open(&food_banks, &pickups).unwrap();
        store.add_pickup_location("Bakery", DONORS[0].address(), 5.0).unwrap();
        store.add_pickup_location("Bakery", DONORS[1].address(), 9.0).unwrap();
        assert_eq!(store.pickup_location("Bakery").unwrap().weight, 9.0);
    }
    let store = Store::open(&food_banks, &pickups).unwrap();
    let pickup = store.pickup_location("Bakery").unwrap();
    assert_eq!(pickup.weight, 9.0);
    assert_eq!(pickup.address, DONORS[1].address());
}

// ============================================================================
// Removal and claims
// ============================================================================

#[test]
fn test_remove_rewrites_file() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    let store = Store::open(&food_banks, &pickups).unwrap();
    store.add_food_bank("Pantry", FOOD_BANKS[0].address()).unwrap();
    store.add_food_bank("Pantry Annex", FOOD_BANKS[1].address()).unwrap();

    let removed = store.remove_food_bank("Pantry").unwrap();
    assert_eq!(removed, Some(FOOD_BANKS[0].address()));

    // Exact match only: the similarly named bank stays.
    let reopened = Store::open(&food_banks, &pickups).unwrap();
    assert_eq!(reopened.food_bank_names(), vec!["Pantry Annex".to_string()]);
    assert!(!dir.path().join("food_banks.csv.tmp").exists());
}

#[test]
fn test_remove_unknown_is_noop() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    let store = Store::open(&food_banks, &pickups).unwrap();
    store.add_pickup_location("Bakery", DONORS[0].address(), 1.0).unwrap();

    assert!(store.remove_pickup_location("Nobody").unwrap().is_none());
    assert!(Store::open(&food_banks, &pickups).unwrap().pickup_location("Bakery").is_some());
}

#[test]
fn test_claim_removes_only_present_pickups() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    let store = Store::open(&food_banks, &pickups).unwrap();
    for donor in &DONORS[..4] {
        store.add_pickup_location(donor.name, donor.address(), 2.0).unwrap();
    }

    let claimed = store
        .claim(&[DONORS[2].name, DONORS[0].name, "Already Gone"])
        .unwrap();
    let claimed_names = claimed.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
    assert_eq!(claimed_names, vec![DONORS[0].name, DONORS[2].name]);

    let reopened = Store::open(&food_banks, &pickups).unwrap().snapshot();
    let remaining = reopened.pickups().map(|(name, _)| name).collect::<Vec<_>>();
    assert_eq!(remaining, vec![DONORS[3].name, DONORS[1].name]);
}

// ============================================================================
// Hand-edited files
// ============================================================================

#[test]
fn test_missing_weight_defaults_to_zero() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    fs::write(
        &pickups,
        "name,street1,street2,city,state,zip,latitude,longitude\n\
         Bakery, 1 Main St ,,New York,ny,10001,40.75,-73.99\n",
    )
    .unwrap();

    let store = Store::open(&food_banks, &pickups).unwrap();
    let pickup = store.pickup_location("Bakery").unwrap();
    assert_eq!(pickup.weight, 0.0);
    assert_eq!(pickup.address.street1(), "1 Main St");
    assert_eq!(pickup.address.street2(), None);
    assert!(pickup.address.coordinates().is_some());
}

#[test]
fn test_literal_none_street2_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    fs::write(
        &food_banks,
        "name,street1,street2,city,state,zip,latitude,longitude\n\
         Pantry,1 Main St,None,New York,NY,10001,40.75,-73.99\n",
    )
    .unwrap();
    fs::write(
        &pickups,
        "name,street1,street2,city,state,zip,latitude,longitude,weight\n\
         Bakery,2 Main St,None,New York,NY,10001,40.76,-73.98,6\n",
    )
    .unwrap();

    let store = Store::open(&food_banks, &pickups).unwrap();
    assert_eq!(store.food_bank("Pantry").unwrap().street2(), None);
    let pickup = store.pickup_location("Bakery").unwrap();
    assert_eq!(pickup.address.street2(), None);
    assert_eq!(pickup.address.to_string(), "2 Main St, New York, NY 10001");
}

#[test]
fn test_rejects_unknown_state() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    fs::write(
        &food_banks,
        "name,street1,street2,city,state,zip,latitude,longitude\n\
         Pantry,1 Main St,,Boston,MA,02108,42.36,-71.06\n",
    )
    .unwrap();

    let err = Store::open(&food_banks, &pickups).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::UnknownState(_))
    ));
}

#[test]
fn test_ungeocoded_rows_load_but_cannot_be_added() {
    let dir = TempDir::new().unwrap();
    let (food_banks, pickups) = paths(&dir);
    fs::write(
        &pickups,
        "name,street1,street2,city,state,zip,latitude,longitude,weight\n\
         Bakery,1 Main St,,New York,NY,10001,,,4\n",
    )
    .unwrap();

    let store = Store::open(&food_banks, &pickups).unwrap();
    let pickup = store.pickup_location("Bakery").unwrap();
    assert!(pickup.address.coordinates().is_none());
    assert_eq!(pickup.weight, 4.0);

    let err = store
        .add_pickup_location("Deli", pickup.address.clone(), 1.0)
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::MissingCoordinates)
    ));
}

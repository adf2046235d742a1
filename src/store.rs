//! Food banks and pickup locations, persisted as CSV.
//!
//! Each kind lives in its own file with a header row:
//!
//! ```text
//! name,street1,street2,city,state,zip,latitude,longitude        (food banks)
//! name,street1,street2,city,state,zip,latitude,longitude,weight (pickups)
//! ```
//!
//! Adds append one record. Removals rewrite the file without the removed
//! names. The in-memory maps sit behind a lock and routing works on cloned
//! [`StoreSnapshot`]s, so a computation never sees a concurrent add/remove.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::{Address, Coordinates};
use crate::error::{StoreError, ValidationError};
use crate::traits::StopRepository;

const FOOD_BANK_HEADER: &[&str] = &[
    "name", "street1", "street2", "city", "state", "zip", "latitude", "longitude",
];
const PICKUP_HEADER: &[&str] = &[
    "name", "street1", "street2", "city", "state", "zip", "latitude", "longitude", "weight",
];

/// A registered donation waiting for collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupLocation {
    pub address: Address,
    /// Donation quantity, e.g. pounds of food.
    pub weight: f64,
}

/// Point-in-time copy of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    food_banks: BTreeMap<String, Address>,
    pickups: BTreeMap<String, PickupLocation>,
}

impl StoreSnapshot {
    pub fn food_bank(&self, name: &str) -> Option<&Address> {
        self.food_banks.get(name)
    }

    pub fn pickup(&self, name: &str) -> Option<&PickupLocation> {
        self.pickups.get(name)
    }

    /// Food banks ordered by name.
    pub fn food_banks(&self) -> impl Iterator<Item = (&str, &Address)> {
        self.food_banks.iter().map(|(name, address)| (name.as_str(), address))
    }

    /// Pickup locations ordered by name.
    pub fn pickups(&self) -> impl Iterator<Item = (&str, &PickupLocation)> {
        self.pickups.iter().map(|(name, pickup)| (name.as_str(), pickup))
    }

    pub fn pickup_count(&self) -> usize {
        self.pickups.len()
    }

    pub fn insert_food_bank(&mut self, name: impl Into<String>, address: Address) {
        self.food_banks.insert(name.into(), address);
    }

    pub fn insert_pickup(&mut self, name: impl Into<String>, address: Address, weight: f64) {
        self.pickups.insert(name.into(), PickupLocation { address, weight });
    }
}

impl StopRepository for StoreSnapshot {
    fn snapshot(&self) -> StoreSnapshot {
        self.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FoodBankRecord {
    name: String,
    street1: String,
    street2: Option<String>,
    city: String,
    state: String,
    zip: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PickupRecord {
    name: String,
    street1: String,
    street2: Option<String>,
    city: String,
    state: String,
    zip: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    weight: Option<f64>,
}

trait Record: Serialize + for<'de> Deserialize<'de> {
    fn name(&self) -> &str;
}

impl Record for FoodBankRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Record for PickupRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

impl FoodBankRecord {
    fn new(name: &str, address: &Address) -> Self {
        let coordinates = address.coordinates();
        Self {
            name: name.to_string(),
            street1: address.street1().to_string(),
            street2: address.street2().map(str::to_string),
            city: address.city().to_string(),
            state: address.state().code().to_string(),
            zip: address.zip().to_string(),
            latitude: coordinates.map(|c| c.lat),
            longitude: coordinates.map(|c| c.lon),
        }
    }

    fn address(&self) -> Result<Address, ValidationError> {
        record_address(
            &self.street1,
            self.street2.as_deref(),
            &self.city,
            &self.state,
            &self.zip,
            self.latitude.zip(self.longitude),
        )
    }
}

impl PickupRecord {
    fn new(name: &str, pickup: &PickupLocation) -> Self {
        let base = FoodBankRecord::new(name, &pickup.address);
        Self {
            name: base.name,
            street1: base.street1,
            street2: base.street2,
            city: base.city,
            state: base.state,
            zip: base.zip,
            latitude: base.latitude,
            longitude: base.longitude,
            weight: Some(pickup.weight),
        }
    }

    fn pickup(&self) -> Result<PickupLocation, ValidationError> {
        let address = record_address(
            &self.street1,
            self.street2.as_deref(),
            &self.city,
            &self.state,
            &self.zip,
            self.latitude.zip(self.longitude),
        )?;
        let weight = self.weight.unwrap_or(0.0);
        check_weight(weight)?;
        Ok(PickupLocation { address, weight })
    }
}

fn record_address(
    street1: &str,
    street2: Option<&str>,
    city: &str,
    state: &str,
    zip: &str,
    coordinates: Option<(f64, f64)>,
) -> Result<Address, ValidationError> {
    // Older files spell a missing second line as the literal `None`.
    let street2 = street2.filter(|line| line.trim() != "None");
    let address = Address::new(street1, street2, city, state, zip)?;
    match coordinates {
        Some((lat, lon)) => Ok(address.with_coordinates(Coordinates::new(lat, lon)?)),
        None => Ok(address),
    }
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        Err(ValidationError::EmptyField("name"))
    } else {
        Ok(())
    }
}

fn check_weight(weight: f64) -> Result<(), ValidationError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidWeight { index: 0, value: weight })
    }
}

/// Owned store of food banks and pickup locations.
#[derive(Debug, Default)]
pub struct Store {
    food_banks_csv: Option<PathBuf>,
    pickups_csv: Option<PathBuf>,
    inner: RwLock<StoreSnapshot>,
}

impl Store {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads both files, creating them with a header row when missing.
    pub fn open(
        food_banks_csv: impl Into<PathBuf>,
        pickups_csv: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let food_banks_csv = food_banks_csv.into();
        let pickups_csv = pickups_csv.into();

        let mut snapshot = StoreSnapshot::default();
        for record in read_records::<FoodBankRecord>(&food_banks_csv, FOOD_BANK_HEADER)? {
            let address = record.address()?;
            snapshot.food_banks.insert(record.name, address);
        }
        for record in read_records::<PickupRecord>(&pickups_csv, PICKUP_HEADER)? {
            let pickup = record.pickup()?;
            snapshot.pickups.insert(record.name, pickup);
        }

        debug!(
            food_banks = snapshot.food_banks.len(),
            pickups = snapshot.pickups.len(),
            "store loaded"
        );

        Ok(Self {
            food_banks_csv: Some(food_banks_csv),
            pickups_csv: Some(pickups_csv),
            inner: RwLock::new(snapshot),
        })
    }

    pub fn food_bank(&self, name: &str) -> Option<Address> {
        self.inner.read().food_bank(name).cloned()
    }

    pub fn pickup_location(&self, name: &str) -> Option<PickupLocation> {
        self.inner.read().pickup(name).cloned()
    }

    /// Food bank names ordered by name.
    pub fn food_bank_names(&self) -> Vec<String> {
        self.inner.read().food_banks.keys().cloned().collect()
    }

    /// Food banks with their addresses, ordered by name.
    pub fn food_banks(&self) -> Vec<(String, Address)> {
        self.inner
            .read()
            .food_banks()
            .map(|(name, address)| (name.to_string(), address.clone()))
            .collect()
    }

    /// Adds or overwrites a food bank. The address must be geocoded.
    pub fn add_food_bank(&self, name: &str, address: Address) -> Result<(), StoreError> {
        check_name(name)?;
        address.routable()?;

        let mut inner = self.inner.write();
        if let Some(path) = &self.food_banks_csv {
            append_record(path, FOOD_BANK_HEADER, &FoodBankRecord::new(name, &address))?;
        }
        inner.food_banks.insert(name.to_string(), address);
        info!(name, "food bank added");
        Ok(())
    }

    /// Adds or overwrites a pickup location. The address must be geocoded.
    pub fn add_pickup_location(&self, name: &str, address: Address, weight: f64) -> Result<(), StoreError> {
        check_name(name)?;
        address.routable()?;
        check_weight(weight)?;

        let pickup = PickupLocation { address, weight };
        let mut inner = self.inner.write();
        if let Some(path) = &self.pickups_csv {
            append_record(path, PICKUP_HEADER, &PickupRecord::new(name, &pickup))?;
        }
        inner.pickups.insert(name.to_string(), pickup);
        info!(name, weight, "pickup location added");
        Ok(())
    }

    /// Removes a food bank. Unknown names are a no-op.
    pub fn remove_food_bank(&self, name: &str) -> Result<Option<Address>, StoreError> {
        let mut inner = self.inner.write();
        if let Some(path) = &self.food_banks_csv {
            rewrite_without::<FoodBankRecord>(path, FOOD_BANK_HEADER, &HashSet::from([name]))?;
        }
        let removed = inner.food_banks.remove(name);
        info!(name, removed = removed.is_some(), "food bank removed");
        Ok(removed)
    }

    /// Removes a pickup location. Unknown names are a no-op.
    pub fn remove_pickup_location(&self, name: &str) -> Result<Option<PickupLocation>, StoreError> {
        Ok(self.claim(&[name])?.into_iter().next().map(|(_, pickup)| pickup))
    }

    /// Removes pickups a driver has been dispatched to, in one file rewrite.
    ///
    /// Returns the pickups that were present.
    pub fn claim<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<(String, PickupLocation)>, StoreError> {
        let names: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let mut inner = self.inner.write();
        if let Some(path) = &self.pickups_csv {
            rewrite_without::<PickupRecord>(path, PICKUP_HEADER, &names)?;
        }

        let mut claimed = Vec::new();
        for name in names {
            if let Some(pickup) = inner.pickups.remove(name) {
                claimed.push((name.to_string(), pickup));
            }
        }
        claimed.sort_by(|a, b| a.0.cmp(&b.0));
        info!(claimed = claimed.len(), "pickup locations claimed");
        Ok(claimed)
    }
}

impl StopRepository for Store {
    fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().clone()
    }
}

fn read_records<R: Record>(path: &Path, header: &[&str]) -> Result<Vec<R>, StoreError> {
    if !path.exists() {
        write_header(path, header)?;
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize::<R>() {
        records.push(record?);
    }
    Ok(records)
}

fn write_header(path: &Path, header: &[&str]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    writer.flush()?;
    Ok(())
}

fn append_record<R: Record>(path: &Path, header: &[&str], record: &R) -> Result<(), StoreError> {
    let empty = fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(true);
    if empty {
        write_header(path, header)?;
    }

    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

/// Rewrites `path` without the records named in `names`, via a temporary
/// file renamed into place.
fn rewrite_without<R: Record>(path: &Path, header: &[&str], names: &HashSet<&str>) -> Result<(), StoreError> {
    let kept = read_records::<R>(path, header)?
        .into_iter()
        .filter(|record| !names.contains(record.name()))
        .collect::<Vec<_>>();

    let tmp_path = path.with_extension("csv.tmp");
    {
        let file = BufWriter::new(File::create(&tmp_path)?);
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(header)?;
        for record in &kept {
            writer.serialize(record)?;
        }
        writer.flush()?;
        let mut file = writer
            .into_inner()
            .map_err(|err| StoreError::Io(err.into_error()))?;
        file.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

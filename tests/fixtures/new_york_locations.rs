//! Real New York City and Jersey City locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. They are routable with the
//! Geofabrik `new-york` extract.

#![allow(dead_code)]

use pickup_planner::{Address, Coordinates, TravelTimeMatrix};

/// A named location with an address and coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub street1: &'static str,
    pub city: &'static str,
    pub state: &'static str,
    pub zip: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const fn new(
        name: &'static str,
        street1: &'static str,
        city: &'static str,
        state: &'static str,
        zip: &'static str,
        lat: f64,
        lon: f64,
    ) -> Self {
        Self { name, street1, city, state, zip, lat, lon }
    }

    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon).expect("fixture coordinates are valid")
    }

    pub fn address(&self) -> Address {
        Address::new(self.street1, None, self.city, self.state, self.zip)
            .expect("fixture address is valid")
            .with_coordinates(self.coords())
    }
}

// ============================================================================
// Driver start (depot)
// ============================================================================

pub const DEPOT: Location = Location::new(
    "Empire State Building", "350 5th Ave", "New York", "NY", "10118", 40.7484, -73.9857,
);

// ============================================================================
// Food banks (destinations)
// ============================================================================

pub const FOOD_BANKS: &[Location] = &[
    Location::new("City Harvest", "6 E 32nd St", "New York", "NY", "10016", 40.7466, -73.9843),
    Location::new("Holy Apostles Soup Kitchen", "296 9th Ave", "New York", "NY", "10001", 40.7495, -73.9985),
    Location::new("Food Bank For NYC", "39 Broadway", "New York", "NY", "10006", 40.7063, -74.0132),
    Location::new("Hudson County Pantry", "1 Journal Sq", "Jersey City", "NJ", "07306", 40.7330, -74.0631),
];

// ============================================================================
// Donor pickup locations
// ============================================================================

pub const DONORS: &[Location] = &[
    Location::new("Chelsea Market", "75 9th Ave", "New York", "NY", "10011", 40.7424, -74.0061),
    Location::new("Union Square Greenmarket", "1 Union Sq W", "New York", "NY", "10003", 40.7359, -73.9911),
    Location::new("Grand Central Market", "89 E 42nd St", "New York", "NY", "10017", 40.7527, -73.9772),
    Location::new("Essex Market", "88 Essex St", "New York", "NY", "10002", 40.7190, -73.9878),
    Location::new("Eataly Flatiron", "200 5th Ave", "New York", "NY", "10010", 40.7420, -73.9897),
    Location::new("Zabar's", "2245 Broadway", "New York", "NY", "10024", 40.7849, -73.9797),
    Location::new("Katz's Delicatessen", "205 E Houston St", "New York", "NY", "10002", 40.7222, -73.9874),
    Location::new("Newport Centre", "30 Mall Dr W", "Jersey City", "NJ", "07310", 40.7272, -74.0376),
];

/// Square matrix from a dense row list, for hand-written fixtures.
pub fn matrix(rows: &[&[f64]]) -> TravelTimeMatrix {
    TravelTimeMatrix::from_rows(rows.iter().map(|row| row.to_vec()).collect())
        .expect("fixture matrix is valid")
}

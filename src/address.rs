//! Postal addresses and the coordinates attached to them after geocoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// States the service operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    NY,
    NJ,
}

impl State {
    pub const ALL: [State; 2] = [State::NY, State::NJ];

    pub fn code(self) -> &'static str {
        match self {
            State::NY => "NY",
            State::NJ => "NJ",
        }
    }

    pub fn full_name(self) -> &'static str {
        match self {
            State::NY => "New York",
            State::NJ => "New Jersey",
        }
    }
}

impl FromStr for State {
    type Err = ValidationError;

    /// Accepts the short code or the full name, ignoring case and
    /// surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        State::ALL
            .into_iter()
            .find(|state| {
                needle.eq_ignore_ascii_case(state.code())
                    || needle.eq_ignore_ascii_case(state.full_name())
            })
            .ok_or_else(|| ValidationError::UnknownState(s.to_string()))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        if valid {
            Ok(Self { lat, lon })
        } else {
            Err(ValidationError::InvalidCoordinates { lat, lon })
        }
    }

    /// `lon,lat` with six decimals, the order routing services expect.
    pub fn lon_lat(&self) -> String {
        format!("{:.6},{:.6}", self.lon, self.lat)
    }
}

/// A validated postal address.
///
/// Construction fails if a required field is blank or the state is not
/// served. Coordinates are attached after geocoding; routing refuses
/// addresses without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAddress", into = "RawAddress")]
pub struct Address {
    street1: String,
    street2: Option<String>,
    city: String,
    state: State,
    zip: String,
    coordinates: Option<Coordinates>,
}

impl Address {
    pub fn new(
        street1: &str,
        street2: Option<&str>,
        city: &str,
        state: &str,
        zip: &str,
    ) -> Result<Self, ValidationError> {
        let street1 = required("street1", street1)?;
        let city = required("city", city)?;
        if state.trim().is_empty() {
            return Err(ValidationError::EmptyField("state"));
        }
        let state = state.parse::<State>()?;
        let zip = required("zip", zip)?;
        let street2 = street2
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            street1,
            street2,
            city,
            state,
            zip,
            coordinates: None,
        })
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn set_coordinates(&mut self, coordinates: Coordinates) {
        self.coordinates = Some(coordinates);
    }

    pub fn street1(&self) -> &str {
        &self.street1
    }

    pub fn street2(&self) -> Option<&str> {
        self.street2.as_deref()
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn zip(&self) -> &str {
        &self.zip
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    /// Coordinates, or an error if the address was never geocoded.
    pub fn routable(&self) -> Result<Coordinates, ValidationError> {
        self.coordinates.ok_or(ValidationError::MissingCoordinates)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.street1)?;
        if let Some(street2) = &self.street2 {
            write!(f, ", {street2}")?;
        }
        write!(f, ", {}, {} {}", self.city, self.state, self.zip)
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(value.to_string())
    }
}

/// Wire form of [`Address`]; validated on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAddress {
    street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    street2: Option<String>,
    city: String,
    state: String,
    zip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coordinates: Option<Coordinates>,
}

impl TryFrom<RawAddress> for Address {
    type Error = ValidationError;

    fn try_from(raw: RawAddress) -> Result<Self, Self::Error> {
        let address = Address::new(
            &raw.street1,
            raw.street2.as_deref(),
            &raw.city,
            &raw.state,
            &raw.zip,
        )?;
        match raw.coordinates {
            Some(c) => Ok(address.with_coordinates(Coordinates::new(c.lat, c.lon)?)),
            None => Ok(address),
        }
    }
}

impl From<Address> for RawAddress {
    fn from(address: Address) -> Self {
        Self {
            street1: address.street1,
            street2: address.street2,
            city: address.city,
            state: address.state.code().to_string(),
            zip: address.zip,
            coordinates: address.coordinates,
        }
    }
}

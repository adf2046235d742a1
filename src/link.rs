//! Shareable navigation links.

use url::form_urlencoded::byte_serialize;

use crate::address::Address;

pub const GOOGLE_MAPS_DIR_URL: &str = "https://www.google.com/maps/dir/";

/// Google Maps directions link through every stop in order.
///
/// Each address becomes one path segment, `street1,+street2,+city,+ST+zip`,
/// with spaces written as `+`.
pub fn google_maps_link(start: &Address, stops: &[(String, Address)], destination: &Address) -> String {
    let mut url = String::from(GOOGLE_MAPS_DIR_URL);
    let route = std::iter::once(start)
        .chain(stops.iter().map(|(_, address)| address))
        .chain(std::iter::once(destination));

    for address in route {
        url.push_str(&encode(address.street1()));
        url.push(',');
        if let Some(street2) = address.street2() {
            url.push('+');
            url.push_str(&encode(street2));
            url.push(',');
        }
        url.push('+');
        url.push_str(&encode(address.city()));
        url.push_str(",+");
        url.push_str(address.state().code());
        url.push('+');
        url.push_str(&encode(address.zip()));
        url.push('/');
    }
    url
}

fn encode(part: &str) -> String {
    byte_serialize(part.as_bytes()).collect()
}

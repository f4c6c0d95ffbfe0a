//! Geo-location records
//!
//! Typed view of the records stored in city and country databases. Every
//! type is declared through [`Schema`], so unknown keys in the data are
//! ignored and absent ones fall back to empty values.
//!
//! Localized names are kept as the full `locale -> name` map. When the
//! caller injects a `"locales"` value (`Vec<String>`, most preferred first)
//! the `localized_name` helpers pick the first locale present.

use crate::activator::{Record, Schema};
use crate::network::Network;
use serde::Serialize;
use std::collections::BTreeMap;

/// Injectable key holding the caller's preferred locales
pub const LOCALES: &str = "locales";

fn pick_name<'a>(names: &'a BTreeMap<String, String>, locales: &[String]) -> Option<&'a str> {
    locales
        .iter()
        .find_map(|locale| names.get(locale))
        .or_else(|| names.get("en"))
        .map(String::as_str)
}

/// Complete result of a city or country lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Location {
    /// City of the address
    pub city: City,
    /// Continent of the address
    pub continent: Continent,
    /// Country the address is located in
    pub country: Country,
    /// Coordinates and time zone
    pub location: Coordinates,
    /// Postal code
    pub postal: Postal,
    /// Country the ISP registered the network in
    pub registered_country: Country,
    /// Country represented by users of the address, if different
    #[serde(skip_serializing_if = "Option::is_none")]
    pub represented_country: Option<RepresentedCountry>,
    /// Subdivisions from largest to smallest
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subdivisions: Vec<Subdivision>,
    /// Properties of the address itself
    pub traits: Traits,
}

impl Record for Location {
    fn schema(schema: &mut Schema<Self>) {
        let city = schema.always_create("city");
        let continent = schema.always_create("continent");
        let country = schema.always_create("country");
        let location = schema.always_create("location");
        let postal = schema.always_create("postal");
        let registered_country = schema.always_create("registered_country");
        let represented_country = schema.field("represented_country");
        let subdivisions = schema.field("subdivisions");
        let traits = schema.always_create("traits");

        schema.constructor(move |args| {
            Ok(Location {
                city: args.take(city)?,
                continent: args.take(continent)?,
                country: args.take(country)?,
                location: args.take(location)?,
                postal: args.take(postal)?,
                registered_country: args.take(registered_country)?,
                represented_country: args.take(represented_country)?,
                subdivisions: args.take(subdivisions)?,
                traits: args.take(traits)?,
            })
        });
    }
}

impl Location {
    /// The smallest subdivision (the last one listed), if any
    pub fn most_specific_subdivision(&self) -> Option<&Subdivision> {
        self.subdivisions.last()
    }
}

/// City-level data
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct City {
    /// Confidence (0-100) that the city is correct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u16>,
    /// GeoNames identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    /// Names keyed by locale code
    pub names: BTreeMap<String, String>,
    #[serde(skip)]
    locales: Vec<String>,
}

impl Record for City {
    fn schema(schema: &mut Schema<Self>) {
        let confidence = schema.field("confidence");
        let geoname_id = schema.field("geoname_id");
        let names = schema.field("names");
        let locales = schema.inject(LOCALES);

        schema.constructor(move |args| {
            Ok(City {
                confidence: args.take(confidence)?,
                geoname_id: args.take(geoname_id)?,
                names: args.take(names)?,
                locales: args.take(locales)?,
            })
        });
    }
}

impl City {
    /// Name in `locale`
    pub fn name(&self, locale: &str) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }

    /// Name in the first injected locale present, else English
    pub fn localized_name(&self) -> Option<&str> {
        pick_name(&self.names, &self.locales)
    }
}

/// Continent data
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Continent {
    /// Two-letter continent code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// GeoNames identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    /// Names keyed by locale code
    pub names: BTreeMap<String, String>,
    #[serde(skip)]
    locales: Vec<String>,
}

impl Record for Continent {
    fn schema(schema: &mut Schema<Self>) {
        let code = schema.field("code");
        let geoname_id = schema.field("geoname_id");
        let names = schema.field("names");
        let locales = schema.inject(LOCALES);

        schema.constructor(move |args| {
            Ok(Continent {
                code: args.take(code)?,
                geoname_id: args.take(geoname_id)?,
                names: args.take(names)?,
                locales: args.take(locales)?,
            })
        });
    }
}

impl Continent {
    /// Name in `locale`
    pub fn name(&self, locale: &str) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }

    /// Name in the first injected locale present, else English
    pub fn localized_name(&self) -> Option<&str> {
        pick_name(&self.names, &self.locales)
    }
}

/// Country data, used for both the located and the registered country
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Country {
    /// Confidence (0-100) that the country is correct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u16>,
    /// GeoNames identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    /// Whether the country is an EU member state
    pub is_in_european_union: bool,
    /// ISO 3166-1 alpha-2 code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    /// Names keyed by locale code
    pub names: BTreeMap<String, String>,
    #[serde(skip)]
    locales: Vec<String>,
}

impl Record for Country {
    fn schema(schema: &mut Schema<Self>) {
        let confidence = schema.field("confidence");
        let geoname_id = schema.field("geoname_id");
        let is_in_european_union = schema.field("is_in_european_union");
        let iso_code = schema.field("iso_code");
        let names = schema.field("names");
        let locales = schema.inject(LOCALES);

        schema.constructor(move |args| {
            Ok(Country {
                confidence: args.take(confidence)?,
                geoname_id: args.take(geoname_id)?,
                is_in_european_union: args.take(is_in_european_union)?,
                iso_code: args.take(iso_code)?,
                names: args.take(names)?,
                locales: args.take(locales)?,
            })
        });
    }
}

impl Country {
    /// Name in `locale`
    pub fn name(&self, locale: &str) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }

    /// Name in the first injected locale present, else English
    pub fn localized_name(&self) -> Option<&str> {
        pick_name(&self.names, &self.locales)
    }
}

/// Country represented by users of the address (e.g. a military base)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepresentedCountry {
    /// The represented country
    #[serde(flatten)]
    pub country: Country,
    /// Kind of representation (the `type` key), e.g. `military`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Record for RepresentedCountry {
    fn schema(schema: &mut Schema<Self>) {
        let confidence = schema.field("confidence");
        let geoname_id = schema.field("geoname_id");
        let is_in_european_union = schema.field("is_in_european_union");
        let iso_code = schema.field("iso_code");
        let names = schema.field("names");
        let kind = schema.field("type");
        let locales = schema.inject(LOCALES);

        schema.constructor(move |args| {
            Ok(RepresentedCountry {
                country: Country {
                    confidence: args.take(confidence)?,
                    geoname_id: args.take(geoname_id)?,
                    is_in_european_union: args.take(is_in_european_union)?,
                    iso_code: args.take(iso_code)?,
                    names: args.take(names)?,
                    locales: args.take(locales)?,
                },
                kind: args.take(kind)?,
            })
        });
    }
}

/// Coordinates and time zone (the `location` key)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Coordinates {
    /// Radius in kilometers around the coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_radius: Option<u16>,
    /// Approximate latitude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Approximate longitude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// US metro code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metro_code: Option<u32>,
    /// IANA time zone name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl Record for Coordinates {
    fn schema(schema: &mut Schema<Self>) {
        let accuracy_radius = schema.field("accuracy_radius");
        let latitude = schema.field("latitude");
        let longitude = schema.field("longitude");
        let metro_code = schema.field("metro_code");
        let time_zone = schema.field("time_zone");

        schema.constructor(move |args| {
            Ok(Coordinates {
                accuracy_radius: args.take(accuracy_radius)?,
                latitude: args.take(latitude)?,
                longitude: args.take(longitude)?,
                metro_code: args.take(metro_code)?,
                time_zone: args.take(time_zone)?,
            })
        });
    }
}

impl Coordinates {
    /// True when both latitude and longitude are present
    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Postal code
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Postal {
    /// Postal code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Confidence (0-100) that the postal code is correct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u16>,
}

impl Record for Postal {
    fn schema(schema: &mut Schema<Self>) {
        let code = schema.field("code");
        let confidence = schema.field("confidence");
        schema.constructor(move |args| {
            Ok(Postal {
                code: args.take(code)?,
                confidence: args.take(confidence)?,
            })
        });
    }
}

/// First-level or lower administrative division
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Subdivision {
    /// Confidence (0-100) that the subdivision is correct
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u16>,
    /// GeoNames identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoname_id: Option<u32>,
    /// ISO 3166-2 subdivision code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    /// Names keyed by locale code
    pub names: BTreeMap<String, String>,
    #[serde(skip)]
    locales: Vec<String>,
}

impl Record for Subdivision {
    fn schema(schema: &mut Schema<Self>) {
        let confidence = schema.field("confidence");
        let geoname_id = schema.field("geoname_id");
        let iso_code = schema.field("iso_code");
        let names = schema.field("names");
        let locales = schema.inject(LOCALES);

        schema.constructor(move |args| {
            Ok(Subdivision {
                confidence: args.take(confidence)?,
                geoname_id: args.take(geoname_id)?,
                iso_code: args.take(iso_code)?,
                names: args.take(names)?,
                locales: args.take(locales)?,
            })
        });
    }
}

impl Subdivision {
    /// Name in `locale`
    pub fn name(&self, locale: &str) -> Option<&str> {
        self.names.get(locale).map(String::as_str)
    }

    /// Name in the first injected locale present, else English
    pub fn localized_name(&self) -> Option<&str> {
        pick_name(&self.names, &self.locales)
    }
}

/// Properties of the address itself
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Traits {
    /// Autonomous system number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autonomous_system_number: Option<u32>,
    /// Organization owning the autonomous system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autonomous_system_organization: Option<String>,
    /// Second-level domain of the address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Whether the address is an anonymous proxy
    pub is_anonymous_proxy: bool,
    /// Whether the address belongs to a satellite provider
    pub is_satellite_provider: bool,
    /// Internet service provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    /// Network of the lookup that produced this record; `None` during
    /// full iteration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    /// Organization the address is assigned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Type of user, e.g. `residential`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

impl Record for Traits {
    fn schema(schema: &mut Schema<Self>) {
        let asn = schema.field("autonomous_system_number");
        let aso = schema.field("autonomous_system_organization");
        let domain = schema.field("domain");
        let is_anonymous_proxy = schema.field("is_anonymous_proxy");
        let is_satellite_provider = schema.field("is_satellite_provider");
        let isp = schema.field("isp");
        let network = schema.network();
        let organization = schema.field("organization");
        let user_type = schema.field("user_type");

        schema.constructor(move |args| {
            Ok(Traits {
                autonomous_system_number: args.take(asn)?,
                autonomous_system_organization: args.take(aso)?,
                domain: args.take(domain)?,
                is_anonymous_proxy: args.take(is_anonymous_proxy)?,
                is_satellite_provider: args.take(is_satellite_provider)?,
                isp: args.take(isp)?,
                network: args.take(network)?,
                organization: args.take(organization)?,
                user_type: args.take(user_type)?,
            })
        });
    }
}

use chrono::{DateTime, Utc};
use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

// stored as a (longitude, latitude) point
impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Geometry::Point(Point::new(coordinates.lng, coordinates.lat))
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self::new(lng, lat)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Driver,
    Passenger,
}

/// A position report relayed between ride participants. Never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationEvent {
    pub ride_id: Uuid,
    pub role: ParticipantRole,
    pub user_id: Uuid,
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
}

#[test]
fn coordinates_validity_test() {
    assert!(Coordinates::new(78.4867, 17.385).is_valid());
    assert!(Coordinates::new(-180.0, -90.0).is_valid());
    assert!(!Coordinates::new(181.0, 0.0).is_valid());
    assert!(!Coordinates::new(0.0, 90.5).is_valid());
    assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
}

#[test]
fn coordinates_from_pair_test() {
    let coordinates: Coordinates = [78.4867, 17.385].into();

    assert_eq!(coordinates.lng, 78.4867);
    assert_eq!(coordinates.lat, 17.385);

    match Geometry::from(coordinates) {
        Geometry::Point(point) => {
            assert_eq!(point.x(), 78.4867);
            assert_eq!(point.y(), 17.385);
        }
        _ => panic!("expected a point"),
    }
}

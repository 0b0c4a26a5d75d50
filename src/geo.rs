//! Great-circle distance on a spherical earth.

use crate::entities::Coordinates;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two coordinates, in meters.
pub fn distance(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_coordinates(rng: &mut impl Rng) -> Coordinates {
        Coordinates::new(rng.gen_range(-180.0..=180.0), rng.gen_range(-90.0..=90.0))
    }

    #[test]
    fn zero_distance_to_self() {
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let point = random_coordinates(&mut rng);
            assert!(distance(point, point).abs() < 1e-6);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let a = random_coordinates(&mut rng);
            let b = random_coordinates(&mut rng);
            assert!((distance(a, b) - distance(b, a)).abs() < 1e-6);
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(0.0, 1.0);

        // 2 * pi * R / 360
        assert!((distance(a, b) - 111_194.93).abs() < 1.0);
    }

    #[test]
    fn known_city_pair() {
        let hyderabad = Coordinates::new(78.4867, 17.3850);
        let bengaluru = Coordinates::new(77.5946, 12.9716);

        let km = distance(hyderabad, bengaluru) / 1000.0;
        assert!((km - 500.0).abs() < 10.0, "got {km}");
    }

    #[test]
    fn antipodes_are_half_circumference_apart() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(180.0, 0.0);

        let half = std::f64::consts::PI * EARTH_RADIUS_METERS;
        assert!((distance(a, b) - half).abs() < 1.0);
    }
}

use serde::{Deserialize, Serialize};
use std::{
    cmp,
    fmt::Display,
    iter::Sum,
    ops::{Add, Div, Mul, Sub},
    str::FromStr,
};
use thiserror::Error;

pub(crate) const EARTH_RADIUS: Distance = Distance::from_meters(6_372_797.560_856);

/// Two coordinates closer than this are considered the same point.
pub(crate) const COORD_EPSILON: Distance = Distance::from_meters(0.1);

/// Squared degree-length under which a segment is treated as a single point,
/// roughly one meter.
const DEGENERATE_SEGMENT_SQR: f64 = 1e-11;

#[derive(Debug, Clone, Copy, Default)]
pub struct Distance(f64);

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Add for Distance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Distance {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<f64> for Distance {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<f64> for Distance {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl From<f64> for Distance {
    fn from(value: f64) -> Self {
        Distance(value)
    }
}

impl Distance {
    pub const MAX: Distance = Distance(f64::MAX);

    pub const fn from_meters(distance: f64) -> Self {
        Self(distance)
    }

    pub const fn from_kilometers(distance: f64) -> Self {
        Self(distance * 1000.0)
    }

    pub const fn as_meters(&self) -> f64 {
        self.0
    }

    pub const fn as_kilometers(&self) -> f64 {
        self.0 / 1000.0
    }
}

/// A WGS84 coordinate, longitude and latitude in degrees.
///
/// Equality is geographic: two coordinates are equal when they are less than
/// 0.1 m apart.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.distance_to(other) < COORD_EPSILON
    }
}

impl Sum for Coordinate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut count: usize = 0;
        let mut lon: f64 = 0.0;
        let mut lat: f64 = 0.0;
        iter.for_each(|coordinate| {
            count += 1;
            lon += coordinate.lon;
            lat += coordinate.lat;
        });
        let count = count as f64;
        Self {
            lon: lon / count,
            lat: lat / count,
        }
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{};{}", self.lon, self.lat))
    }
}

#[derive(Error, Debug)]
pub enum ParseCoordinateError {
    #[error("Invalid longitude")]
    InvalidLongitude,
    #[error("Invalid latitude")]
    InvalidLatitude,
    #[error("Invalid format")]
    InvalidFormat,
}

impl FromStr for Coordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(';') {
            return Err(ParseCoordinateError::InvalidFormat);
        }
        let s: String = s.split_whitespace().collect();
        let split: Vec<_> = s.split(';').collect();
        let lon: f64 = split
            .first()
            .ok_or(ParseCoordinateError::InvalidLongitude)?
            .parse()
            .map_err(|_| ParseCoordinateError::InvalidLongitude)?;
        let lat: f64 = split
            .last()
            .ok_or(ParseCoordinateError::InvalidLatitude)?
            .parse()
            .map_err(|_| ParseCoordinateError::InvalidLatitude)?;
        Ok(Coordinate { lon, lat })
    }
}

impl Coordinate {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Haversine distance.
    pub fn distance_to(&self, coord: &Self) -> Distance {
        let lon_arc = (self.lon - coord.lon).to_radians();
        let lat_arc = (self.lat - coord.lat).to_radians();
        let lat_h = f64::powi(f64::sin(lat_arc * 0.5), 2);
        let lon_h = f64::powi(f64::sin(lon_arc * 0.5), 2);
        let tmp = f64::cos(self.lat.to_radians()) * f64::cos(coord.lat.to_radians());
        Distance::from_meters(
            EARTH_RADIUS.as_meters() * 2.0 * f64::asin(f64::sqrt(lat_h + tmp * lon_h)),
        )
    }

    /// Projects this coordinate on the segment `[start, end]`.
    ///
    /// Returns the closest point on the segment and the distance to it. A
    /// segment shorter than about one meter is treated as a point and the
    /// closer endpoint wins.
    pub fn project_on_segment(&self, start: &Self, end: &Self) -> (Coordinate, Distance) {
        let dlon = end.lon - start.lon;
        let dlat = end.lat - start.lat;
        let length_sqr = dlon * dlon + dlat * dlat;

        let u = if length_sqr < DEGENERATE_SEGMENT_SQR {
            if self.distance_to(start) < self.distance_to(end) {
                0.0
            } else {
                1.0
            }
        } else {
            ((self.lon - start.lon) * dlon + (self.lat - start.lat) * dlat) / length_sqr
        };

        if u < 0.0 {
            (*start, self.distance_to(start))
        } else if u > 1.0 {
            (*end, self.distance_to(end))
        } else {
            let projected = Coordinate {
                lon: start.lon + u * dlon,
                lat: start.lat + u * dlat,
            };
            let distance = self.distance_to(&projected);
            (projected, distance)
        }
    }

    /// Closest point to this coordinate across all segments of `line`.
    ///
    /// An empty polyline projects on itself.
    pub fn project_on_polyline(&self, line: &[Coordinate]) -> Coordinate {
        let Some(first) = line.first() else {
            return *self;
        };
        let mut projected = *first;
        let mut min_dist = self.distance_to(first);
        for segment in line.windows(2) {
            let (candidate, distance) = self.project_on_segment(&segment[0], &segment[1]);
            if distance < min_dist {
                min_dist = distance;
                projected = candidate;
            }
        }
        projected
    }

    /// Closest point across several polylines.
    pub fn project_on_multipolyline(&self, multiline: &[Vec<Coordinate>]) -> Coordinate {
        let mut projected = *self;
        let mut min_dist = Distance::MAX;
        for line in multiline {
            let candidate = self.project_on_polyline(line);
            let distance = candidate.distance_to(self);
            if distance < min_dist {
                min_dist = distance;
                projected = candidate;
            }
        }
        projected
    }
}

/// Cuts `line` at `blade` and keeps one half, with `blade` as the cut point.
///
/// The cut segment is found by checking collinearity, `ac + cb == ab` up to
/// 0.1 m. When `blade` lies on no segment the result is empty.
pub fn split_polyline_at(
    line: &[Coordinate],
    blade: &Coordinate,
    keep_end: bool,
) -> Vec<Coordinate> {
    let mut result = Vec::new();
    for (i, segment) in line.windows(2).enumerate() {
        let ab = segment[0].distance_to(&segment[1]);
        let ac = blade.distance_to(&segment[0]);
        let bc = blade.distance_to(&segment[1]);
        if (ac + bc - ab).as_meters().abs() < COORD_EPSILON.as_meters() {
            if keep_end {
                result.push(*blade);
                result.extend_from_slice(&line[i + 1..]);
            } else {
                result.extend_from_slice(&line[..=i]);
                result.push(*blade);
            }
            break;
        }
    }
    result
}

#[test]
fn distance_test() {
    let paris = Coordinate::new(2.351_435, 48.858_01);
    let london = Coordinate::new(-0.124_954, 51.505_238);
    let d = paris.distance_to(&london);
    assert!((d.as_kilometers() - 343.0).abs() < 2.0);
}

#[test]
fn distance_symmetry_test() {
    let a = Coordinate::new(2.351_435, 48.858_01);
    let b = Coordinate::new(2.362_81, 48.853_52);
    assert_eq!(a.distance_to(&b).as_meters(), b.distance_to(&a).as_meters());
    assert!(a.distance_to(&b).as_meters() >= 0.0);
}

#[test]
fn coordinate_eq_test() {
    let a = Coordinate::new(2.0, 48.0);
    let b = Coordinate::new(2.000_000_1, 48.000_000_1);
    assert_eq!(a, b);
    let c = Coordinate::new(2.001, 48.0);
    assert_ne!(a, c);
}

#[test]
fn projection_idempotence_test() {
    let start = Coordinate::new(2.0, 48.0);
    let end = Coordinate::new(2.01, 48.0);
    let on_segment = Coordinate::new(2.005, 48.0);
    let (projected, distance) = on_segment.project_on_segment(&start, &end);
    assert_eq!(projected, on_segment);
    assert!(distance < COORD_EPSILON);
}

#[test]
fn projection_outside_segment_test() {
    let start = Coordinate::new(2.0, 48.0);
    let end = Coordinate::new(2.01, 48.0);
    let before = Coordinate::new(1.99, 48.001);
    let (projected, _) = before.project_on_segment(&start, &end);
    assert_eq!(projected, start);
    let after = Coordinate::new(2.02, 48.001);
    let (projected, _) = after.project_on_segment(&start, &end);
    assert_eq!(projected, end);
}

#[test]
fn degenerate_segment_test() {
    let start = Coordinate::new(2.0, 48.0);
    let end = Coordinate::new(2.000_000_01, 48.0);
    let p = Coordinate::new(2.000_000_02, 48.001);
    let (projected, _) = p.project_on_segment(&start, &end);
    // The segment is a point, one of its endpoints is returned.
    assert_eq!(projected, end);
}

#[test]
fn split_polyline_test() {
    let line = vec![
        Coordinate::new(2.0, 48.0),
        Coordinate::new(2.01, 48.0),
        Coordinate::new(2.02, 48.0),
    ];
    let blade = Coordinate::new(2.005, 48.0);
    let head = split_polyline_at(&line, &blade, false);
    assert_eq!(head.len(), 2);
    assert_eq!(head.last(), Some(&blade));
    let tail = split_polyline_at(&line, &blade, true);
    assert_eq!(tail.len(), 3);
    assert_eq!(tail.first(), Some(&blade));
}

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};

/// Meters spanned by one degree of latitude.
pub const METERS_PER_DEGREE_LAT: f64 = 111_120.000_24;

/// A world point or displacement: longitude (deg), latitude (deg), depth (m).
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline(always)]
    pub fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }
    #[inline(always)]
    pub fn zero() -> Self { Self::new(0.0, 0.0, 0.0) }
    #[inline(always)]
    pub fn add(self, other: Self) -> Self { Self::new(self.x + other.x, self.y + other.y, self.z + other.z) }
    #[inline(always)]
    pub fn sub(self, other: Self) -> Self { Self::new(self.x - other.x, self.y - other.y, self.z - other.z) }
    #[inline(always)]
    pub fn scale(self, scalar: f64) -> Self { Self::new(self.x * scalar, self.y * scalar, self.z * scalar) }

    /// Linear interpolation between `self` (t = 0) and `other` (t = 1).
    #[inline(always)]
    pub fn lerp(self, other: Self, t: f64) -> Self { self.add(other.sub(self).scale(t)) }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 { Vec3::add(self, rhs) }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 { Vec3::sub(self, rhs) }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

/// Ratio of a degree of longitude to a degree of latitude at `lat_deg`.
#[inline(always)]
pub fn lon_to_lat_ratio(lat_deg: f64) -> f64 { lat_deg.to_radians().cos() }

/// Converts a displacement in meters (east, north) at latitude `lat_deg` into degrees.
pub fn meters_to_lonlat(east_m: f64, north_m: f64, lat_deg: f64) -> Vec3 {
    let ratio = lon_to_lat_ratio(lat_deg);
    // Poles: the longitude displacement is meaningless, keep the element in place east-west.
    let d_lon = if ratio.abs() > 1e-12 { east_m / METERS_PER_DEGREE_LAT / ratio } else { 0.0 };
    let d_lat = north_m / METERS_PER_DEGREE_LAT;
    Vec3::new(d_lon, d_lat, 0.0)
}

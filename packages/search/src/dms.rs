//! Degrees-minutes-seconds formatting.

use serde::Serialize;
use toponym_map_geometry_models::LatLng;

/// Formats a decimal angle as `D°MM′SS″`.
///
/// Degrees are the truncated magnitude, minutes the truncated remainder
/// times 60 and seconds the rounded remainder of that times 60. A rounded
/// 60 carries into the next unit. A negative angle gets a single `-`
/// prefix, even when the degree part is zero.
///
/// ```
/// use toponym_map_search::dms::to_dms;
///
/// assert_eq!(to_dms(41.2), "41°12′00″");
/// assert_eq!(to_dms(-0.5), "-0°30′00″");
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_dms(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();

    let mut degrees = magnitude.trunc() as u32;
    let minutes_exact = magnitude.fract() * 60.0;
    let mut minutes = minutes_exact.trunc() as u32;
    let mut seconds = (minutes_exact.fract() * 60.0).round() as u32;

    if seconds == 60 {
        seconds = 0;
        minutes += 1;
    }
    if minutes == 60 {
        minutes = 0;
        degrees += 1;
    }

    format!("{sign}{degrees}°{minutes:02}′{seconds:02}″")
}

/// A position formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DmsPair {
    /// Formatted latitude.
    pub latitude: String,
    /// Formatted longitude.
    pub longitude: String,
}

impl From<LatLng> for DmsPair {
    fn from(point: LatLng) -> Self {
        Self {
            latitude: to_dms(point.lat),
            longitude: to_dms(point.lon),
        }
    }
}

impl std::fmt::Display for DmsPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_minutes() {
        assert_eq!(to_dms(41.2), "41°12′00″");
        assert_eq!(to_dms(-0.5), "-0°30′00″");
        assert_eq!(to_dms(0.0), "0°00′00″");
    }

    #[test]
    fn pads_minutes_and_seconds() {
        // 16.6068° = 16° 36′ 24.48″
        assert_eq!(to_dms(16.6068), "16°36′24″");
        assert_eq!(to_dms(49.0 + 5.0 / 60.0 + 7.0 / 3600.0), "49°05′07″");
    }

    #[test]
    fn sign_is_emitted_once() {
        assert_eq!(to_dms(-49.1951), "-49°11′42″");
        assert_eq!(to_dms(-0.0001).matches('-').count(), 1);
    }

    #[test]
    fn rounding_carries_into_minutes_and_degrees() {
        assert_eq!(to_dms(41.0 + 11.0 / 60.0 + 59.8 / 3600.0), "41°12′00″");
        assert_eq!(to_dms(14.999_999_9), "15°00′00″");
    }

    #[test]
    fn pair_formats_both_axes() {
        let pair = DmsPair::from(LatLng::new(50.0755, 14.4378));
        assert_eq!(pair.latitude, "50°04′32″");
        assert_eq!(pair.longitude, "14°26′16″");
        assert_eq!(pair.to_string(), "50°04′32″ 14°26′16″");
    }
}

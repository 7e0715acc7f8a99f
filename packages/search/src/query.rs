//! The coordinate query handed from the point picker to the results view.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use toponym_map_geometry_models::LatLng;

use crate::{SearchError, SearchFilters};

/// Radius used when a picked point is confirmed.
pub const DEFAULT_RADIUS_METERS: u32 = 5_000;

/// A radius search around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateQuery {
    /// Center latitude.
    pub latitude: f64,
    /// Center longitude.
    pub longitude: f64,
    /// Search radius in meters.
    pub radius_meters: u32,
    /// Filters merged into the request.
    #[serde(default)]
    pub extra_filters: SearchFilters,
}

impl CoordinateQuery {
    /// A query around `center` with no filters.
    #[must_use]
    pub fn new(center: LatLng, radius_meters: u32) -> Self {
        Self {
            latitude: center.lat,
            longitude: center.lon,
            radius_meters,
            extra_filters: SearchFilters::default(),
        }
    }

    /// Same query with `filters` merged in.
    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.extra_filters = filters;
        self
    }

    /// The search center.
    #[must_use]
    pub const fn center(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    /// Query parameters: `latitude`, `longitude`, `radius`, then the set
    /// filters.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("radius", self.radius_meters.to_string()),
        ];
        pairs.extend(self.extra_filters.to_query_pairs());
        pairs
    }

    /// The navigable results URL for this query under `base`.
    ///
    /// Any query string already on `base` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidUrl`] if `base` is not an absolute
    /// URL.
    pub fn navigation_url(&self, base: &str) -> Result<Url, SearchError> {
        let mut url = Url::parse(base).map_err(|e| SearchError::InvalidUrl {
            message: format!("{base}: {e}"),
        })?;
        url.query_pairs_mut()
            .clear()
            .extend_pairs(self.to_query_pairs());
        Ok(url)
    }

    /// Reads a query back from a results URL.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] if the coordinates or the
    /// radius are missing, unparsable or out of range.
    pub fn from_url(url: &Url) -> Result<Self, SearchError> {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let lookup = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| SearchError::InvalidQuery {
                    message: format!("missing {key}"),
                })
        };
        let number = |key: &str| {
            lookup(key)?
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| SearchError::InvalidQuery {
                    message: format!("{key} is not a number"),
                })
        };

        let center = LatLng::new(number("latitude")?, number("longitude")?);
        if !center.is_valid() {
            return Err(SearchError::InvalidQuery {
                message: format!("center out of range: {center}"),
            });
        }
        let radius_meters = lookup("radius")?
            .parse()
            .map_err(|_| SearchError::InvalidQuery {
                message: "radius is not a whole number of meters".to_string(),
            })?;

        Ok(Self::new(center, radius_meters).with_filters(SearchFilters::from_query_pairs(pairs)))
    }
}

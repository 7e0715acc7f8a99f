//! Pick-a-point mode.
//!
//! While attached, the picker follows every center change the surface
//! reports so the DMS display is always live. Confirming turns the
//! current center into a [`CoordinateQuery`].

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use toponym_map_geometry_models::LatLng;
use toponym_map_surface::{MapSurface, SurfaceEvent};

use crate::{CoordinateQuery, DmsPair, SearchFilters};

/// Tracks the map center while the user picks a search point.
pub struct CenterPicker {
    center: Arc<watch::Sender<LatLng>>,
    radius_meters: u32,
    cancel: CancellationToken,
}

impl CenterPicker {
    /// Starts following `surface`'s center.
    #[must_use]
    pub fn attach(surface: &dyn MapSurface, radius_meters: u32) -> Self {
        let events = surface.subscribe();
        let center = Arc::new(watch::Sender::new(surface.center()));
        let cancel = CancellationToken::new();

        tokio::spawn(follow(events, Arc::clone(&center), cancel.clone()));

        Self {
            center,
            radius_meters,
            cancel,
        }
    }

    /// The current center.
    #[must_use]
    pub fn center(&self) -> LatLng {
        *self.center.borrow()
    }

    /// The current center in DMS notation.
    #[must_use]
    pub fn display(&self) -> DmsPair {
        DmsPair::from(self.center())
    }

    /// Subscribes to center changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LatLng> {
        self.center.subscribe()
    }

    /// Builds the query for the current center, merged with `filters`.
    #[must_use]
    pub fn confirm(&self, filters: SearchFilters) -> CoordinateQuery {
        let query = CoordinateQuery::new(self.center(), self.radius_meters).with_filters(filters);
        log::debug!(
            "Picked {} with radius {} m",
            self.display(),
            query.radius_meters
        );
        query
    }

    /// Stops following the surface.
    pub fn detach(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CenterPicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn follow(
    mut events: broadcast::Receiver<SurfaceEvent>,
    center: Arc<watch::Sender<LatLng>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(SurfaceEvent::Moved { center: moved }) => {
                center.send_replace(moved);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("Center picker skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

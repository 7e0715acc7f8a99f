//! The recovery wrapper around the mounted map.
//!
//! [`MapShell`] owns exactly one surface instance at a time together with
//! the task listening to its events. A retry never patches the failed
//! instance: the listener is cancelled, the surface is dropped and a new
//! one is mounted under the next generation. Handles taken from the old
//! instance are detached, so they refuse further commands. Recovery only
//! ever starts from an explicit [`MapShell::retry`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toponym_map_surface::{
    ActivityReporter, Generation, MapSurface, SurfaceError, SurfaceEvent, SurfaceHandle,
};

use crate::watchdog::{DEFAULT_INACTIVITY_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS};
use crate::{Fault, HealthError, HealthMonitor, HealthStatus, Watchdog};

/// Health monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthOptions {
    /// Silence after which the map is considered frozen.
    pub inactivity_timeout_ms: u64,
    /// Watchdog polling interval.
    pub poll_interval_ms: u64,
    /// Whether raw pointer input over the map counts as activity.
    pub count_pointer_input: bool,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: DEFAULT_INACTIVITY_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            count_pointer_input: false,
        }
    }
}

/// Creates fresh surface instances.
pub trait SurfaceFactory: Send + Sync {
    /// Mounts a brand-new surface identified by `generation`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the instance cannot be created.
    fn mount(&self, generation: Generation) -> Result<Arc<dyn MapSurface>, SurfaceError>;
}

/// What the wrapper presents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum ShellView {
    /// The live map, mounted under `remount_key`.
    Map {
        /// Attempt number the instance was mounted for.
        remount_key: u32,
    },
    /// The map is (re)initializing.
    Loading,
    /// The map failed; waiting for the user to retry.
    Error {
        /// What went wrong.
        message: String,
        /// Label of the manual retry action.
        retry_label: String,
    },
}

/// Label of the retry action after `attempt` earlier retries.
#[must_use]
pub fn retry_label(attempt: u32) -> String {
    if attempt == 0 {
        "Reload map".to_string()
    } else {
        format!("Reload map (attempt {})", attempt + 1)
    }
}

struct Mounted {
    handle: SurfaceHandle,
    listener: CancellationToken,
    task: JoinHandle<()>,
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.handle.detach();
        self.listener.cancel();
    }
}

/// Owner of the mounted map surface.
pub struct MapShell {
    factory: Arc<dyn SurfaceFactory>,
    options: HealthOptions,
    monitor: Arc<HealthMonitor>,
    watchdog: Watchdog,
    mounted: Mutex<Option<Mounted>>,
}

impl MapShell {
    /// Mounts the first instance and starts health monitoring.
    ///
    /// A failed initial mount is reported as a lifecycle fault, so the
    /// shell comes up showing the error view.
    #[must_use]
    pub fn start(factory: Arc<dyn SurfaceFactory>, options: HealthOptions) -> Self {
        let monitor = Arc::new(HealthMonitor::new());
        let watchdog = Watchdog::spawn(
            Arc::clone(&monitor),
            Duration::from_millis(options.inactivity_timeout_ms),
            Duration::from_millis(options.poll_interval_ms),
        );

        let shell = Self {
            factory,
            options,
            monitor,
            watchdog,
            mounted: Mutex::new(None),
        };

        if let Err(e) = shell.mount(Generation::default()) {
            log::error!("Initial map mount failed: {e}");
        }
        shell
    }

    /// What the wrapper presents right now.
    #[must_use]
    pub fn view(&self) -> ShellView {
        let state = self.monitor.snapshot();
        if let Some(fault) = state.fault() {
            return ShellView::Error {
                message: fault.to_string(),
                retry_label: retry_label(state.attempt()),
            };
        }

        let ready = self
            .handle()
            .is_some_and(|handle| handle.surface().is_ready());
        if ready && state.status() == HealthStatus::Healthy {
            ShellView::Map {
                remount_key: state.attempt(),
            }
        } else {
            ShellView::Loading
        }
    }

    /// Handle to the mounted surface, if one is mounted.
    #[must_use]
    pub fn handle(&self) -> Option<SurfaceHandle> {
        self.mounted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|mounted| mounted.handle.clone())
    }

    /// Identity key of the mounted instance.
    #[must_use]
    pub fn remount_key(&self) -> u32 {
        self.monitor.snapshot().attempt()
    }

    /// The health monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Reporter for components that drive the camera.
    #[must_use]
    pub fn reporter(&self) -> Arc<dyn ActivityReporter> {
        Arc::clone(&self.monitor) as Arc<dyn ActivityReporter>
    }

    /// Subscribes to health status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.monitor.subscribe()
    }

    /// Tears down the failed instance and mounts a fresh one.
    ///
    /// Returns the generation of the new instance.
    ///
    /// # Errors
    ///
    /// * [`HealthError::InvalidTransition`] unless the map is errored
    /// * [`HealthError::Surface`] if the fresh instance cannot be mounted;
    ///   the map is errored again
    pub async fn retry(&self) -> Result<Generation, HealthError> {
        let generation = self.monitor.begin_retry()?;

        let previous = self
            .mounted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut previous) = previous {
            previous.handle.detach();
            previous.listener.cancel();
            if let Err(e) = (&mut previous.task).await {
                log::debug!("Map listener ended abnormally: {e}");
            }
            log::debug!("Tore down map generation {}", previous.handle.generation());
        }

        self.mount(generation)?;
        Ok(generation)
    }

    /// Stops monitoring and tears down the mounted instance.
    pub fn shutdown(&self) {
        self.watchdog.stop();
        self.mounted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn mount(&self, generation: Generation) -> Result<(), SurfaceError> {
        let surface = match self.factory.mount(generation) {
            Ok(surface) => surface,
            Err(e) => {
                self.monitor
                    .report_fault(generation, Fault::Lifecycle(e.to_string()));
                return Err(e);
            }
        };

        let events = surface.subscribe();
        let listener = CancellationToken::new();
        let task = tokio::spawn(listen(
            Arc::clone(&self.monitor),
            generation,
            events,
            self.options.count_pointer_input,
            listener.clone(),
        ));

        if surface.is_ready() {
            self.monitor.surface_ready(generation);
        }
        log::debug!("Mounted map generation {generation}");

        *self.mounted.lock().unwrap_or_else(PoisonError::into_inner) = Some(Mounted {
            handle: SurfaceHandle::new(surface),
            listener,
            task,
        });
        Ok(())
    }
}

impl Drop for MapShell {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn listen(
    monitor: Arc<HealthMonitor>,
    generation: Generation,
    mut events: broadcast::Receiver<SurfaceEvent>,
    count_pointer_input: bool,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SurfaceEvent::Ready) => monitor.surface_ready(generation),
            Ok(SurfaceEvent::Error { message }) => {
                monitor.report_fault(generation, Fault::Lifecycle(message));
            }
            Ok(
                SurfaceEvent::Activity
                | SurfaceEvent::MoveEnd
                | SurfaceEvent::ZoomEnd
                | SurfaceEvent::Moved { .. },
            ) => {
                monitor.record_activity(generation);
            }
            Ok(SurfaceEvent::Pointer) => {
                if count_pointer_input {
                    monitor.record_activity(generation);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("Map listener skipped {skipped} events");
                monitor.record_activity(generation);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

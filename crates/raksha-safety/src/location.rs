//! Location acquisition
//!
//! [`LocationSource`] is the device capability. [`LastKnownLocation`] wraps
//! one, asking the device on every read and falling back to the most recent
//! fix when the device errors; [`acquire_within`] bounds the wait so an
//! alert never stalls on GPS.

use crate::error::LocationError;
use crate::types::Coordinates;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Device positioning capability
#[async_trait]
pub trait LocationSource: Send + Sync + Debug {
    /// Current position
    async fn current(&self) -> Result<Coordinates, LocationError>;
}

/// Map / reverse-geocoding UI
pub trait MapSink: Send + Sync + Debug {
    /// Show `coordinates`
    fn show(&self, coordinates: Coordinates);
}

/// Source that always returns the same fix
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationSource for FixedLocation {
    async fn current(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// Source for platforms without positioning
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLocation;

#[async_trait]
impl LocationSource for UnavailableLocation {
    async fn current(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unavailable("positioning not supported".to_string()))
    }
}

/// Device source with last-fix fallback
///
/// Each new fix is fed to the map sink.
#[derive(Debug)]
pub struct LastKnownLocation {
    inner: Arc<dyn LocationSource>,
    map: Option<Arc<dyn MapSink>>,
    last: RwLock<Option<Coordinates>>,
}

impl LastKnownLocation {
    /// Wrap a device source
    #[must_use]
    pub fn new(inner: Arc<dyn LocationSource>) -> Self {
        Self {
            inner,
            map: None,
            last: RwLock::new(None),
        }
    }

    /// Feed every new fix to `map`
    #[must_use]
    pub fn with_map(mut self, map: Arc<dyn MapSink>) -> Self {
        self.map = Some(map);
        self
    }

    /// Most recent fix, without touching the device
    #[must_use]
    pub fn last(&self) -> Option<Coordinates> {
        *self.last.read()
    }

    /// Ask the device for a fresh fix and remember it
    ///
    /// # Errors
    /// Propagates the device error; the remembered fix is kept
    pub async fn refresh(&self) -> Result<Coordinates, LocationError> {
        let fix = self.inner.current().await?;
        if !fix.is_valid() {
            return Err(LocationError::Unavailable(format!("invalid fix {fix:?}")));
        }
        *self.last.write() = Some(fix);
        if let Some(map) = &self.map {
            map.show(fix);
        }
        tracing::debug!(lat = fix.lat, lng = fix.lng, "location fix");
        Ok(fix)
    }
}

#[async_trait]
impl LocationSource for LastKnownLocation {
    /// Fresh fix, else the remembered one
    ///
    /// A device that hangs is bounded by the caller's [`acquire_within`]
    /// budget, not by this fallback.
    async fn current(&self) -> Result<Coordinates, LocationError> {
        match self.refresh().await {
            Ok(fix) => Ok(fix),
            Err(e) => match self.last() {
                Some(fix) => {
                    tracing::warn!(error = %e, lat = fix.lat, lng = fix.lng, "using last known location");
                    Ok(fix)
                }
                None => Err(e),
            },
        }
    }
}

/// Ask `source` for a fix, giving up after `budget`
///
/// # Errors
/// `LocationError::Timeout` when the budget runs out, otherwise the
/// source's own error
pub async fn acquire_within(
    source: &dyn LocationSource,
    budget: Duration,
) -> Result<Coordinates, LocationError> {
    match tokio::time::timeout(budget, source.current()).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout {
            after_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocationSource for CountingSource {
        async fn current(&self) -> Result<Coordinates, LocationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Coordinates::new(12.9716, 77.5946))
        }
    }

    #[derive(Debug)]
    struct NeverSource;

    #[async_trait]
    impl LocationSource for NeverSource {
        async fn current(&self) -> Result<Coordinates, LocationError> {
            std::future::pending().await
        }
    }

    #[derive(Debug, Default)]
    struct RecordingMap(RwLock<Vec<Coordinates>>);

    impl MapSink for RecordingMap {
        fn show(&self, coordinates: Coordinates) {
            self.0.write().push(coordinates);
        }
    }

    /// Replays fixes in order; `None` is a device error
    #[derive(Debug)]
    struct ScriptedSource(Mutex<VecDeque<Option<Coordinates>>>);

    impl ScriptedSource {
        fn new(fixes: impl IntoIterator<Item = Option<Coordinates>>) -> Self {
            Self(Mutex::new(fixes.into_iter().collect()))
        }
    }

    #[async_trait]
    impl LocationSource for ScriptedSource {
        async fn current(&self) -> Result<Coordinates, LocationError> {
            self.0
                .lock()
                .pop_front()
                .flatten()
                .ok_or_else(|| LocationError::Unavailable("no fix".into()))
        }
    }

    #[tokio::test]
    async fn every_read_asks_the_device() {
        let device = Arc::new(CountingSource::default());
        let map = Arc::new(RecordingMap::default());
        let location = LastKnownLocation::new(device.clone()).with_map(map.clone());

        location.current().await.unwrap();
        location.current().await.unwrap();
        assert_eq!(device.calls.load(Ordering::SeqCst), 2);
        assert_eq!(map.0.read().len(), 2);
    }

    #[tokio::test]
    async fn moved_device_reports_new_position() {
        let home = Coordinates::new(12.9716, 77.5946);
        let station = Coordinates::new(12.9767, 77.5713);
        let location = LastKnownLocation::new(Arc::new(ScriptedSource::new([
            Some(home),
            Some(station),
            None,
        ])));

        assert_eq!(location.current().await, Ok(home));
        assert_eq!(location.current().await, Ok(station));
        assert_eq!(location.current().await, Ok(station));
        assert_eq!(location.last(), Some(station));
    }

    #[tokio::test(start_paused = true)]
    async fn acquisition_is_bounded() {
        let err = acquire_within(&NeverSource, Duration::from_secs(8))
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::Timeout { after_ms: 8000 });
    }

    #[tokio::test]
    async fn device_error_keeps_previous_fix() {
        let location = LastKnownLocation::new(Arc::new(UnavailableLocation));
        assert!(location.refresh().await.is_err());
        assert!(location.current().await.is_err());
        assert_eq!(location.last(), None);
    }
}

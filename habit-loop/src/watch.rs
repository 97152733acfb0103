//! Background location watch.
//!
//! Feeds a [`LocationSource`] stream into the controller until the stream
//! ends or the watch is stopped. Runs independently of any verification in
//! flight.

use async_trait::async_trait;
use attestation::{LocationError, LocationFix, LocationSource};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::controller::HabitLoopController;

/// Handle to a running location watch.
pub struct LocationWatch {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LocationWatch {
    /// Start consuming `source` for `user_id`.
    pub fn spawn(
        controller: Arc<HabitLoopController>,
        user_id: impl Into<String>,
        source: Arc<dyn LocationSource>,
    ) -> Self {
        let user_id = user_id.into();
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut updates = source.watch();

        let handle = tokio::spawn(async move {
            info!(user_id = %user_id, "Location watch started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    next = updates.next() => match next {
                        Some(Ok(fix)) => {
                            controller.on_location(&user_id, fix).await;
                        }
                        Some(Err(e)) => controller.on_location_error(&user_id, &e),
                        None => {
                            debug!(user_id = %user_id, "Location stream ended");
                            break;
                        }
                    },
                }
            }
            info!(user_id = %user_id, "Location watch stopped");
        });

        Self { shutdown, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the watch and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Push side of a [`ChannelLocationSource`].
#[derive(Clone)]
pub struct LocationFeed {
    sender: mpsc::Sender<Result<LocationFix, LocationError>>,
    latest: Arc<Mutex<Option<LocationFix>>>,
}

impl LocationFeed {
    /// Publish a fix. Returns false once the source is gone.
    pub async fn push(&self, fix: LocationFix) -> bool {
        *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(fix);
        self.sender.send(Ok(fix)).await.is_ok()
    }

    /// Publish a provider failure.
    pub async fn fail(&self, error: LocationError) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }
}

/// Location source fed through a channel, for platform bridges and tests.
///
/// The update stream can be taken once; later calls to `watch` get an
/// empty stream.
pub struct ChannelLocationSource {
    receiver: Mutex<Option<mpsc::Receiver<Result<LocationFix, LocationError>>>>,
    latest: Arc<Mutex<Option<LocationFix>>>,
}

impl ChannelLocationSource {
    pub fn channel(buffer: usize) -> (LocationFeed, Self) {
        let (sender, receiver) = mpsc::channel(buffer);
        let latest = Arc::new(Mutex::new(None));
        let feed = LocationFeed {
            sender,
            latest: latest.clone(),
        };
        let source = Self {
            receiver: Mutex::new(Some(receiver)),
            latest,
        };
        (feed, source)
    }
}

#[async_trait]
impl LocationSource for ChannelLocationSource {
    async fn current_fix(&self) -> Result<LocationFix, LocationError> {
        let latest = *self.latest.lock().unwrap_or_else(|p| p.into_inner());
        latest.ok_or_else(|| LocationError::Unavailable("no fix received yet".to_string()))
    }

    fn watch(&self) -> BoxStream<'static, Result<LocationFix, LocationError>> {
        let receiver = self.receiver.lock().unwrap_or_else(|p| p.into_inner()).take();
        match receiver {
            Some(rx) => ReceiverStream::new(rx).boxed(),
            None => futures::stream::empty().boxed(),
        }
    }
}

//! Detector runner
//!
//! Each band of a detector is polled by its own task; one more task per
//! detector reports progress. Every loop checks the session stop signal
//! and clock before each poll and wakes from its sleep on stop.

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use minetrace_core::{DetectionRegistries, NoiseFilter};

use crate::{
    DetectorError, EventBus, FrequencyBand, SessionClock, SignalDetector, StopSignal,
    TrackerEvent,
};

/// Shared state handed to every detector task of a session
#[derive(Clone)]
pub struct DetectorContext {
    pub filter: Arc<NoiseFilter>,
    pub registries: Arc<DetectionRegistries>,
    pub events: EventBus,
    pub stop: StopSignal,
    pub clock: SessionClock,
    /// Delay between progress events
    pub progress_interval: Duration,
}

/// Spawned tasks of one session; aborted if dropped before joining
#[derive(Default)]
pub struct TaskSet {
    handles: Vec<JoinHandle<()>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Wait for every task to finish
    pub async fn join(mut self) {
        let handles = std::mem::take(&mut self.handles);
        for result in join_all(handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!("Session task failed: {}", e);
                }
            }
        }
    }
}

impl Extend<JoinHandle<()>> for TaskSet {
    fn extend<I: IntoIterator<Item = JoinHandle<()>>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Validate `detector`'s bands and spawn its band loops and progress loop
pub fn spawn_detector(
    detector: Arc<dyn SignalDetector>,
    ctx: DetectorContext,
) -> Result<Vec<JoinHandle<()>>, DetectorError> {
    detector.config().validate()?;

    let count = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::with_capacity(detector.bands().len() + 1);

    for band in detector.bands().iter().cloned() {
        handles.push(tokio::spawn(run_band(
            detector.clone(),
            band,
            ctx.clone(),
            count.clone(),
        )));
    }
    handles.push(tokio::spawn(run_progress(detector.clone(), ctx, count)));

    info!(
        "Detector {} started on {} bands",
        detector.id(),
        detector.bands().len()
    );
    Ok(handles)
}

async fn run_band(
    detector: Arc<dyn SignalDetector>,
    band: FrequencyBand,
    ctx: DetectorContext,
    count: Arc<AtomicU64>,
) {
    debug!("{} polling band {}", detector.id(), band.name);

    loop {
        if ctx.stop.is_stopped() || ctx.clock.expired() {
            break;
        }

        let polled = tokio::select! {
            result = detector.poll(&band, &ctx.filter) => result,
            _ = ctx.stop.stopped() => break,
        };

        match polled {
            Ok(signals) => {
                for signal in signals {
                    count.fetch_add(1, Ordering::Relaxed);
                    ctx.registries.for_domain(signal.domain).append(signal.clone());
                    ctx.events.publish(TrackerEvent::SignalDetected { signal });
                }
            }
            Err(DetectorError::NoReading) => {
                // Nothing heard this poll
            }
            Err(e) => {
                warn!("Detector {} band {}: {}", detector.id(), band.name, e);
            }
        }

        let pause = detector.poll_interval().min(ctx.clock.remaining());
        if ctx.stop.sleep(pause).await {
            break;
        }
    }

    debug!("{} stopped polling band {}", detector.id(), band.name);
}

async fn run_progress(
    detector: Arc<dyn SignalDetector>,
    ctx: DetectorContext,
    count: Arc<AtomicU64>,
) {
    let mut ticker = interval(ctx.progress_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let progress = || TrackerEvent::ScanProgress {
        detector: detector.id().to_string(),
        domain: detector.domain(),
        fraction: ctx.clock.fraction(),
        count: count.load(Ordering::Relaxed),
    };

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.stop.stopped() => break,
        }
        if ctx.clock.expired() {
            break;
        }
        ctx.events.publish(progress());
    }

    ctx.events.publish(progress());
}

#[cfg(test)]
mod tests {
    use super::*;
    use minetrace_core::{RawReading, RegistryKind, SensorDomain, SignatureCatalog};
    use minetrace_sensors::{ScriptStep, ScriptedSampler};

    use crate::{AcousticDetector, RfDetector};

    fn context(duration: Duration) -> DetectorContext {
        DetectorContext {
            filter: Arc::new(NoiseFilter::new(Arc::new(SignatureCatalog::load()))),
            registries: Arc::new(DetectionRegistries::new(64)),
            events: EventBus::new(256),
            stop: StopSignal::new(),
            clock: SessionClock::start(duration),
            progress_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_band_loops_fill_registry_until_expiry() {
        let ctx = context(Duration::from_millis(150));
        let mut rx = ctx.events.subscribe();
        let sampler = Arc::new(ScriptedSampler::repeating(
            "rf",
            RawReading::new(62_510.0, 60.0),
        ));
        let detector: Arc<dyn SignalDetector> = Arc::new(RfDetector::new(
            crate::DetectorConfig::rf_default().with_poll_interval(10),
            sampler,
        ));

        let mut tasks = TaskSet::new();
        tasks.extend(spawn_detector(detector, ctx.clone()).unwrap());
        assert_eq!(tasks.len(), 4);

        tokio::time::timeout(Duration::from_secs(2), tasks.join())
            .await
            .expect("loops did not exit on expiry");

        let rf = ctx.registries.get(RegistryKind::Electromagnetic).snapshot();
        assert!(!rf.is_empty());
        assert!(rf.iter().all(|s| s.band == "rf-lf"));
        assert!(ctx.registries.get(RegistryKind::Acoustic).is_empty());

        let mut saw_signal = false;
        let mut saw_progress = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                TrackerEvent::SignalDetected { .. } => saw_signal = true,
                TrackerEvent::ScanProgress { domain, .. } => {
                    assert_eq!(domain, SensorDomain::Rf);
                    saw_progress = true;
                }
                _ => {}
            }
        }
        assert!(saw_signal && saw_progress);
    }

    #[tokio::test]
    async fn test_stop_ends_loops_promptly() {
        let ctx = context(Duration::from_secs(3600));
        let sampler = Arc::new(ScriptedSampler::new("mic", Vec::new()));
        let detector: Arc<dyn SignalDetector> = Arc::new(AcousticDetector::new(
            crate::DetectorConfig::acoustic_default().with_poll_interval(60_000),
            sampler,
        ));

        let mut tasks = TaskSet::new();
        tasks.extend(spawn_detector(detector, ctx.clone()).unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        ctx.stop.trigger();

        tokio::time::timeout(Duration::from_secs(1), tasks.join())
            .await
            .expect("loops ignored stop");
    }

    #[tokio::test]
    async fn test_sampling_errors_do_not_end_the_loop() {
        let ctx = context(Duration::from_millis(120));
        let sampler = Arc::new(ScriptedSampler::new(
            "rf",
            vec![ScriptStep::Fail("overload".to_string())],
        ));
        let detector: Arc<dyn SignalDetector> = Arc::new(RfDetector::new(
            crate::DetectorConfig::rf_default()
                .with_poll_interval(10)
                .with_bands(vec![FrequencyBand::new(
                    "lf",
                    minetrace_core::SignatureDomain::Radio,
                    30_000.0,
                    300_000.0,
                )]),
            sampler.clone(),
        ));

        let mut tasks = TaskSet::new();
        tasks.extend(spawn_detector(detector, ctx).unwrap());
        tasks.join().await;

        assert!(sampler.calls() > 1);
    }

    #[tokio::test]
    async fn test_invalid_band_is_rejected() {
        let ctx = context(Duration::from_millis(10));
        let detector: Arc<dyn SignalDetector> = Arc::new(RfDetector::new(
            crate::DetectorConfig::rf_default().with_bands(vec![FrequencyBand::new(
                "bad",
                minetrace_core::SignatureDomain::Radio,
                10.0,
                1.0,
            )]),
            Arc::new(ScriptedSampler::new("rf", Vec::new())),
        ));

        assert!(matches!(
            spawn_detector(detector, ctx),
            Err(DetectorError::InvalidBand { .. })
        ));
    }
}

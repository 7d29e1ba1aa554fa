//! Tracking orchestrator
//!
//! Owns one tracking session at a time:
//! - Idle until `start_tracking`; re-entrant starts are ignored
//! - Every detector, the correlation loop, the beep loop and the session
//!   timer run as tasks sharing one stop signal
//! - `start_tracking` resolves once all of them have been joined

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use minetrace_core::{
    CatalogError, ComprehensiveDetection, DetectedSignal, DetectionRegistries, DirectionEstimate,
    NoiseFilter, RegistryKind, RegistryStats, SensorDomain, SignalMeasurement, SignatureCatalog,
};
use minetrace_detectors::{
    spawn_detector, AcousticDetector, DetectorContext, EmFieldDetector, EventBus,
    PowerLineDetector, RfDetector, SessionClock, SignalDetector, StopSignal, TaskSet,
    TrackerEvent,
};
use minetrace_sensors::{FixedPosition, LogToneSink, PositionProvider, Sampler, ToneSink};

use crate::{AudioGuidance, BeepStatus, ConfigError, Correlator, TrackerConfig};

/// Errors from building or starting the tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("No detector could be started")]
    NoDetectors,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Signature catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Coarse tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Idle,
    Tracking,
}

/// Summary returned when a session ends
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub elapsed_ms: u64,
    /// Ended by `stop_tracking` rather than duration expiry
    pub cancelled: bool,
    pub electromagnetic_signals: usize,
    pub acoustic_signals: usize,
    /// Signals appended during the session, including evicted ones
    pub total_signals: u64,
    pub comprehensive_detections: usize,
    pub best: Option<ComprehensiveDetection>,
}

/// Builder for [`Tracker`]
pub struct TrackerBuilder {
    config: TrackerConfig,
    catalog: Option<SignatureCatalog>,
    samplers: HashMap<SensorDomain, Arc<dyn Sampler>>,
    position: Option<Arc<dyn PositionProvider>>,
    tone_sink: Option<Arc<dyn ToneSink>>,
}

impl TrackerBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            catalog: None,
            samplers: HashMap::new(),
            position: None,
            tone_sink: None,
        }
    }

    /// Use this catalog instead of the built-in table
    pub fn catalog(mut self, catalog: SignatureCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sampling capability for one sensor domain
    pub fn sampler(mut self, domain: SensorDomain, sampler: Arc<dyn Sampler>) -> Self {
        self.samplers.insert(domain, sampler);
        self
    }

    pub fn position(mut self, position: Arc<dyn PositionProvider>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn tone_sink(mut self, sink: Arc<dyn ToneSink>) -> Self {
        self.tone_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Tracker, TrackerError> {
        let config = self.config;
        config.validate()?;

        let mut catalog = self
            .catalog
            .unwrap_or_default()
            .with_default_confidence(config.default_confidence);
        if let Some(path) = &config.signature_file {
            let added = catalog.load_file(path)?;
            info!("Loaded {} signatures from {}", added, path.display());
        }
        let catalog = Arc::new(catalog);

        let mut detectors: Vec<Arc<dyn SignalDetector>> = Vec::new();
        for domain in SensorDomain::ALL {
            let settings = config.detectors.for_domain(domain).clone();
            let Some(sampler) = self.samplers.get(&domain).cloned() else {
                debug!("No sampler for {}; detector disabled", domain.as_str());
                continue;
            };
            if !settings.enabled {
                debug!("Detector {} disabled by config", settings.id);
                continue;
            }

            let detector: Arc<dyn SignalDetector> = match domain {
                SensorDomain::Rf => Arc::new(RfDetector::new(settings, sampler)),
                SensorDomain::EmField => Arc::new(EmFieldDetector::new(settings, sampler)),
                SensorDomain::PowerLine => Arc::new(PowerLineDetector::new(settings, sampler)),
                SensorDomain::Acoustic => Arc::new(AcousticDetector::new(settings, sampler)),
            };
            detectors.push(detector);
        }

        let sink = self.tone_sink.unwrap_or_else(|| Arc::new(LogToneSink));
        let pipeline = Pipeline {
            registries: Arc::new(DetectionRegistries::new(config.registry_capacity)),
            correlator: Arc::new(Correlator::new(&config)),
            guidance: Arc::new(AudioGuidance::new(sink, config.guidance)),
            events: EventBus::new(config.event_capacity),
            position: self
                .position
                .unwrap_or_else(|| Arc::new(FixedPosition(Default::default()))),
        };

        info!("Tracker built with {} detectors", detectors.len());
        Ok(Tracker {
            filter: Arc::new(NoiseFilter::with_config(catalog, config.noise)),
            config,
            detectors,
            pipeline,
            session: Mutex::new(None),
        })
    }
}

/// State shared with the correlation loop
#[derive(Clone)]
struct Pipeline {
    registries: Arc<DetectionRegistries>,
    correlator: Arc<Correlator>,
    guidance: Arc<AudioGuidance>,
    events: EventBus,
    position: Arc<dyn PositionProvider>,
}

impl Pipeline {
    /// One correlation cycle: fuse, publish, steer guidance
    fn correlate_once(&self) {
        let electromagnetic = self.registries.get(RegistryKind::Electromagnetic).snapshot();
        let acoustic = self.registries.get(RegistryKind::Acoustic).snapshot();
        let operator = self.position.current_position();

        let outcome = self
            .correlator
            .correlate(&electromagnetic, &acoustic, &operator);

        for detection in outcome.created {
            info!(
                "Emitter candidate at {:.1} Hz ({:.0}% confidence, ~{:.0} m)",
                detection.frequency_key,
                detection.combined_confidence * 100.0,
                detection.estimated_distance
            );
            self.events.publish(TrackerEvent::MinerDetected { detection });
        }
        for (detection, direction) in outcome.direction_updates {
            self.events.publish(TrackerEvent::DirectionUpdated {
                detection,
                direction,
            });
        }

        if let Some(best) = outcome.best {
            if self.guidance.config().enabled {
                self.guidance.track(
                    best.estimated_distance,
                    best.direction.map(|d| d.bearing),
                );
            }
        }
    }

    async fn run(self, every: Duration, stop: StopSignal) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => break,
            }
            self.correlate_once();
        }
        debug!("Correlation loop exited");
    }
}

/// Resets the session slot when a session ends, however it ends
struct SessionGuard<'a>(&'a Mutex<Option<StopSignal>>);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// The tracking orchestrator
pub struct Tracker {
    config: TrackerConfig,
    filter: Arc<NoiseFilter>,
    detectors: Vec<Arc<dyn SignalDetector>>,
    pipeline: Pipeline,
    /// Stop signal of the running session; `None` while idle
    session: Mutex<Option<StopSignal>>,
}

impl Tracker {
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Run a session for `duration`, or until `stop_tracking`
    ///
    /// Returns `Ok(None)` without doing anything if a session is already running.
    pub async fn start_tracking(
        &self,
        duration: Duration,
    ) -> Result<Option<SessionReport>, TrackerError> {
        let stop = {
            let mut session = self.session.lock();
            if session.is_some() {
                warn!("Tracking already in progress; start request ignored");
                return Ok(None);
            }
            if self.detectors.is_empty() {
                return Err(TrackerError::NoDetectors);
            }
            let stop = StopSignal::new();
            *session = Some(stop.clone());
            stop
        };
        let _guard = SessionGuard(&self.session);

        self.pipeline.registries.clear_all();
        self.pipeline.correlator.clear();
        self.filter.reset();

        let clock = SessionClock::start(duration);
        let ctx = DetectorContext {
            filter: self.filter.clone(),
            registries: self.pipeline.registries.clone(),
            events: self.pipeline.events.clone(),
            stop: stop.clone(),
            clock,
            progress_interval: self.config.progress_interval(),
        };

        let mut tasks = TaskSet::new();
        let mut started = 0;
        for detector in &self.detectors {
            match spawn_detector(detector.clone(), ctx.clone()) {
                Ok(handles) => {
                    tasks.extend(handles);
                    started += 1;
                }
                Err(e) => error!("Detector {} failed to start: {}", detector.id(), e),
            }
        }
        if started == 0 {
            return Err(TrackerError::NoDetectors);
        }

        info!(
            "Tracking started: {} detectors for {:.1}s",
            started,
            duration.as_secs_f64()
        );

        tasks.push(tokio::spawn(
            self.pipeline
                .clone()
                .run(self.config.correlation_interval(), stop.clone()),
        ));
        if self.config.guidance.enabled {
            tasks.push(self.pipeline.guidance.spawn(stop.clone()));
        }
        let timer = stop.clone();
        tasks.push(tokio::spawn(async move {
            if !timer.sleep(duration).await {
                timer.trigger();
            }
        }));

        tasks.join().await;
        self.pipeline.guidance.stop_guidance();

        let report = self.report(&clock);
        self.pipeline.events.publish(TrackerEvent::SessionCompleted {
            cancelled: report.cancelled,
            comprehensive_detections: report.comprehensive_detections,
            signals: report.total_signals,
            elapsed_ms: report.elapsed_ms,
        });
        info!(
            "Tracking {} after {:.1}s: {} signals, {} detections",
            if report.cancelled { "stopped" } else { "completed" },
            report.elapsed_ms as f64 / 1000.0,
            report.total_signals,
            report.comprehensive_detections
        );

        Ok(Some(report))
    }

    fn report(&self, clock: &SessionClock) -> SessionReport {
        let stats = self.pipeline.registries.stats();
        SessionReport {
            elapsed_ms: clock.elapsed().as_millis() as u64,
            cancelled: !clock.expired(),
            electromagnetic_signals: stats.electromagnetic,
            acoustic_signals: stats.acoustic,
            total_signals: stats.total_appended,
            comprehensive_detections: self.pipeline.correlator.len(),
            best: self.pipeline.correlator.best(),
        }
    }

    /// Raise the session stop signal; false when idle
    pub fn stop_tracking(&self) -> bool {
        match self.session.lock().as_ref() {
            Some(stop) => {
                info!("Stop requested");
                stop.trigger();
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> TrackerState {
        if self.session.lock().is_some() {
            TrackerState::Tracking
        } else {
            TrackerState::Idle
        }
    }

    /// Inject a positioned measurement into the direction window
    pub fn add_measurement(&self, measurement: SignalMeasurement) {
        self.pipeline.correlator.add_measurement(measurement);
    }

    /// Direction toward the best current detection
    pub fn current_direction(&self) -> Option<DirectionEstimate> {
        self.pipeline.correlator.current_direction()
    }

    /// Snapshot of one registry
    pub fn detected_signals(&self, kind: RegistryKind) -> Vec<DetectedSignal> {
        self.pipeline.registries.get(kind).snapshot()
    }

    pub fn detections(&self) -> Vec<ComprehensiveDetection> {
        self.pipeline.correlator.detections()
    }

    /// Guidance status snapshot
    pub fn status(&self) -> BeepStatus {
        self.pipeline.guidance.status()
    }

    pub fn registry_stats(&self) -> RegistryStats {
        self.pipeline.registries.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.pipeline.events.subscribe()
    }

    pub fn detector_ids(&self) -> Vec<String> {
        self.detectors.iter().map(|d| d.id().to_string()).collect()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minetrace_core::{GeoPosition, RawReading};
    use minetrace_sensors::{RecordingToneSink, ScriptedSampler};

    fn fast_config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.correlation_interval_ms = 40;
        config.progress_interval_ms = 50;
        config.detectors.rf.poll_interval_ms = 15;
        config.detectors.acoustic.poll_interval_ms = 15;
        config
    }

    fn scripted_tracker(config: TrackerConfig, sink: Arc<RecordingToneSink>) -> Arc<Tracker> {
        let tracker = Tracker::builder(config)
            .sampler(
                SensorDomain::Rf,
                Arc::new(ScriptedSampler::repeating("rf", RawReading::new(62_500.0, 70.0))),
            )
            .sampler(
                SensorDomain::Acoustic,
                Arc::new(ScriptedSampler::repeating("mic", RawReading::new(62_480.0, 50.0))),
            )
            .position(Arc::new(FixedPosition(GeoPosition::new(33.63, 46.42, 0.0))))
            .tone_sink(sink)
            .build()
            .unwrap();
        Arc::new(tracker)
    }

    #[tokio::test]
    async fn test_session_runs_to_expiry() {
        let sink = Arc::new(RecordingToneSink::new());
        let tracker = scripted_tracker(fast_config(), sink.clone());
        let mut events = tracker.subscribe();
        assert_eq!(tracker.detector_ids(), vec!["rf-1", "acoustic-1"]);

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            tracker.start_tracking(Duration::from_millis(600)),
        )
        .await
        .expect("session overran")
        .unwrap()
        .expect("session did not start");

        assert!(!report.cancelled);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["comprehensive_detections"], 1);
        assert!(report.electromagnetic_signals > 0);
        assert!(report.acoustic_signals > 0);
        assert_eq!(report.comprehensive_detections, 1);
        assert_eq!(tracker.state(), TrackerState::Idle);

        let detection = &tracker.detections()[0];
        assert_eq!(detection.frequency_key, 62_500.0);
        assert!(detection.direction.is_some());
        assert!(tracker.current_direction().is_some());
        assert!(!sink.is_empty());
        assert!(!tracker.status().active);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert!(kinds.contains(&"signal_detected"));
        assert!(kinds.contains(&"scan_progress"));
        assert_eq!(kinds.iter().filter(|k| **k == "miner_detected").count(), 1);
        assert_eq!(kinds.last(), Some(&"session_completed"));
    }

    #[tokio::test]
    async fn test_stop_halts_all_loops() {
        let sink = Arc::new(RecordingToneSink::new());
        let tracker = scripted_tracker(fast_config(), sink);

        let runner = tracker.clone();
        let session =
            tokio::spawn(async move { runner.start_tracking(Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(tracker.state(), TrackerState::Tracking);
        assert!(tracker.stop_tracking());

        let report = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("loops did not halt")
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(report.cancelled);

        let before = tracker.detected_signals(RegistryKind::Electromagnetic).len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            tracker.detected_signals(RegistryKind::Electromagnetic).len(),
            before
        );
        assert!(!tracker.stop_tracking());
    }

    #[tokio::test]
    async fn test_reentrant_start_is_ignored() {
        let tracker = scripted_tracker(fast_config(), Arc::new(RecordingToneSink::new()));

        let runner = tracker.clone();
        let session =
            tokio::spawn(async move { runner.start_tracking(Duration::from_millis(300)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = tracker.start_tracking(Duration::from_secs(1)).await.unwrap();
        assert!(second.is_none());

        let first = session.await.unwrap().unwrap();
        assert!(first.is_some());
    }

    #[tokio::test]
    async fn test_no_detectors_is_fatal() {
        let tracker = Tracker::builder(TrackerConfig::default()).build().unwrap();
        assert!(matches!(
            tracker.start_tracking(Duration::from_millis(10)).await,
            Err(TrackerError::NoDetectors)
        ));
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[tokio::test]
    async fn test_disabled_detector_is_skipped() {
        let mut config = fast_config();
        config.detectors.rf.enabled = false;
        let tracker = scripted_tracker(config, Arc::new(RecordingToneSink::new()));
        assert_eq!(tracker.detector_ids(), vec!["acoustic-1"]);
    }

    #[test]
    fn test_manual_measurements_are_windowed() {
        let tracker = Tracker::builder(TrackerConfig::default()).build().unwrap();
        for _ in 0..15 {
            tracker.add_measurement(SignalMeasurement::new(
                GeoPosition::default(),
                50.0,
                62_500.0,
                SensorDomain::Rf,
            ));
        }
        assert!(tracker.current_direction().is_none());
        assert_eq!(tracker.pipeline.correlator.injected_measurements().len(), 10);
    }

    #[tokio::test]
    async fn test_field_and_power_line_detectors_correlate() {
        let mut config = fast_config();
        config.detectors.em_field.poll_interval_ms = 15;
        config.detectors.power_line.poll_interval_ms = 15;

        let tracker = Tracker::builder(config)
            .sampler(
                SensorDomain::EmField,
                Arc::new(ScriptedSampler::repeating("mag", RawReading::new(62_500.0, 40.0))),
            )
            .sampler(
                SensorDomain::PowerLine,
                Arc::new(ScriptedSampler::repeating("mains", RawReading::new(62_550.0, 30.0))),
            )
            .sampler(
                SensorDomain::Acoustic,
                Arc::new(ScriptedSampler::repeating("mic", RawReading::new(62_480.0, 50.0))),
            )
            .tone_sink(Arc::new(RecordingToneSink::new()))
            .build()
            .unwrap();
        assert_eq!(
            tracker.detector_ids(),
            vec!["em-field-1", "power-line-1", "acoustic-1"]
        );

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            tracker.start_tracking(Duration::from_millis(500)),
        )
        .await
        .expect("session overran")
        .unwrap()
        .expect("session did not start");

        let electromagnetic = tracker.detected_signals(RegistryKind::Electromagnetic);
        assert!(electromagnetic.iter().any(|s| s.domain == SensorDomain::EmField));
        assert!(electromagnetic.iter().any(|s| s.domain == SensorDomain::PowerLine));
        assert!(electromagnetic.iter().all(|s| s.domain != SensorDomain::Acoustic));
        assert!(tracker
            .detected_signals(RegistryKind::Acoustic)
            .iter()
            .all(|s| s.domain == SensorDomain::Acoustic));

        // Both sources fall into one frequency bucket
        assert_eq!(report.comprehensive_detections, 1);
        let detection = &tracker.detections()[0];
        assert!(matches!(
            detection.primary.domain,
            SensorDomain::EmField | SensorDomain::PowerLine
        ));
        assert!(!detection.correlated.is_empty());
    }
}

//! Per-track tempo cache in front of a background tempo analysis.
//!
//! The cache is a tagged slot: `Unset -> Pending(track) -> Resolved { .. }`,
//! falling back to `Unset` when the analysis fails. A request only schedules
//! work from a state that does not already belong to the requested track, so
//! at most one analysis per track is ever in flight. Results that arrive for
//! a track that is no longer pending are dropped.
//!
//! The slot lives in a `tokio::sync::watch` channel. Its internal lock gives
//! the completion task and the frame thread release/acquire ordering, and the
//! check-and-set in [`TempoEstimator::request_tempo`] happens under that lock.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::audio::{DecodedBuffer, TrackId};
use crate::error::{Error, Result};

/// A whole-track tempo analysis.
#[async_trait]
pub trait TempoAnalyzer: Send + Sync {
    /// Analyze the complete decoded track once and return its tempo in BPM.
    ///
    /// # Errors
    /// Any failure is logged by the estimator and leaves the track eligible
    /// for another attempt.
    async fn analyze(&self, buffer: Arc<DecodedBuffer>) -> Result<f32>;

    /// Short name used in logs.
    fn analyzer_type(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoState {
    Unset,
    Pending(TrackId),
    Resolved { track: TrackId, bpm: f32 },
}

impl TempoState {
    /// The cached tempo, if it belongs to `track`.
    pub fn bpm_for(&self, track: TrackId) -> Option<f32> {
        match *self {
            TempoState::Resolved { track: t, bpm } if t == track => Some(bpm),
            _ => None,
        }
    }
}

pub struct TempoEstimator {
    analyzer: Arc<dyn TempoAnalyzer>,
    state: Arc<watch::Sender<TempoState>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl TempoEstimator {
    pub fn new(analyzer: Arc<dyn TempoAnalyzer>, runtime: Handle) -> Self {
        let (state, _) = watch::channel(TempoState::Unset);
        Self {
            analyzer,
            state: Arc::new(state),
            in_flight: Mutex::new(None),
            runtime,
        }
    }

    /// Builds an estimator that schedules onto the runtime it is created in.
    pub fn with_current_runtime(analyzer: Arc<dyn TempoAnalyzer>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self::new(analyzer, runtime))
    }

    /// Returns the cached tempo for `track` immediately, or `None` while it is
    /// unknown. An unknown, not-yet-pending track gets an analysis scheduled.
    pub fn request_tempo(&self, track: TrackId, buffer: &Arc<DecodedBuffer>) -> Option<f32> {
        let mut cached = None;
        let schedule = self.state.send_if_modified(|state| match *state {
            TempoState::Resolved { track: t, bpm } if t == track => {
                cached = Some(bpm);
                false
            }
            TempoState::Pending(t) if t == track => false,
            _ => {
                *state = TempoState::Pending(track);
                true
            }
        });

        if schedule {
            self.spawn_analysis(track, Arc::clone(buffer));
        }

        cached
    }

    fn spawn_analysis(&self, track: TrackId, buffer: Arc<DecodedBuffer>) {
        let analyzer = Arc::clone(&self.analyzer);
        let state = Arc::clone(&self.state);

        debug!(
            "Scheduling {} tempo analysis for track {}",
            analyzer.analyzer_type(),
            track.raw()
        );

        let task = self.runtime.spawn(async move {
            let outcome = analyzer.analyze(buffer).await;
            resolve(&state, track, outcome);
        });

        if let Ok(mut slot) = self.in_flight.lock() {
            // Only an analysis for an older track can still be running here.
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    /// Forgets the cached tempo and abandons any running analysis.
    pub fn invalidate(&self) {
        self.state.send_replace(TempoState::Unset);
        if let Ok(mut slot) = self.in_flight.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    pub fn state(&self) -> TempoState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<TempoState> {
        self.state.subscribe()
    }

    /// Waits until `track` is no longer pending and returns its tempo, or
    /// `None` when the analysis failed or the track was replaced.
    pub async fn resolved(&self, track: TrackId) -> Option<f32> {
        let mut receiver = self.state.subscribe();
        let state = receiver
            .wait_for(|state| *state != TempoState::Pending(track))
            .await
            .ok()
            .map(|state| *state)?;
        state.bpm_for(track)
    }
}

impl Drop for TempoEstimator {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.in_flight.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Completion of one analysis. Only a slot still pending for `track` is
/// updated, so each analysis resolves at most once.
fn resolve(state: &watch::Sender<TempoState>, track: TrackId, outcome: Result<f32>) {
    state.send_if_modified(|current| {
        if *current != TempoState::Pending(track) {
            debug!("Discarding tempo result for stale track {}", track.raw());
            return false;
        }

        *current = match outcome {
            Ok(bpm) if bpm.is_finite() && bpm > 0.0 => {
                info!("Tempo for track {}: {:.1} BPM", track.raw(), bpm);
                TempoState::Resolved { track, bpm }
            }
            Ok(bpm) => {
                warn!("Tempo analysis for track {} returned {}", track.raw(), bpm);
                TempoState::Unset
            }
            Err(e) => {
                warn!("Tempo analysis for track {} failed: {}", track.raw(), e);
                TempoState::Unset
            }
        };
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct FixedAnalyzer {
        calls: AtomicUsize,
        bpm: Option<f32>,
    }

    impl FixedAnalyzer {
        fn new(bpm: Option<f32>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                bpm,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TempoAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _buffer: Arc<DecodedBuffer>) -> Result<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bpm
                .ok_or_else(|| Error::TempoAnalysis("no peaks".to_string()))
        }

        fn analyzer_type(&self) -> &'static str {
            "fixed"
        }
    }

    /// Holds every analysis until a permit is released; reports the buffer
    /// length as the tempo so results can be told apart.
    struct GatedAnalyzer {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl GatedAnalyzer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TempoAnalyzer for GatedAnalyzer {
        async fn analyze(&self, buffer: Arc<DecodedBuffer>) -> Result<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::TempoAnalysis(e.to_string()))?;
            permit.forget();
            Ok(buffer.len() as f32)
        }

        fn analyzer_type(&self) -> &'static str {
            "gated"
        }
    }

    fn buffer(len: usize) -> Arc<DecodedBuffer> {
        Arc::new(DecodedBuffer::new(vec![0.0; len], 44100))
    }

    #[tokio::test]
    async fn cached_tempo_is_served_without_reanalysis() {
        let analyzer = FixedAnalyzer::new(Some(128.0));
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let track = TrackId::next();
        let buf = buffer(16);

        assert_eq!(estimator.request_tempo(track, &buf), None);
        assert_eq!(estimator.resolved(track).await, Some(128.0));

        assert_eq!(estimator.request_tempo(track, &buf), Some(128.0));
        assert_eq!(estimator.request_tempo(track, &buf), Some(128.0));
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn pending_request_does_not_schedule_twice() {
        let analyzer = GatedAnalyzer::new();
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let track = TrackId::next();
        let buf = buffer(120);

        assert_eq!(estimator.request_tempo(track, &buf), None);
        tokio::task::yield_now().await;
        assert_eq!(estimator.request_tempo(track, &buf), None);
        assert_eq!(estimator.state(), TempoState::Pending(track));

        analyzer.gate.add_permits(1);
        assert_eq!(estimator.resolved(track).await, Some(120.0));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_leaves_slot_unset_and_retries() {
        let analyzer = FixedAnalyzer::new(None);
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let track = TrackId::next();
        let buf = buffer(16);

        assert_eq!(estimator.request_tempo(track, &buf), None);
        assert_eq!(estimator.resolved(track).await, None);
        assert_eq!(estimator.state(), TempoState::Unset);

        assert_eq!(estimator.request_tempo(track, &buf), None);
        estimator.resolved(track).await;
        assert_eq!(analyzer.calls(), 2);
    }

    #[tokio::test]
    async fn new_track_never_sees_old_tempo() {
        let analyzer = FixedAnalyzer::new(Some(100.0));
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let first = TrackId::next();
        let second = TrackId::next();

        estimator.request_tempo(first, &buffer(16));
        assert_eq!(estimator.resolved(first).await, Some(100.0));

        assert_eq!(estimator.request_tempo(second, &buffer(16)), None);
        assert_eq!(estimator.state(), TempoState::Pending(second));
        assert_eq!(estimator.resolved(second).await, Some(100.0));
        assert_eq!(analyzer.calls(), 2);
    }

    #[tokio::test]
    async fn switching_tracks_mid_analysis_keeps_only_the_new_result() {
        let analyzer = GatedAnalyzer::new();
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let first = TrackId::next();
        let second = TrackId::next();

        estimator.request_tempo(first, &buffer(100));
        tokio::task::yield_now().await;
        estimator.request_tempo(second, &buffer(140));

        analyzer.gate.add_permits(2);
        assert_eq!(estimator.resolved(second).await, Some(140.0));
        assert_eq!(estimator.state().bpm_for(first), None);
    }

    #[tokio::test]
    async fn subscribers_observe_each_transition() {
        let analyzer = GatedAnalyzer::new();
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let mut updates = estimator.subscribe();
        let track = TrackId::next();

        estimator.request_tempo(track, &buffer(64));
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), TempoState::Pending(track));

        analyzer.gate.add_permits(1);
        updates.changed().await.unwrap();
        assert_eq!(
            *updates.borrow_and_update(),
            TempoState::Resolved { track, bpm: 64.0 }
        );
    }

    #[test]
    fn stale_completion_is_discarded() {
        let (state, _) = watch::channel(TempoState::Unset);
        let old = TrackId::next();
        let current = TrackId::next();

        state.send_replace(TempoState::Pending(current));
        resolve(&state, old, Ok(99.0));
        assert_eq!(*state.borrow(), TempoState::Pending(current));

        resolve(&state, current, Ok(123.0));
        assert_eq!(
            *state.borrow(),
            TempoState::Resolved {
                track: current,
                bpm: 123.0
            }
        );

        // A second completion for the same track cannot overwrite it.
        resolve(&state, current, Ok(50.0));
        assert_eq!(state.borrow().bpm_for(current), Some(123.0));
    }

    #[test]
    fn implausible_tempo_is_treated_as_failure() {
        let (state, _) = watch::channel(TempoState::Unset);
        let track = TrackId::next();
        state.send_replace(TempoState::Pending(track));
        resolve(&state, track, Ok(f32::NAN));
        assert_eq!(*state.borrow(), TempoState::Unset);
    }

    #[tokio::test]
    async fn invalidate_clears_the_cache() {
        let analyzer = FixedAnalyzer::new(Some(90.0));
        let estimator = TempoEstimator::new(analyzer.clone(), Handle::current());
        let track = TrackId::next();
        let buf = buffer(16);

        estimator.request_tempo(track, &buf);
        estimator.resolved(track).await;
        estimator.invalidate();

        assert_eq!(estimator.state(), TempoState::Unset);
        assert_eq!(estimator.request_tempo(track, &buf), None);
    }

    #[test]
    fn needs_a_runtime() {
        let analyzer = FixedAnalyzer::new(Some(90.0));
        assert!(matches!(
            TempoEstimator::with_current_runtime(analyzer),
            Err(Error::NoRuntime)
        ));
    }
}

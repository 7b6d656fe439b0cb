//! Single-slot mailbox between the render loop and a mask oracle.
//!
//! At most one request is outstanding. Requests made while one is in flight
//! are dropped, not queued. A completed mask overwrites whatever the slot held,
//! and readers always get the latest completed mask without blocking.

use super::preprocess::Preprocessor;
use super::types::MaskOracle;
use crate::buffer::{self, Mask, PixelBuffer};
use crate::config::SegmentationQuality;
use crate::error::BackdropError;
use anyhow::Result;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Observable state of the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    RequestInFlight,
    ResultReady,
}

/// What happened to an oracle result on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Replaced the slot's mask
    Stored,
    /// The oracle reported an error; the previous mask stays
    Failed,
    /// The mask had no pixels and was dropped
    Rejected,
    /// The channel was closed before the result arrived
    Discarded,
}

/// The state machine behind [`MaskChannel`], without any threading.
#[derive(Debug, Default)]
pub struct MaskSlot {
    mask: Option<Arc<Mask>>,
    in_flight: bool,
    closed: bool,
    generation: u64,
}

impl MaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ChannelState {
        if self.in_flight {
            ChannelState::RequestInFlight
        } else if self.mask.is_some() {
            ChannelState::ResultReady
        } else {
            ChannelState::Idle
        }
    }

    /// Claim the single request slot. False when a request is already in
    /// flight or the slot is closed.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight || self.closed {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Record the outcome of the in-flight request.
    pub fn complete(&mut self, result: Result<Mask>) -> Delivery {
        self.in_flight = false;
        if self.closed {
            return Delivery::Discarded;
        }
        match result {
            Ok(mask) => match buffer::check_mask(&mask) {
                Ok(()) => {
                    self.mask = Some(Arc::new(mask));
                    self.generation += 1;
                    Delivery::Stored
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Rejecting mask");
                    Delivery::Rejected
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Mask oracle failed, keeping previous mask");
                Delivery::Failed
            }
        }
    }

    /// Latest completed mask, possibly stale
    pub fn current(&self) -> Option<Arc<Mask>> {
        self.mask.clone()
    }

    /// Count of masks stored so far; changes whenever a fresh mask lands
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tear down: drop the mask and refuse everything that arrives later.
    pub fn close(&mut self) {
        self.closed = true;
        self.mask = None;
    }
}

/// Handle held by the render loop. The oracle runs on its own thread.
pub struct MaskChannel {
    slot: Arc<Mutex<MaskSlot>>,
    requests: Option<Sender<PixelBuffer>>,
    worker: Option<JoinHandle<()>>,
}

impl MaskChannel {
    /// Start a worker thread that owns `oracle`.
    pub fn spawn(oracle: Box<dyn MaskOracle>, quality: SegmentationQuality) -> Result<Self> {
        let slot = Arc::new(Mutex::new(MaskSlot::new()));
        let (tx, rx) = mpsc::channel();
        let worker_slot = Arc::clone(&slot);
        let worker = thread::Builder::new()
            .name("mask-oracle".into())
            .spawn(move || run_oracle(oracle, quality, rx, worker_slot))?;

        Ok(Self {
            slot,
            requests: Some(tx),
            worker: Some(worker),
        })
    }

    /// Ask for a mask of `frame`. Never blocks; returns false when the request
    /// was coalesced into one already in flight (or the channel is closed).
    pub fn request_mask(&self, frame: &PixelBuffer) -> bool {
        let Some(tx) = &self.requests else {
            return false;
        };
        if !lock(&self.slot).try_begin() {
            return false;
        }
        if tx.send(frame.clone()).is_err() {
            let err = BackdropError::OracleUnavailable("worker thread exited".into());
            lock(&self.slot).complete(Err(err.into()));
            return false;
        }
        true
    }

    /// Most recent completed mask, or `None` if none has arrived yet.
    pub fn current_mask(&self) -> Option<Arc<Mask>> {
        lock(&self.slot).current()
    }

    /// Latest mask together with its generation, read under one lock
    pub fn latest(&self) -> Option<(Arc<Mask>, u64)> {
        let slot = lock(&self.slot);
        slot.current().map(|mask| (mask, slot.generation()))
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.slot).state()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.slot).generation()
    }

    /// Stop accepting requests and discard any result still on its way.
    /// Does not wait for a stalled oracle.
    pub fn close(&mut self) {
        lock(&self.slot).close();
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for MaskChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MaskChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskChannel")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

fn lock(slot: &Mutex<MaskSlot>) -> MutexGuard<'_, MaskSlot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn run_oracle(
    mut oracle: Box<dyn MaskOracle>,
    quality: SegmentationQuality,
    requests: Receiver<PixelBuffer>,
    slot: Arc<Mutex<MaskSlot>>,
) {
    tracing::info!(oracle = oracle.name(), ?quality, "Mask oracle thread started");
    let mut last_dims = None;

    while let Ok(frame) = requests.recv() {
        let _span = tracing::debug_span!("oracle_request").entered();
        if last_dims.replace(frame.dimensions()).is_some_and(|d| d != frame.dimensions()) {
            tracing::info!(dims = ?frame.dimensions(), "Frame size changed, resetting oracle state");
            oracle.reset_state();
        }

        let input = Preprocessor::oracle_input(&frame, quality);
        let started = std::time::Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            oracle.segment(input.as_ref().unwrap_or(&frame))
        }))
        .unwrap_or_else(|payload| {
            oracle.reset_state();
            let reason = format!("oracle panicked: {}", panic_message(&*payload));
            Err(BackdropError::OracleUnavailable(reason).into())
        });
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let delivery = lock(&slot).complete(result);
        tracing::debug!(?delivery, elapsed_ms, "Mask request finished");
        if delivery == Delivery::Discarded {
            break;
        }
    }

    tracing::info!("Mask oracle thread stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::gray_mask;
    use std::time::{Duration, Instant};

    fn wait_for(channel: &MaskChannel, state: ChannelState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.state() != state {
            assert!(Instant::now() < deadline, "timed out waiting for {state:?}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn slot_starts_idle_and_empty() {
        let slot = MaskSlot::new();
        assert_eq!(slot.state(), ChannelState::Idle);
        assert!(slot.current().is_none());
    }

    #[test]
    fn requests_are_coalesced_while_in_flight() {
        let mut slot = MaskSlot::new();
        assert!(slot.try_begin());
        assert_eq!(slot.state(), ChannelState::RequestInFlight);
        assert!(!slot.try_begin());
        assert_eq!(slot.complete(Ok(gray_mask(2, 2, 9))), Delivery::Stored);
        assert_eq!(slot.state(), ChannelState::ResultReady);
        assert!(slot.try_begin());
    }

    #[test]
    fn latest_result_wins() {
        let mut slot = MaskSlot::new();
        slot.try_begin();
        slot.complete(Ok(gray_mask(2, 2, 1)));
        slot.try_begin();
        slot.complete(Ok(gray_mask(2, 2, 2)));
        assert_eq!(slot.current().unwrap().get_pixel(0, 0)[0], 2);
        assert_eq!(slot.generation(), 2);
    }

    #[test]
    fn failures_keep_the_stale_mask() {
        let mut slot = MaskSlot::new();
        slot.try_begin();
        slot.complete(Ok(gray_mask(2, 2, 7)));
        slot.try_begin();
        assert_eq!(slot.complete(Err(anyhow::anyhow!("model crashed"))), Delivery::Failed);
        assert_eq!(slot.current().unwrap().get_pixel(0, 0)[0], 7);
        assert_eq!(slot.state(), ChannelState::ResultReady);
    }

    #[test]
    fn empty_masks_are_not_cached() {
        let mut slot = MaskSlot::new();
        slot.try_begin();
        assert_eq!(slot.complete(Ok(Mask::new(0, 0))), Delivery::Rejected);
        assert!(slot.current().is_none());
        assert_eq!(slot.state(), ChannelState::Idle);
    }

    #[test]
    fn results_after_close_are_discarded() {
        let mut slot = MaskSlot::new();
        slot.try_begin();
        slot.close();
        assert!(slot.is_closed());
        assert_eq!(slot.complete(Ok(gray_mask(2, 2, 9))), Delivery::Discarded);
        assert!(slot.current().is_none());
        assert!(!slot.try_begin());
    }

    #[test]
    fn channel_delivers_oracle_masks() {
        let oracle = |frame: &PixelBuffer| -> Result<Mask> { Ok(gray_mask(frame.width(), frame.height(), 200)) };
        let channel = MaskChannel::spawn(Box::new(oracle), SegmentationQuality::Medium).unwrap();
        assert!(channel.current_mask().is_none());

        assert!(channel.request_mask(&gray_mask(4, 3, 0)));
        wait_for(&channel, ChannelState::ResultReady);
        let mask = channel.current_mask().unwrap();
        assert_eq!(mask.dimensions(), (4, 3));
        assert_eq!(channel.generation(), 1);
    }

    #[test]
    fn channel_never_blocks_on_a_slow_oracle() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let oracle = move |frame: &PixelBuffer| -> Result<Mask> {
            let _ = release_rx.lock().unwrap().recv();
            Ok(gray_mask(frame.width(), frame.height(), 255))
        };
        let channel = MaskChannel::spawn(Box::new(oracle), SegmentationQuality::Medium).unwrap();

        let frame = gray_mask(2, 2, 0);
        assert!(channel.request_mask(&frame));
        for _ in 0..10 {
            assert!(!channel.request_mask(&frame));
            assert!(channel.current_mask().is_none());
        }
        release_tx.send(()).unwrap();
        wait_for(&channel, ChannelState::ResultReady);
        assert_eq!(channel.generation(), 1);
    }

    #[test]
    fn oracle_panic_does_not_wedge_the_channel() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let oracle = move |frame: &PixelBuffer| -> Result<Mask> {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                panic!("inference blew up");
            }
            Ok(gray_mask(frame.width(), frame.height(), 99))
        };
        let channel = MaskChannel::spawn(Box::new(oracle), SegmentationQuality::Medium).unwrap();

        assert!(channel.request_mask(&gray_mask(4, 3, 0)));
        wait_for(&channel, ChannelState::Idle);
        assert!(channel.current_mask().is_none());

        assert!(channel.request_mask(&gray_mask(4, 3, 0)));
        wait_for(&channel, ChannelState::ResultReady);
        assert_eq!(channel.current_mask().unwrap().get_pixel(0, 0)[0], 99);
        assert_eq!(channel.generation(), 1);
    }

    #[test]
    fn low_quality_sends_half_size_frames() {
        let oracle = |frame: &PixelBuffer| -> Result<Mask> { Ok(gray_mask(frame.width(), frame.height(), 1)) };
        let channel = MaskChannel::spawn(Box::new(oracle), SegmentationQuality::Low).unwrap();
        channel.request_mask(&gray_mask(8, 6, 0));
        wait_for(&channel, ChannelState::ResultReady);
        assert_eq!(channel.current_mask().unwrap().dimensions(), (4, 3));
    }

    #[test]
    fn closed_channel_drops_late_results() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let oracle = move |frame: &PixelBuffer| -> Result<Mask> {
            let _ = release_rx.lock().unwrap().recv();
            Ok(gray_mask(frame.width(), frame.height(), 255))
        };
        let mut channel = MaskChannel::spawn(Box::new(oracle), SegmentationQuality::Medium).unwrap();
        assert!(channel.request_mask(&gray_mask(2, 2, 0)));
        channel.close();
        release_tx.send(()).unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(channel.current_mask().is_none());
        assert!(!channel.request_mask(&gray_mask(2, 2, 0)));
        assert_eq!(channel.generation(), 0);
    }
}

//! **Playback queue and worker** - decouples synthesis rate from playback rate.
//!
//! Any number of producers push frames; one dedicated worker thread drains them in
//! FIFO order onto the single output device. The worker waits with a timeout so it
//! notices shutdown even when nobody signals the queue, and a sentinel entry ends it.

use crate::audio::AudioFrame;
use crate::device::{DeviceFactory, PlayOutcome, PlaybackDevice};
use crate::error::{VoiceError, VoiceResult};
use crate::events::EventSink;
use crate::session::CancelToken;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One queued item.
#[derive(Debug, Clone)]
pub enum PlaybackEntry {
    /// A frame plus the token of the utterance it belongs to.
    Frame { frame: AudioFrame, cancel: CancelToken },
    /// Ends the worker loop permanently.
    Shutdown,
}

#[derive(Debug, Default)]
struct QueueInner {
    entries: Mutex<VecDeque<PlaybackEntry>>,
    available: Condvar,
    /// Frames pushed but not yet marked done by the consumer (queued + in flight).
    unfinished: AtomicUsize,
}

/// Unbounded multi-producer / single-consumer FIFO. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    inner: Arc<QueueInner>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: PlaybackEntry) {
        let mut entries = self.inner.entries.lock();
        if matches!(entry, PlaybackEntry::Frame { .. }) {
            self.inner.unfinished.fetch_add(1, Ordering::SeqCst);
        }
        entries.push_back(entry);
        drop(entries);
        self.inner.available.notify_one();
    }

    pub fn push_frame(&self, frame: AudioFrame, cancel: CancelToken) {
        self.push(PlaybackEntry::Frame { frame, cancel });
    }

    /// Wait up to `timeout` for the next entry.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PlaybackEntry> {
        let mut entries = self.inner.entries.lock();
        if entries.is_empty() {
            // Spurious wakeups just mean one more empty poll round.
            let _ = self.inner.available.wait_for(&mut entries, timeout);
        }
        entries.pop_front()
    }

    /// Drop every pending frame. The shutdown sentinel, if queued, is kept.
    pub fn clear(&self) -> usize {
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|e| matches!(e, PlaybackEntry::Shutdown));
        let removed = before - entries.len();
        self.inner.unfinished.fetch_sub(removed, Ordering::SeqCst);
        removed
    }

    /// Consumer side: the frame last popped has been played, skipped or dropped.
    pub fn task_done(&self) {
        let _ = self
            .inner
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Frames still queued or being played.
    pub fn unfinished(&self) -> usize {
        self.inner.unfinished.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Worker lifecycle: `Waiting → Playing → Waiting → … → Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Waiting,
    Playing,
    Terminated,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Starting => 0,
            WorkerState::Waiting => 1,
            WorkerState::Playing => 2,
            WorkerState::Terminated => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Starting,
            1 => WorkerState::Waiting,
            2 => WorkerState::Playing,
            _ => WorkerState::Terminated,
        }
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn set(&self, state: WorkerState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Handle to the dedicated playback thread.
pub struct PlaybackWorker {
    queue: PlaybackQueue,
    state: SharedState,
    handle: Option<thread::JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Spawn the worker and open the device on it. Returns an error if the device
    /// cannot be opened; the thread has already exited in that case.
    pub fn spawn(
        queue: PlaybackQueue,
        device_factory: DeviceFactory,
        events: EventSink,
        poll: Duration,
    ) -> VoiceResult<Self> {
        let state = SharedState(Arc::new(AtomicU8::new(WorkerState::Starting.as_u8())));
        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<()>>();

        let thread_queue = queue.clone();
        let thread_state = state.clone();
        let handle = thread::Builder::new()
            .name("pagi-vocal-playback".to_string())
            .spawn(move || {
                let device = match device_factory() {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        error!("Failed to open playback device: {}", e);
                        thread_state.set(WorkerState::Terminated);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_worker(thread_queue, device, thread_state, events, poll);
            })?;

        let ready = match ready_rx.recv() {
            Ok(result) => result,
            Err(e) => Err(VoiceError::ChannelSend(format!(
                "playback worker exited before reporting: {}",
                e
            ))),
        };
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        Ok(Self {
            queue,
            state,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Enqueue the sentinel and wait for the thread to finish. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.queue.push(PlaybackEntry::Shutdown);
            if handle.join().is_err() {
                error!("Playback worker panicked");
            }
            info!("🛑 Playback worker joined");
        }
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    queue: PlaybackQueue,
    mut device: Box<dyn PlaybackDevice>,
    state: SharedState,
    events: EventSink,
    poll: Duration,
) {
    info!("🧵 Playback worker ready");
    loop {
        state.set(WorkerState::Waiting);
        let entry = match queue.pop_timeout(poll) {
            Some(entry) => entry,
            None => continue,
        };

        let (frame, cancel) = match entry {
            PlaybackEntry::Shutdown => break,
            PlaybackEntry::Frame { frame, cancel } => (frame, cancel),
        };

        state.set(WorkerState::Playing);
        if cancel.is_cancelled() {
            debug!("skipping {} samples from an interrupted utterance", frame.len());
            events.frame_skipped(frame.len());
        } else {
            match device.play(&frame, &cancel) {
                Ok(PlayOutcome::Finished) => events.frame_played(frame.len()),
                Ok(PlayOutcome::Interrupted) => {
                    debug!("frame interrupted mid-playback");
                    events.frame_skipped(frame.len());
                }
                Err(e) => {
                    warn!("Playback error, dropping frame: {}", e);
                    events.playback_failed(e.to_string());
                }
            }
        }
        queue.task_done();
    }
    state.set(WorkerState::Terminated);
    info!("🛑 Playback worker terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StopFlag;

    /// Records first-sample markers of every frame it plays.
    struct Recorder {
        played: Arc<Mutex<Vec<f32>>>,
        fail_on: Option<f32>,
    }

    impl PlaybackDevice for Recorder {
        fn play(&mut self, frame: &AudioFrame, _cancel: &CancelToken) -> VoiceResult<PlayOutcome> {
            let marker = frame.samples[0];
            if Some(marker) == self.fail_on {
                return Err(VoiceError::Playback("device hiccup".into()));
            }
            self.played.lock().push(marker);
            Ok(PlayOutcome::Finished)
        }
    }

    fn recorder(fail_on: Option<f32>) -> (DeviceFactory, Arc<Mutex<Vec<f32>>>) {
        let played = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::clone(&played);
        let factory: DeviceFactory = Box::new(move || {
            Ok(Box::new(Recorder { played: shared, fail_on }) as Box<dyn PlaybackDevice>)
        });
        (factory, played)
    }

    fn marker_frame(marker: f32) -> AudioFrame {
        AudioFrame::new(vec![marker; 4], 24_000)
    }

    #[test]
    fn queue_is_fifo() {
        let queue = PlaybackQueue::new();
        for i in 0..3 {
            queue.push_frame(marker_frame(i as f32), CancelToken::detached());
        }
        let order: Vec<f32> = (0..3)
            .filter_map(|_| match queue.pop_timeout(Duration::from_millis(1)) {
                Some(PlaybackEntry::Frame { frame, .. }) => Some(frame.samples[0]),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let queue = PlaybackQueue::new();
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn clear_keeps_sentinel() {
        let queue = PlaybackQueue::new();
        queue.push_frame(marker_frame(1.0), CancelToken::detached());
        queue.push(PlaybackEntry::Shutdown);
        queue.push_frame(marker_frame(2.0), CancelToken::detached());
        assert_eq!(queue.unfinished(), 2);
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.unfinished(), 0);
    }

    #[test]
    fn worker_plays_in_order_and_terminates() {
        let (factory, played) = recorder(None);
        let queue = PlaybackQueue::new();
        let mut worker =
            PlaybackWorker::spawn(queue.clone(), factory, EventSink::discard(), Duration::from_millis(10))
                .unwrap();
        for i in 0..20 {
            queue.push_frame(marker_frame(i as f32), CancelToken::detached());
        }
        worker.shutdown();
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(queue.unfinished(), 0);
        let expected: Vec<f32> = (0..20).map(|i| i as f32).collect();
        assert_eq!(*played.lock(), expected);
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        let (factory, played) = recorder(None);
        let queue = PlaybackQueue::new();
        let mut worker =
            PlaybackWorker::spawn(queue.clone(), factory, EventSink::discard(), Duration::from_millis(10))
                .unwrap();
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = queue.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        q.push_frame(marker_frame((p * 100 + i) as f32), CancelToken::detached());
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        worker.shutdown();

        let played = played.lock();
        assert_eq!(played.len(), 100);
        for p in 0..4 {
            let mine: Vec<f32> = played
                .iter()
                .copied()
                .filter(|m| (*m as i32) / 100 == p)
                .collect();
            let expected: Vec<f32> = (0..25).map(|i| (p * 100 + i) as f32).collect();
            assert_eq!(mine, expected);
        }
    }

    #[test]
    fn cancelled_entries_are_drained_not_played() {
        let (factory, played) = recorder(None);
        let queue = PlaybackQueue::new();
        let flag = StopFlag::new();
        let stale = flag.begin_utterance();
        flag.raise();
        let fresh = flag.begin_utterance();
        queue.push_frame(marker_frame(1.0), stale);
        queue.push_frame(marker_frame(2.0), fresh);

        let (events, mut rx) = EventSink::channel();
        let mut worker =
            PlaybackWorker::spawn(queue.clone(), factory, events, Duration::from_millis(10)).unwrap();
        worker.shutdown();
        assert_eq!(*played.lock(), vec![2.0]);
        assert!(queue.is_empty());
        assert!(matches!(rx.try_recv(), Ok(crate::events::VoiceEvent::FrameSkipped { samples: 4, .. })));
    }

    #[test]
    fn device_error_does_not_kill_worker() {
        let (factory, played) = recorder(Some(1.0));
        let queue = PlaybackQueue::new();
        let mut worker =
            PlaybackWorker::spawn(queue.clone(), factory, EventSink::discard(), Duration::from_millis(10))
                .unwrap();
        for i in 0..3 {
            queue.push_frame(marker_frame(i as f32), CancelToken::detached());
        }
        worker.shutdown();
        assert_eq!(*played.lock(), vec![0.0, 2.0]);
    }

    #[test]
    fn device_open_failure_is_reported() {
        let factory: DeviceFactory =
            Box::new(|| Err(VoiceError::AudioDevice("no output device".into())));
        let result = PlaybackWorker::spawn(
            PlaybackQueue::new(),
            factory,
            EventSink::discard(),
            Duration::from_millis(10),
        );
        assert!(matches!(result, Err(VoiceError::AudioDevice(_))));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (factory, _played) = recorder(None);
        let mut worker = PlaybackWorker::spawn(
            PlaybackQueue::new(),
            factory,
            EventSink::discard(),
            Duration::from_millis(10),
        )
        .unwrap();
        worker.shutdown();
        worker.shutdown();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }
}

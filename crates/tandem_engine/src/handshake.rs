//! # Frame Handshake
//!
//! Three semaphores that keep the application and renderer loops in
//! lock-step:
//!
//! ```text
//!   Application                         Renderer
//!   ───────────                         ────────
//!   Start:        wait renderer_ready ◄── Initialize: signal renderer_ready
//!   FrameBegin:   signal render_begin ──► WaitFrameBegin: wait render_begin
//!   WaitRenderer: wait render_complete ◄── FrameEnd: signal render_complete
//! ```
//!
//! All three start empty. `close()` wakes every waiter; a waiter with no
//! permit left gets [`HandshakeError::Closed`]. With a timeout configured,
//! a silent peer yields [`HandshakeError::Stalled`] instead of a hang.
//!
//! The renderer's wait on `render_begin` spans the application's `Pause`,
//! so it is allowed the timeout plus one frame budget, and it does not
//! expire while the application is idle in `wait_events`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tandem_core::{Semaphore, SyncError};

use crate::error::HandshakeError;
use crate::trace::{FrameTrace, SignalAction, TraceEvent};

/// The three handshake semaphores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Renderer finished `Initialize` (successfully or not).
    RendererReady,
    /// Application handed a frame to the renderer.
    RenderBegin,
    /// Renderer finished the frame.
    RenderComplete,
}

impl Signal {
    /// Semaphore name, as used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Signal::RendererReady => "renderer_ready",
            Signal::RenderBegin => "render_begin",
            Signal::RenderComplete => "render_complete",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rendezvous shared by both loops, owned by the render context.
#[derive(Debug)]
pub struct FrameHandshake {
    renderer_ready: Semaphore,
    render_begin: Semaphore,
    render_complete: Semaphore,
    timeout: Option<Duration>,
    frame_budget: Option<Duration>,
    application_idle: AtomicBool,
    idle_changes: AtomicU64,
    frames_begun: AtomicU64,
    frames_completed: AtomicU64,
    trace: Option<FrameTrace>,
}

impl FrameHandshake {
    /// Creates an open handshake. `None` waits without a deadline.
    #[must_use]
    pub fn new(timeout: Option<Duration>, trace: Option<FrameTrace>) -> Self {
        Self {
            renderer_ready: Semaphore::new(Signal::RendererReady.name()),
            render_begin: Semaphore::new(Signal::RenderBegin.name()),
            render_complete: Semaphore::new(Signal::RenderComplete.name()),
            timeout,
            frame_budget: None,
            application_idle: AtomicBool::new(false),
            idle_changes: AtomicU64::new(0),
            frames_begun: AtomicU64::new(0),
            frames_completed: AtomicU64::new(0),
            trace,
        }
    }

    /// Extends the renderer's `render_begin` deadline by the pacing budget.
    #[must_use]
    pub fn with_frame_budget(mut self, budget: Option<Duration>) -> Self {
        self.frame_budget = budget;
        self
    }

    /// Application side: marks the application as blocked on window events.
    ///
    /// While set, and for one more timeout after it is cleared, the
    /// renderer's wait on `render_begin` does not stall.
    pub fn set_application_idle(&self, idle: bool) {
        self.application_idle.store(idle, Ordering::Release);
        self.idle_changes.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns true while the application is blocked on window events.
    #[must_use]
    pub fn is_application_idle(&self) -> bool {
        self.application_idle.load(Ordering::Acquire)
    }

    /// Renderer side: the renderer slot is settled.
    pub fn signal_renderer_ready(&self) {
        self.signal(Signal::RendererReady);
    }

    /// Application side: block until the renderer has initialized.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::Closed`] or [`HandshakeError::Stalled`].
    pub fn wait_renderer_ready(&self) -> Result<(), HandshakeError> {
        self.wait(Signal::RendererReady)
    }

    /// Application side: hand the current frame to the renderer.
    pub fn signal_frame_begin(&self) {
        self.frames_begun.fetch_add(1, Ordering::Relaxed);
        self.signal(Signal::RenderBegin);
    }

    /// Renderer side: block until the application begins a frame.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::Closed`] or [`HandshakeError::Stalled`].
    pub fn wait_frame_begin(&self) -> Result<(), HandshakeError> {
        self.wait(Signal::RenderBegin)
    }

    /// Renderer side: the frame has been rendered and presented.
    pub fn signal_frame_complete(&self) {
        self.frames_completed.fetch_add(1, Ordering::Relaxed);
        self.signal(Signal::RenderComplete);
    }

    /// Application side: block until the renderer completes the frame.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::Closed`] or [`HandshakeError::Stalled`].
    pub fn wait_frame_complete(&self) -> Result<(), HandshakeError> {
        self.wait(Signal::RenderComplete)
    }

    /// Closes all three semaphores and wakes every waiter. Idempotent.
    pub fn close(&self) {
        if !self.is_closed() {
            tracing::debug!("handshake closed");
        }
        self.renderer_ready.close();
        self.render_begin.close();
        self.render_complete.close();
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.render_complete.is_closed()
    }

    /// Configured wait timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Deadline applied to a wait on `signal`, if any.
    #[must_use]
    pub fn wait_timeout(&self, signal: Signal) -> Option<Duration> {
        let timeout = self.timeout?;
        match signal {
            Signal::RenderBegin => Some(timeout + self.frame_budget.unwrap_or_default()),
            Signal::RendererReady | Signal::RenderComplete => Some(timeout),
        }
    }

    /// Number of `render_begin` releases so far.
    #[must_use]
    pub fn frames_begun(&self) -> u64 {
        self.frames_begun.load(Ordering::Relaxed)
    }

    /// Number of `render_complete` releases so far.
    #[must_use]
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed.load(Ordering::Relaxed)
    }

    fn semaphore(&self, signal: Signal) -> &Semaphore {
        match signal {
            Signal::RendererReady => &self.renderer_ready,
            Signal::RenderBegin => &self.render_begin,
            Signal::RenderComplete => &self.render_complete,
        }
    }

    fn signal(&self, signal: Signal) {
        // Recorded before the release: the peer cannot observe the permit
        // (and record its acquire) ahead of this event.
        self.record(signal, SignalAction::Released);
        tracing::debug!(signal = signal.name(), "release");
        self.semaphore(signal).release();
    }

    fn wait(&self, signal: Signal) -> Result<(), HandshakeError> {
        let semaphore = self.semaphore(signal);
        let result = match self.wait_timeout(signal) {
            Some(timeout) => self.acquire_bounded(signal, semaphore, timeout),
            None => semaphore.acquire(),
        };
        match result {
            Ok(()) => {
                self.record(signal, SignalAction::Acquired);
                tracing::debug!(signal = signal.name(), "acquired");
                Ok(())
            }
            Err(SyncError::Closed { .. }) => Err(HandshakeError::Closed { signal }),
            Err(SyncError::TimedOut { waited, .. }) => {
                tracing::warn!(signal = signal.name(), ?waited, "peer stalled");
                Err(HandshakeError::Stalled { signal, waited })
            }
        }
    }

    fn acquire_bounded(
        &self,
        signal: Signal,
        semaphore: &Semaphore,
        timeout: Duration,
    ) -> Result<(), SyncError> {
        let started = Instant::now();
        let mut idle_changes = self.idle_changes.load(Ordering::Acquire);
        loop {
            match semaphore.acquire_timeout(timeout) {
                Err(SyncError::TimedOut { .. }) if signal == Signal::RenderBegin => {
                    let changes = self.idle_changes.load(Ordering::Acquire);
                    if !self.is_application_idle() && changes == idle_changes {
                        return Err(SyncError::TimedOut {
                            name: semaphore.name(),
                            waited: started.elapsed(),
                        });
                    }
                    idle_changes = changes;
                    tracing::trace!("application idle, extending render_begin wait");
                }
                Err(SyncError::TimedOut { name, .. }) => {
                    return Err(SyncError::TimedOut {
                        name,
                        waited: started.elapsed(),
                    });
                }
                other => return other,
            }
        }
    }

    fn record(&self, kind: Signal, action: SignalAction) {
        if let Some(trace) = &self.trace {
            trace.record(TraceEvent::Signal { kind, action });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use crate::trace::frame_releases;

    #[test]
    fn test_ping_pong_counts_frames() {
        let handshake = Arc::new(FrameHandshake::new(None, None));
        let renderer = {
            let handshake = Arc::clone(&handshake);
            thread::spawn(move || {
                handshake.signal_renderer_ready();
                while handshake.wait_frame_begin().is_ok() {
                    handshake.signal_frame_complete();
                }
            })
        };

        handshake.wait_renderer_ready().unwrap();
        for _ in 0..50 {
            handshake.signal_frame_begin();
            handshake.wait_frame_complete().unwrap();
        }
        handshake.close();
        renderer.join().unwrap();

        assert_eq!(handshake.frames_begun(), 50);
        assert_eq!(handshake.frames_completed(), 50);
    }

    #[test]
    fn test_close_wakes_waiter() {
        let handshake = Arc::new(FrameHandshake::new(None, None));
        let waiter = {
            let handshake = Arc::clone(&handshake);
            thread::spawn(move || handshake.wait_frame_complete())
        };

        thread::sleep(Duration::from_millis(20));
        handshake.close();
        handshake.close();

        assert_eq!(
            waiter.join().unwrap(),
            Err(HandshakeError::Closed {
                signal: Signal::RenderComplete
            })
        );
        assert!(handshake.is_closed());
    }

    #[test]
    fn test_signal_survives_close() {
        let handshake = FrameHandshake::new(None, None);
        handshake.signal_renderer_ready();
        handshake.close();

        assert_eq!(handshake.wait_renderer_ready(), Ok(()));
        assert!(handshake.wait_renderer_ready().is_err());
    }

    #[test]
    fn test_timeout_reports_stall() {
        let handshake = FrameHandshake::new(Some(Duration::from_millis(10)), None);
        match handshake.wait_frame_begin() {
            Err(HandshakeError::Stalled { signal, waited }) => {
                assert_eq!(signal, Signal::RenderBegin);
                assert!(waited >= Duration::from_millis(10));
            }
            other => panic!("expected stall, got {other:?}"),
        }
    }

    #[test]
    fn test_render_begin_deadline_includes_frame_budget() {
        let handshake = Arc::new(
            FrameHandshake::new(Some(Duration::from_millis(20)), None)
                .with_frame_budget(Some(Duration::from_millis(200))),
        );
        assert_eq!(
            handshake.wait_timeout(Signal::RenderBegin),
            Some(Duration::from_millis(220))
        );
        assert_eq!(
            handshake.wait_timeout(Signal::RenderComplete),
            Some(Duration::from_millis(20))
        );

        let application = {
            let handshake = Arc::clone(&handshake);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                handshake.signal_frame_begin();
            })
        };
        assert_eq!(handshake.wait_frame_begin(), Ok(()));
        application.join().unwrap();
    }

    #[test]
    fn test_idle_application_never_stalls_renderer() {
        let handshake = Arc::new(FrameHandshake::new(Some(Duration::from_millis(10)), None));
        handshake.set_application_idle(true);

        let application = {
            let handshake = Arc::clone(&handshake);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(80));
                handshake.set_application_idle(false);
                handshake.signal_frame_begin();
            })
        };
        assert_eq!(handshake.wait_frame_begin(), Ok(()));
        application.join().unwrap();

        // Idle only covers render_begin.
        handshake.set_application_idle(true);
        assert!(matches!(
            handshake.wait_frame_complete(),
            Err(HandshakeError::Stalled { .. })
        ));
    }

    #[test]
    fn test_trace_records_release_then_acquire() {
        let (trace, receiver) = FrameTrace::channel();
        let handshake = FrameHandshake::new(None, Some(trace));

        handshake.signal_frame_begin();
        handshake.wait_frame_begin().unwrap();

        let events = receiver.drain();
        assert_eq!(
            events,
            vec![
                TraceEvent::Signal {
                    kind: Signal::RenderBegin,
                    action: SignalAction::Released
                },
                TraceEvent::Signal {
                    kind: Signal::RenderBegin,
                    action: SignalAction::Acquired
                },
            ]
        );
        assert_eq!(frame_releases(&events), vec![Signal::RenderBegin]);
    }
}

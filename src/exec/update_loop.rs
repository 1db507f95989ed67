//! Fixed-step update loop with per-frame updates.
//!
//! Each iteration measures the elapsed wall time, clamps it to
//! [`UpdateLoopStatus::minimum_update_time_step`], scales it by
//! [`UpdateLoopStatus::time_scale`] and feeds it to an accumulator that is
//! drained in steps of [`UpdateLoopStatus::update_time_step`]. Every drained
//! step calls [`Updatable::fixed_step_update`]; afterwards
//! [`Updatable::frame_update`] runs once with `interpolant` set to how far the
//! loop is into the next fixed step.

use std::time::{Duration, Instant};

use glam::IVec2;
use winit::event::WindowEvent;

use crate::error::{VlkError, VlkResult};
use crate::window::Window;

pub use crate::vulkan::command_and_sync::{MAX_FRAMES_IN_FLIGHT, MAX_TIMEOUT};

/// 60 updates per second.
pub const DEFAULT_UPDATE_TIME_STEP: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Upper bound on the wall time fed into one iteration.
pub const DEFAULT_MINIMUM_UPDATE_TIME_STEP: Duration = Duration::from_millis(100);

/// What the application asks of the loop after an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRequests {
    pub pause_updates: bool,
    pub exit_update_loop: bool,
    pub update_time_step: Duration,
}

impl Default for UpdateRequests {
    fn default() -> Self {
        Self {
            pause_updates: false,
            exit_update_loop: false,
            update_time_step: DEFAULT_UPDATE_TIME_STEP,
        }
    }
}

impl UpdateRequests {
    pub fn exit() -> Self {
        Self {
            exit_update_loop: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateLoopStatus {
    pub time_scale: f64,
    /// Simulated time advanced by fixed steps so far.
    pub cumulative_time: Duration,
    pub update_time_step: Duration,
    pub minimum_update_time_step: Duration,
    /// Fraction of a fixed step left in the accumulator, in `[0, 1)`.
    pub interpolant: f64,
    /// The most recent requests returned by the application.
    pub requests: UpdateRequests,
}

impl Default for UpdateLoopStatus {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            cumulative_time: Duration::ZERO,
            update_time_step: DEFAULT_UPDATE_TIME_STEP,
            minimum_update_time_step: DEFAULT_MINIMUM_UPDATE_TIME_STEP,
            interpolant: 0.0,
            requests: UpdateRequests::default(),
        }
    }
}

/// Wall-clock bookkeeping between iterations.
#[derive(Debug, Clone, Copy)]
pub struct LoopClock {
    previous: Instant,
    accumulator: Duration,
}

impl LoopClock {
    /// The accumulator starts one `initial_step` full, so the first
    /// iteration runs a fixed step before the first frame update.
    pub fn new(start: Instant, initial_step: Duration) -> Self {
        Self {
            previous: start,
            accumulator: initial_step,
        }
    }

    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }
}

/// An application driven by [`run_update_loop`].
///
/// # Lifecycle
///
/// 1. `initialize` - once, returns the initial loop status
/// 2. `on_window_event` / `on_resize` - for each pending window event
/// 3. `fixed_step_update` - zero or more times per iteration
/// 4. `frame_update` - once per iteration, usually renders
/// 5. `clean_up` - once, after the loop ends
pub trait Updatable {
    fn initialize(&mut self) -> VlkResult<UpdateLoopStatus>;

    fn fixed_step_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests>;

    fn frame_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests>;

    /// Called with the new framebuffer size after the window was resized.
    fn on_resize(&mut self, _size: IVec2) -> VlkResult<()> {
        Ok(())
    }

    /// Called for each event the window received, before `on_resize`.
    fn on_window_event(&mut self, _event: &WindowEvent) {}

    fn clean_up(&mut self) -> VlkResult<()> {
        Ok(())
    }

    /// The window whose events drive the loop. `None` for headless apps.
    fn window(&mut self) -> Option<&mut Window> {
        None
    }
}

/// `elapsed` scaled by `time_scale`. Negative and NaN scales stop time; a
/// product that no `Duration` can hold yields `fallback`.
fn scaled_frame_time(elapsed: Duration, time_scale: f64, fallback: Duration) -> Duration {
    let scale = time_scale.max(0.0);
    Duration::try_from_secs_f64(elapsed.as_secs_f64() * scale).unwrap_or(fallback)
}

/// Advance the loop by one iteration ending at `now`.
pub fn single_loop_iteration<A: Updatable + ?Sized>(
    app: &mut A,
    status: &mut UpdateLoopStatus,
    clock: &mut LoopClock,
    now: Instant,
) -> VlkResult<()> {
    if status.update_time_step.is_zero() {
        return Err(VlkError::InvalidParameter(
            "update_time_step must be greater than zero".to_string(),
        ));
    }

    let elapsed = now.saturating_duration_since(clock.previous);
    clock.previous = now;
    let frame_time = scaled_frame_time(
        elapsed.min(status.minimum_update_time_step),
        status.time_scale,
        status.update_time_step,
    );

    if !status.requests.pause_updates {
        clock.accumulator += frame_time;
        while clock.accumulator >= status.update_time_step {
            status.cumulative_time += status.update_time_step;
            clock.accumulator -= status.update_time_step;
            status.requests = app.fixed_step_update(status)?;
        }
        status.interpolant =
            clock.accumulator.as_secs_f64() / status.update_time_step.as_secs_f64();
    }

    status.requests = app.frame_update(status)?;
    if !status.requests.update_time_step.is_zero() {
        status.update_time_step = status.requests.update_time_step;
    }
    Ok(())
}

/// Run `app` until it requests an exit or its window is closed.
/// `clean_up` runs even when an update fails.
pub fn run_update_loop<A: Updatable + ?Sized>(app: &mut A) -> VlkResult<()> {
    let mut status = app.initialize()?;
    let mut clock = LoopClock::new(Instant::now(), status.update_time_step);

    let result = loop_until_exit(app, &mut status, &mut clock);
    let clean_up = app.clean_up();
    result.and(clean_up)
}

fn loop_until_exit<A: Updatable + ?Sized>(
    app: &mut A,
    status: &mut UpdateLoopStatus,
    clock: &mut LoopClock,
) -> VlkResult<()> {
    while !status.requests.exit_update_loop {
        let mut resized = None;
        let mut should_close = false;
        let mut events = Vec::new();
        if let Some(window) = app.window() {
            events = window.poll_events();
            resized = window.resized();
            should_close = window.should_close();
        }

        for event in &events {
            app.on_window_event(event);
        }
        if should_close {
            log::debug!("Window close requested");
            break;
        }
        if let Some(size) = resized {
            app.on_resize(size)?;
        }

        single_loop_iteration(app, status, clock, Instant::now())?;

        if let Some(window) = app.window() {
            window.reset_callback_data();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts calls and requests exit after a number of fixed steps.
    #[derive(Default)]
    struct Counter {
        fixed_steps: u32,
        frames: u32,
        exit_after: Option<u32>,
        pause: bool,
        last_interpolant: f64,
    }

    impl Updatable for Counter {
        fn initialize(&mut self) -> VlkResult<UpdateLoopStatus> {
            Ok(UpdateLoopStatus::default())
        }

        fn fixed_step_update(&mut self, _status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
            self.fixed_steps += 1;
            let exit = self.exit_after.is_some_and(|n| self.fixed_steps >= n);
            Ok(UpdateRequests {
                exit_update_loop: exit,
                ..Default::default()
            })
        }

        fn frame_update(&mut self, status: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
            self.frames += 1;
            self.last_interpolant = status.interpolant;
            Ok(UpdateRequests {
                pause_updates: self.pause,
                ..status.requests
            })
        }
    }

    fn step() -> Duration {
        Duration::from_millis(10)
    }

    fn status_with_step() -> UpdateLoopStatus {
        UpdateLoopStatus {
            update_time_step: step(),
            requests: UpdateRequests {
                update_time_step: step(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_accumulates_fixed_steps() {
        let mut app = Counter::default();
        let mut status = status_with_step();
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);

        single_loop_iteration(&mut app, &mut status, &mut clock, start + Duration::from_millis(25))
            .unwrap();

        // One seeded step plus two from the elapsed 25 ms.
        assert_eq!(app.fixed_steps, 3);
        assert_eq!(app.frames, 1);
        assert_eq!(status.cumulative_time, Duration::from_millis(30));
        assert_eq!(clock.accumulator(), Duration::from_millis(5));
        assert!((app.last_interpolant - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_frame_time_is_clamped() {
        let mut app = Counter::default();
        let mut status = status_with_step();
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);

        // Five seconds of wall time only advance by the 100 ms cap.
        single_loop_iteration(&mut app, &mut status, &mut clock, start + Duration::from_secs(5))
            .unwrap();

        assert_eq!(app.fixed_steps, 11);
        assert_eq!(status.cumulative_time, Duration::from_millis(110));
    }

    #[test]
    fn test_time_scale() {
        let mut app = Counter::default();
        let mut status = UpdateLoopStatus {
            time_scale: 0.5,
            ..status_with_step()
        };
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);

        single_loop_iteration(&mut app, &mut status, &mut clock, start + Duration::from_millis(40))
            .unwrap();

        assert_eq!(app.fixed_steps, 3);
    }

    #[test]
    fn test_pause_skips_fixed_steps() {
        let mut app = Counter {
            pause: true,
            ..Default::default()
        };
        let mut status = status_with_step();
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);

        // First iteration runs fixed steps and then requests a pause.
        single_loop_iteration(&mut app, &mut status, &mut clock, start + Duration::from_millis(10))
            .unwrap();
        assert_eq!(app.fixed_steps, 2);
        assert!(status.requests.pause_updates);

        single_loop_iteration(&mut app, &mut status, &mut clock, start + Duration::from_millis(50))
            .unwrap();
        assert_eq!(app.fixed_steps, 2);
        assert_eq!(app.frames, 2);
        assert_eq!(clock.accumulator(), Duration::ZERO);
    }

    #[test]
    fn test_requested_time_step_applies_to_next_iteration() {
        struct Slow;
        impl Updatable for Slow {
            fn initialize(&mut self) -> VlkResult<UpdateLoopStatus> {
                Ok(UpdateLoopStatus::default())
            }
            fn fixed_step_update(&mut self, s: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
                Ok(s.requests)
            }
            fn frame_update(&mut self, _s: &UpdateLoopStatus) -> VlkResult<UpdateRequests> {
                Ok(UpdateRequests {
                    update_time_step: Duration::from_millis(50),
                    ..Default::default()
                })
            }
        }

        let mut status = UpdateLoopStatus::default();
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);
        single_loop_iteration(&mut Slow, &mut status, &mut clock, start).unwrap();
        assert_eq!(status.update_time_step, Duration::from_millis(50));
    }

    #[test]
    fn test_zero_time_step_is_rejected() {
        let mut app = Counter::default();
        let mut status = UpdateLoopStatus {
            update_time_step: Duration::ZERO,
            ..Default::default()
        };
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);
        assert!(single_loop_iteration(&mut app, &mut status, &mut clock, start).is_err());
    }

    #[test]
    fn test_first_iteration_runs_one_fixed_step() {
        let mut app = Counter::default();
        let mut status = UpdateLoopStatus::default();
        let start = Instant::now();
        let mut clock = LoopClock::new(start, status.update_time_step);

        single_loop_iteration(&mut app, &mut status, &mut clock, start).unwrap();

        assert_eq!(app.fixed_steps, 1);
        assert_eq!(app.frames, 1);
        assert_eq!(status.cumulative_time, DEFAULT_UPDATE_TIME_STEP);
        assert_eq!(clock.accumulator(), Duration::ZERO);
    }

    #[test]
    fn test_infinite_time_scale_falls_back_to_one_step() {
        let mut app = Counter::default();
        let mut status = UpdateLoopStatus {
            time_scale: f64::INFINITY,
            ..status_with_step()
        };
        let start = Instant::now();
        let mut clock = LoopClock::new(start, Duration::ZERO);

        single_loop_iteration(&mut app, &mut status, &mut clock, start + Duration::from_millis(20))
            .unwrap();

        assert_eq!(app.fixed_steps, 1);
    }

    #[test]
    fn test_scaled_frame_time() {
        let fallback = Duration::from_millis(10);
        let elapsed = Duration::from_millis(40);
        assert_eq!(scaled_frame_time(elapsed, 0.5, fallback), Duration::from_millis(20));
        assert_eq!(scaled_frame_time(elapsed, -2.0, fallback), Duration::ZERO);
        assert_eq!(scaled_frame_time(elapsed, f64::NAN, fallback), Duration::ZERO);
        assert_eq!(scaled_frame_time(elapsed, f64::INFINITY, fallback), fallback);
        assert_eq!(scaled_frame_time(elapsed, f64::MAX, fallback), fallback);
    }

    #[test]
    fn test_run_until_exit_requested() {
        let mut app = Counter {
            exit_after: Some(1),
            ..Default::default()
        };
        run_update_loop(&mut app).unwrap();
        assert!(app.fixed_steps >= 1);
        assert!(app.frames >= 1);
    }

    #[test]
    fn test_defaults() {
        let status = UpdateLoopStatus::default();
        assert_eq!(status.time_scale, 1.0);
        assert_eq!(status.minimum_update_time_step, Duration::from_millis(100));
        assert_eq!(status.update_time_step, DEFAULT_UPDATE_TIME_STEP);
        assert!(!status.requests.pause_updates);
        assert!(!status.requests.exit_update_loop);
    }
}

//! One playback session: decode from an offset, convert, and play until the
//! stream drains or the session is cancelled.
//!
//! Seeking and rate changes end the running session and start a new one at
//! the new position; a session never changes its start offset or speed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;

use crate::config::PlaybackConfig;
use crate::output::{self, OutputControls, VolumeControl};
use crate::queue::SampleQueue;
use crate::{decode, device, resample};

/// How a session ended.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// Every decoded sample reached the device.
    Finished,
    Cancelled,
    Failed(String),
}

/// What to play and from where.
#[derive(Clone, Debug)]
pub struct SessionRequest {
    pub source: String,
    pub mime: Option<String>,
    pub start_secs: f64,
    pub speed: f64,
    pub paused: bool,
}

/// Media-time clock for a session.
///
/// Position is `start + device_frames / device_rate * speed`; device frames
/// advance only while real audio is written.
#[derive(Debug)]
pub struct SessionClock {
    start_secs: f64,
    speed: f64,
    played_frames: Arc<AtomicU64>,
    device_rate: AtomicU32,
}

impl SessionClock {
    pub fn new(start_secs: f64, speed: f64) -> Self {
        Self {
            start_secs,
            speed,
            played_frames: Arc::new(AtomicU64::new(0)),
            device_rate: AtomicU32::new(0),
        }
    }

    /// Current media position in seconds.
    pub fn position(&self) -> f64 {
        let rate = self.device_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return self.start_secs;
        }
        let frames = self.played_frames.load(Ordering::Relaxed);
        self.start_secs + frames as f64 / rate as f64 * self.speed
    }

    fn set_device_rate(&self, rate: u32) {
        self.device_rate.store(rate, Ordering::Relaxed);
    }
}

/// Handle to a running session thread.
pub struct Session {
    pub id: u64,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    clock: Arc<SessionClock>,
    join: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session thread; `on_exit` runs on that thread when it ends.
    pub fn spawn<F>(
        id: u64,
        req: SessionRequest,
        cfg: PlaybackConfig,
        volume: Arc<VolumeControl>,
        on_exit: F,
    ) -> Session
    where
        F: FnOnce(u64, SessionOutcome) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(req.paused));
        let clock = Arc::new(SessionClock::new(req.start_secs, req.speed));

        let cancel_thread = cancel.clone();
        let paused_thread = paused.clone();
        let clock_thread = clock.clone();
        let join = thread::Builder::new()
            .name(format!("playback-session-{id}"))
            .spawn(move || {
                let result = run(
                    &req,
                    &cfg,
                    &volume,
                    &cancel_thread,
                    &paused_thread,
                    &clock_thread,
                );
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(session = id, "playback failed: {e:#}");
                        SessionOutcome::Failed(format!("{e:#}"))
                    }
                };
                tracing::debug!(session = id, ?outcome, "session ended");
                on_exit(id, outcome);
            });

        let join = match join {
            Ok(j) => Some(j),
            Err(e) => {
                tracing::error!(session = id, "spawn session thread: {e}");
                None
            }
        };

        Session {
            id,
            cancel,
            paused,
            clock,
            join,
        }
    }

    pub fn position(&self) -> f64 {
        self.clock.position()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    /// Cancel and wait for the thread to exit.
    pub fn stop(mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    /// Cancel without waiting; the thread is reaped in the background.
    pub fn stop_detached(mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            thread::spawn(move || {
                let _ = join.join();
            });
        }
    }
}

fn run(
    req: &SessionRequest,
    cfg: &PlaybackConfig,
    volume: &Arc<VolumeControl>,
    cancel: &Arc<AtomicBool>,
    paused: &Arc<AtomicBool>,
    clock: &SessionClock,
) -> Result<SessionOutcome> {
    let decoded = decode::start_decode(
        &req.source,
        req.mime.as_deref(),
        cfg.buffer_seconds,
        req.start_secs,
        Some(cancel.clone()),
    )
    .context("open episode audio")?;
    let srcq = decoded.queue.clone();
    let mut queues = CloseOnDrop(vec![srcq.clone()]);
    if cancel.load(Ordering::Relaxed) {
        return Ok(SessionOutcome::Cancelled);
    }
    if decoded.past_end {
        return Ok(SessionOutcome::Finished);
    }

    let host = cpal::default_host();
    let device = device::pick_device(&host, cfg.device.as_deref())?;
    let supported = device::pick_output_config(&device, Some(decoded.spec.rate))?;
    let mut stream_config: cpal::StreamConfig = supported.clone().into();
    if let Some(size) = device::pick_buffer_size(&supported) {
        stream_config.buffer_size = size;
    }
    let dst_rate = stream_config.sample_rate;
    let channels = decoded.spec.channels.count();

    let ratio = resample::ratio_for(decoded.spec.rate, dst_rate, req.speed)?;
    let dstq = if resample::is_passthrough(ratio) {
        srcq.clone()
    } else {
        resample::start_resampler(
            srcq.clone(),
            channels,
            dst_rate,
            ratio,
            resample::ResampleConfig {
                chunk_frames: cfg.chunk_frames,
                buffer_seconds: cfg.buffer_seconds,
            },
        )?
    };
    queues.0.push(dstq.clone());
    let device_name = device::device_name(&device).unwrap_or_default();
    tracing::info!(
        device = %device_name,
        src_hz = decoded.spec.rate,
        dst_hz = dst_rate,
        speed = req.speed,
        start_secs = req.start_secs,
        codec = decoded.info.codec.as_deref().unwrap_or("?"),
        "session started"
    );

    let failed = Arc::new(AtomicBool::new(false));
    let stream = output::build_output_stream(
        &device,
        &stream_config,
        supported.sample_format(),
        &dstq,
        OutputControls {
            refill_max_frames: cfg.refill_max_frames,
            paused: paused.clone(),
            played_frames: clock.played_frames.clone(),
            volume: volume.clone(),
            failed: failed.clone(),
            cancel: cancel.clone(),
        },
    )?;
    clock.set_device_rate(dst_rate);
    stream.play()?;

    let drained = dstq.wait_drained(cancel);
    if !drained {
        paused.store(true, Ordering::Relaxed);
        if failed.load(Ordering::Relaxed) {
            return Ok(SessionOutcome::Failed("audio output stream failed".to_string()));
        }
        return Ok(SessionOutcome::Cancelled);
    }

    // Let the device play out its last buffer before the stream is dropped.
    thread::sleep(Duration::from_millis(100));

    let decode_error = decoded.error.lock().ok().and_then(|slot| slot.clone());
    Ok(match decode_error {
        Some(msg) => SessionOutcome::Failed(msg),
        None => SessionOutcome::Finished,
    })
}

/// Closes every queue when the session returns, so stage threads blocked on
/// a full queue exit on every path.
struct CloseOnDrop(Vec<Arc<SampleQueue>>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        for q in &self.0 {
            q.close();
        }
    }
}

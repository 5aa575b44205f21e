//! Audio output using cpal
//!
//! [`CpalSink`] implements [`Sink`] on a real output device.
//!
//! **Threads:**
//! - The player queue schedules chunks into a lock-free ring (`ringbuf`).
//! - The cpal render callback pulls chunks from that ring, renders them
//!   frame by frame and pushes each fully rendered chunk onto a second ring.
//! - A control thread owns the cpal `Stream` (which cannot move between
//!   threads), drains the rendered ring to fire completions, rebuilds the
//!   stream on reconnect, and recovers from stream errors.
//!
//! The render callback never blocks or allocates: it only `try_lock`s its state
//! (outputting silence if that fails) and renders through a preallocated buffer.

use crate::audio::format::AudioFormat;
use crate::audio::resampler::StreamResampler;
use crate::error::{Error, Result};
use crate::playback::chunk::Chunk;
use crate::playback::sink::{ChunkCompletion, Sink};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::RuntimeFlavor;
use tracing::{debug, error, info, warn};

/// How often the control thread drains completions
const CONTROL_POLL: Duration = Duration::from_millis(5);

/// Minimum spacing between stream recovery attempts
const RECOVERY_BACKOFF: Duration = Duration::from_millis(500);

/// Consecutive stream errors before falling back to the default device
const FALLBACK_AFTER_ERRORS: u32 = 3;

/// Callback scratch size when the host picks the buffer size
const DEFAULT_CALLBACK_FRAMES: usize = 8192;

/// A chunk queued for rendering, converted to the device rate if needed
struct QueuedChunk {
    chunk: Arc<Chunk>,
    resampled: Option<Vec<f32>>,
    completion: ChunkCompletion,
}

impl QueuedChunk {
    fn samples(&self) -> &[f32] {
        match &self.resampled {
            Some(samples) => samples,
            None => self.chunk.samples(),
        }
    }
}

/// Render-side state, shared with the cpal callback
struct RenderState {
    queue: HeapCons<QueuedChunk>,
    rendered: HeapProd<QueuedChunk>,
    current: Option<QueuedChunk>,
    position: usize,
    stream_channels: usize,
    device_channels: usize,
    underrun_frames: u64,
}

impl RenderState {
    /// New render state plus the scheduling producer and rendered consumer
    fn session(
        capacity: usize,
        stream_channels: usize,
        device_channels: usize,
    ) -> (Self, HeapProd<QueuedChunk>, HeapCons<QueuedChunk>) {
        let (queue_prod, queue_cons) = HeapRb::<QueuedChunk>::new(capacity).split();
        let (rendered_prod, rendered_cons) = HeapRb::<QueuedChunk>::new(capacity).split();

        let state = Self {
            queue: queue_cons,
            rendered: rendered_prod,
            current: None,
            position: 0,
            stream_channels: stream_channels.max(1),
            device_channels: device_channels.max(1),
            underrun_frames: 0,
        };
        (state, queue_prod, rendered_cons)
    }

    /// Fill `out` (interleaved, device channel layout)
    fn render(&mut self, out: &mut [f32], playing: bool, volume: f32) {
        for frame in out.chunks_mut(self.device_channels) {
            if !playing {
                frame.fill(0.0);
                continue;
            }
            match self.next_frame() {
                Some([left, right]) => {
                    if frame.len() == 1 {
                        frame[0] = ((left + right) * 0.5 * volume).clamp(-1.0, 1.0);
                    } else {
                        frame[0] = (left * volume).clamp(-1.0, 1.0);
                        frame[1] = (right * volume).clamp(-1.0, 1.0);
                        frame[2..].fill(0.0);
                    }
                }
                None => {
                    self.underrun_frames += 1;
                    frame.fill(0.0);
                }
            }
        }
    }

    /// Next source frame as `[left, right]` (mono is duplicated)
    fn next_frame(&mut self) -> Option<[f32; 2]> {
        let channels = self.stream_channels;
        loop {
            if self.current.is_none() {
                self.current = Some(self.queue.try_pop()?);
                self.position = 0;
            }

            let position = self.position;
            let frame = self.current.as_ref().and_then(|queued| {
                queued
                    .samples()
                    .get(position..position + channels)
                    .map(|s| [s[0], s[channels - 1]])
            });

            match frame {
                Some(frame) => {
                    self.position += channels;
                    let exhausted = self
                        .current
                        .as_ref()
                        .map_or(true, |queued| self.position >= queued.samples().len());
                    if exhausted {
                        self.finish_current();
                    }
                    return Some(frame);
                }
                // Empty chunk or a trailing partial frame
                None => self.finish_current(),
            }
        }
    }

    fn finish_current(&mut self) {
        if let Some(queued) = self.current.take() {
            // Capacity matches the scheduling ring, so this only fails if the
            // control thread is gone
            let _ = self.rendered.try_push(queued);
        }
    }
}

/// Values the render callback reads without locking
struct RenderControls {
    playing: AtomicBool,
    volume_bits: AtomicU32,
    device_rate: AtomicU32,
    /// Set by the stream error callback
    error_flag: AtomicBool,
}

impl RenderControls {
    fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            device_rate: AtomicU32::new(0),
            error_flag: AtomicBool::new(false),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

/// Device and stream parameters chosen at attach
#[derive(Clone)]
struct OutputTarget {
    device_name: Option<String>,
    format: AudioFormat,
    config: StreamConfig,
    sample_format: SampleFormat,
}

enum ControlMsg {
    Reconnect(mpsc::Sender<Result<()>>),
    Shutdown,
}

struct ControlThread {
    tx: mpsc::Sender<ControlMsg>,
    join: Option<JoinHandle<()>>,
}

/// [`Sink`] on a cpal output device
pub struct CpalSink {
    device_name: Option<String>,
    buffer_frames: Option<u32>,
    ring_capacity: usize,
    target: Option<OutputTarget>,
    render: Option<Arc<Mutex<RenderState>>>,
    queue: Option<HeapProd<QueuedChunk>>,
    rendered: Option<HeapCons<QueuedChunk>>,
    controls: Arc<RenderControls>,
    control: Option<ControlThread>,
    /// Device-rate conversion, continuous across the chunks of a session
    resampler: Option<StreamResampler>,
    speed: f32,
    pitch_cents: f32,
}

impl CpalSink {
    /// `ring_capacity` bounds how many chunks may be scheduled ahead.
    pub fn new(device_name: Option<String>, buffer_frames: Option<u32>, ring_capacity: usize) -> Self {
        Self {
            device_name,
            buffer_frames,
            ring_capacity: ring_capacity.max(1),
            target: None,
            render: None,
            queue: None,
            rendered: None,
            controls: Arc::new(RenderControls::new()),
            control: None,
            resampler: None,
            speed: 1.0,
            pitch_cents: 0.0,
        }
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::SinkFailure(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Fresh rings and render state; anything scheduled before is dropped
    /// without completing.
    fn new_session(&mut self) {
        self.resampler = None;
        let Some(target) = &self.target else {
            return;
        };
        let (state, queue, rendered) = RenderState::session(
            self.ring_capacity,
            target.format.channels as usize,
            target.config.channels as usize,
        );
        self.render = Some(Arc::new(Mutex::new(state)));
        self.queue = Some(queue);
        self.rendered = Some(rendered);
    }

    /// Resampler to `device_rate`, rebuilt when the device rate changed
    fn resampler_for(&mut self, format: AudioFormat, device_rate: u32) -> Result<&mut StreamResampler> {
        let current = self
            .resampler
            .as_ref()
            .map_or(false, |r| r.input_rate() == format.sample_rate && r.output_rate() == device_rate);
        if !current {
            let resampler = StreamResampler::new(
                format.sample_rate,
                device_rate,
                format.channels,
                format.frames_per_chunk(),
            )
            .map_err(|e| Error::SinkFailure(format!("Resampler setup failed: {}", e)))?;
            self.resampler = Some(resampler);
        }
        self.resampler
            .as_mut()
            .ok_or_else(|| Error::SinkFailure("resampler unavailable".to_string()))
    }

    fn shutdown_control(&mut self) {
        if let Some(mut control) = self.control.take() {
            let _ = control.tx.send(ControlMsg::Shutdown);
            if let Some(join) = control.join.take() {
                if join.join().is_err() {
                    error!("Audio control thread panicked");
                }
            }
        }
    }
}

impl Sink for CpalSink {
    fn attach(&mut self, format: AudioFormat) -> Result<()> {
        let host = cpal::default_host();
        let device = find_device(&host, self.device_name.as_deref())?;
        let (mut config, sample_format) = choose_config(&device, format)?;

        if let Some(frames) = self.buffer_frames {
            config.buffer_size = cpal::BufferSize::Fixed(frames);
            debug!("Using requested buffer size: {} frames", frames);
        }
        if config.sample_rate.0 != format.sample_rate {
            warn!(
                "Device does not support {}Hz, resampling chunks to {}Hz",
                format.sample_rate, config.sample_rate.0
            );
        }

        info!(
            "Output attached: stream={}, device config: rate={}, channels={}, format={:?}",
            format, config.sample_rate.0, config.channels, sample_format
        );
        self.controls
            .device_rate
            .store(config.sample_rate.0, Ordering::SeqCst);
        self.target = Some(OutputTarget {
            device_name: self.device_name.clone(),
            format,
            config,
            sample_format,
        });
        self.new_session();
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.control.is_some() {
            return Ok(());
        }
        let target = self
            .target
            .clone()
            .ok_or_else(|| Error::SinkFailure("start before attach".to_string()))?;
        let render = self
            .render
            .clone()
            .ok_or_else(|| Error::SinkFailure("start before attach".to_string()))?;
        let rendered = self
            .rendered
            .take()
            .ok_or_else(|| Error::SinkFailure("render session already consumed".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let controls = Arc::clone(&self.controls);

        let join = std::thread::Builder::new()
            .name("streamplay-output".to_string())
            .spawn(move || run_control(target, render, controls, rendered, rx, ready_tx))
            .map_err(|e| Error::SinkFailure(format!("Failed to spawn output thread: {}", e)))?;

        let control = ControlThread {
            tx,
            join: Some(join),
        };

        match wait_blocking(|| ready_rx.recv()) {
            Ok(Ok(())) => {
                self.control = Some(control);
                info!("Audio stream started successfully");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = control.join.map(|join| join.join());
                self.new_session();
                Err(e)
            }
            Err(_) => {
                let _ = control.join.map(|join| join.join());
                self.new_session();
                Err(Error::SinkFailure("output thread exited during startup".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        info!("Stopping audio stream");
        self.controls.playing.store(false, Ordering::SeqCst);
        self.shutdown_control();
        if let Some(render) = &self.render {
            if let Ok(state) = render.lock() {
                debug!("Render session ended, {} underrun frames", state.underrun_frames);
            }
        }
        self.new_session();
    }

    fn schedule_chunk(&mut self, chunk: Arc<Chunk>, completion: ChunkCompletion) -> Result<()> {
        let format = self
            .target
            .as_ref()
            .map(|target| target.format)
            .ok_or_else(|| Error::SinkFailure("schedule before attach".to_string()))?;

        let device_rate = self.controls.device_rate.load(Ordering::SeqCst);
        let resampled = if device_rate != 0 && device_rate != format.sample_rate {
            let resampler = self.resampler_for(format, device_rate)?;
            Some(
                resampler
                    .process(chunk.samples())
                    .map_err(|e| Error::SinkFailure(format!("Resampling chunk failed: {}", e)))?,
            )
        } else {
            None
        };

        let queue = self
            .queue
            .as_mut()
            .ok_or_else(|| Error::SinkFailure("schedule before attach".to_string()))?;
        queue
            .try_push(QueuedChunk {
                chunk,
                resampled,
                completion,
            })
            .map_err(|_| Error::SinkFailure("render queue full".to_string()))
    }

    fn play(&mut self) -> Result<()> {
        if self.control.is_none() {
            return Err(Error::SinkFailure("play before start".to_string()));
        }
        self.controls.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.controls.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.controls.playing.load(Ordering::SeqCst)
    }

    fn reconnect(&mut self) -> Result<()> {
        let Some(control) = &self.control else {
            debug!("Reconnect with no running stream");
            return Ok(());
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        control
            .tx
            .send(ControlMsg::Reconnect(reply_tx))
            .map_err(|_| Error::SinkFailure("output thread gone".to_string()))?;
        wait_blocking(|| reply_rx.recv())
            .map_err(|_| Error::SinkFailure("output thread gone".to_string()))?
    }

    fn set_volume(&mut self, volume: f32) {
        self.controls
            .volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
        debug!("Speed {:.2} recorded; device output renders at native rate", self.speed);
    }

    fn set_pitch(&mut self, pitch_cents: f32) {
        self.pitch_cents = pitch_cents;
        debug!(
            "Pitch {:.0} cents recorded; device output is not pitch shifted",
            self.pitch_cents
        );
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.shutdown_control();
    }
}

/// Run a blocking wait for the control thread.
///
/// On a multi-thread tokio runtime the worker hands its other tasks off first;
/// elsewhere the wait simply blocks.
fn wait_blocking<T>(wait: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(wait)
        }
        _ => wait(),
    }
}

/// Control thread body: owns the stream for its whole life.
fn run_control(
    mut target: OutputTarget,
    render: Arc<Mutex<RenderState>>,
    controls: Arc<RenderControls>,
    mut rendered: HeapCons<QueuedChunk>,
    rx: mpsc::Receiver<ControlMsg>,
    ready: mpsc::Sender<Result<()>>,
) {
    let mut stream = match open_stream(&mut target, &render, &controls) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            Some(stream)
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut error_count: u32 = 0;
    let mut next_recovery: Option<Instant> = None;

    loop {
        match rx.recv_timeout(CONTROL_POLL) {
            Ok(ControlMsg::Reconnect(reply)) => {
                info!("Rebuilding audio stream after route change");
                drop(stream.take());
                match open_stream(&mut target, &render, &controls) {
                    Ok(rebuilt) => {
                        stream = Some(rebuilt);
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        error!("Audio stream rebuild failed: {}", e);
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Ok(ControlMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        while let Some(queued) = rendered.try_pop() {
            queued.completion.complete();
        }

        if controls.error_flag.swap(false, Ordering::SeqCst) {
            error_count += 1;
            warn!("Audio stream error (count {}), scheduling recovery", error_count);
            drop(stream.take());
            next_recovery = Some(Instant::now());
        }

        if let Some(at) = next_recovery {
            if Instant::now() >= at {
                if error_count > FALLBACK_AFTER_ERRORS && target.device_name.is_some() {
                    warn!("Multiple errors detected, falling back to default device");
                    target.device_name = None;
                }
                match open_stream(&mut target, &render, &controls) {
                    Ok(rebuilt) => {
                        info!("Audio stream recovery successful");
                        stream = Some(rebuilt);
                        error_count = 0;
                        next_recovery = None;
                    }
                    Err(e) => {
                        error!("Audio stream recovery failed: {}", e);
                        error_count += 1;
                        next_recovery = Some(Instant::now() + RECOVERY_BACKOFF);
                    }
                }
            }
        }
    }

    if let Some(stream) = stream.take() {
        if let Err(e) = stream.pause() {
            warn!("Failed to pause stream on shutdown: {}", e);
        }
    }
    debug!("Audio control thread exiting");
}

/// Open the target device and start a stream rendering from `render`.
///
/// Falls back to the device's best config for the stream format if the
/// remembered config is rejected (e.g. a different device after a route
/// change).
fn open_stream(
    target: &mut OutputTarget,
    render: &Arc<Mutex<RenderState>>,
    controls: &Arc<RenderControls>,
) -> Result<Stream> {
    let host = cpal::default_host();
    let device = find_device(&host, target.device_name.as_deref())?;

    let stream = match build_stream_for(&device, target, render, controls) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Stored stream config rejected ({}), renegotiating", e);
            let (mut config, sample_format) = choose_config(&device, target.format)?;
            config.buffer_size = target.config.buffer_size.clone();
            target.config = config;
            target.sample_format = sample_format;
            build_stream_for(&device, target, render, controls)?
        }
    };

    controls
        .device_rate
        .store(target.config.sample_rate.0, Ordering::SeqCst);
    match render.lock() {
        Ok(mut state) => state.device_channels = target.config.channels.max(1) as usize,
        Err(poisoned) => poisoned.into_inner().device_channels = target.config.channels.max(1) as usize,
    }

    stream
        .play()
        .map_err(|e| Error::SinkFailure(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

fn build_stream_for(
    device: &Device,
    target: &OutputTarget,
    render: &Arc<Mutex<RenderState>>,
    controls: &Arc<RenderControls>,
) -> Result<Stream> {
    let config = &target.config;
    let render = Arc::clone(render);
    let controls = Arc::clone(controls);
    match target.sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, config, render, controls),
        SampleFormat::I16 => build_stream::<i16>(device, config, render, controls),
        SampleFormat::U16 => build_stream::<u16>(device, config, render, controls),
        sample_format => Err(Error::SinkFailure(format!(
            "Unsupported sample format: {:?}",
            sample_format
        ))),
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    render: Arc<Mutex<RenderState>>,
    controls: Arc<RenderControls>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let error_controls = Arc::clone(&controls);
    let channels = config.channels.max(1) as usize;
    let frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames as usize,
        cpal::BufferSize::Default => DEFAULT_CALLBACK_FRAMES,
    };
    // Whole frames only; larger callbacks are rendered in slices of this
    let mut scratch = vec![0.0f32; frames.max(1) * channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| match render.try_lock() {
                Ok(mut state) => render_into(
                    &mut state,
                    data,
                    &mut scratch,
                    controls.playing.load(Ordering::Relaxed),
                    controls.volume(),
                ),
                Err(_) => {
                    for dst in data.iter_mut() {
                        *dst = T::from_sample(0.0f32);
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {} - marking for recovery", err);
                error_controls.error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::SinkFailure(format!("Failed to build stream: {}", e)))
}

/// Render into a device buffer through a preallocated f32 `scratch` holding
/// whole frames. Buffers larger than `scratch` are filled slice by slice.
fn render_into<T>(
    state: &mut RenderState,
    data: &mut [T],
    scratch: &mut [f32],
    playing: bool,
    volume: f32,
) where
    T: SizedSample + FromSample<f32>,
{
    for block in data.chunks_mut(scratch.len().max(1)) {
        let out = &mut scratch[..block.len()];
        state.render(out, playing, volume);
        for (dst, src) in block.iter_mut().zip(out.iter()) {
            *dst = T::from_sample(*src);
        }
    }
}

/// Requested device by name, falling back to the default device
fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::SinkFailure(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            debug!("Found requested audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::SinkFailure("No default output device found".to_string()))?;
    debug!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Best device config for `format`: its exact rate with enough channels,
/// preferring f32 and an exact channel match; otherwise the device default.
fn choose_config(device: &Device, format: AudioFormat) -> Result<(StreamConfig, SampleFormat)> {
    let rate = cpal::SampleRate(format.sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::SinkFailure(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported
        .filter(|c| {
            c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
                && c.channels() >= format.channels
                && matches!(
                    c.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                )
        })
        .min_by_key(|c| {
            (
                c.sample_format() != SampleFormat::F32,
                c.channels() != format.channels,
                c.channels(),
            )
        });

    if let Some(range) = preferred {
        let sample_format = range.sample_format();
        return Ok((range.with_sample_rate(rate).config(), sample_format));
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::SinkFailure(format!("Failed to get default config: {}", e)))?;
    let sample_format = fallback.sample_format();
    Ok((fallback.config(), sample_format))
}

//! Output device seam used by the playback scheduler.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread. It never blocks or
//! logs: it reads the current voice through `try_lock` (writing silence when
//! the lock is contended) and reports end-of-buffer through a
//! `CompletionSender`. Completion callbacks and any logging run on the
//! worker thread that owns the stream, never on the audio thread.
//!
//! [`OutputDevice::resume`] on `CpalOutput` waits for the worker thread (up
//! to two seconds). Async callers run it on the blocking pool.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::Sender;

use super::SampleBuffer;
use crate::error::{LinguaError, Result};

/// Identity of one `play` request.
///
/// Issued by the scheduler from a generation counter, so replaying the same
/// turn twice yields two distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Invoked once when a voice reaches the end of its buffer.
///
/// Not invoked for voices ended by [`OutputDevice::stop`] or replaced by a
/// later `start`.
pub type PlaybackDone = Box<dyn FnOnce(PlaybackId) + Send + 'static>;

/// An audio sink that can play one buffer at a time.
pub trait OutputDevice: Send + Sync + 'static {
    /// Make sure the device is active (resume a suspended stream).
    ///
    /// # Errors
    /// `LinguaError::PlaybackUnavailable` if there is no device or it cannot
    /// be activated.
    fn resume(&self) -> Result<()>;

    /// Begin asynchronous playback of `buffer`, replacing any current voice.
    fn start(&self, id: PlaybackId, buffer: Arc<SampleBuffer>, done: PlaybackDone) -> Result<()>;

    /// Silence the voice `id` if it is still the current one.
    fn stop(&self, id: PlaybackId);
}

/// End-of-buffer notices from the audio callback to the worker thread.
///
/// `notify` is wait-free. When the channel is full the id is parked in a
/// single overflow slot instead, which the worker drains with
/// [`take_overflow`](Self::take_overflow). Only the latest parked id is kept;
/// at most one voice sounds at a time.
#[derive(Clone)]
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
pub(crate) struct CompletionSender {
    tx: Sender<PlaybackId>,
    overflow: Arc<AtomicU64>,
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
impl CompletionSender {
    pub(crate) fn new(tx: Sender<PlaybackId>) -> Self {
        Self {
            tx,
            overflow: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn notify(&self, id: PlaybackId) {
        if self.tx.try_send(id).is_err() {
            self.overflow.store(id.0, Ordering::Release);
        }
    }

    /// Take the parked id, if any. Ids start at 1, so 0 marks an empty slot.
    pub(crate) fn take_overflow(&self) -> Option<PlaybackId> {
        match self.overflow.swap(0, Ordering::AcqRel) {
            0 => None,
            id => Some(PlaybackId(id)),
        }
    }
}

/// A device that is never available.
///
/// Used by hosts started without audio output (`--no-audio`) or when no
/// output device could be opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutputDevice;

impl OutputDevice for NoOutputDevice {
    fn resume(&self) -> Result<()> {
        Err(LinguaError::PlaybackUnavailable(
            "no audio output device".into(),
        ))
    }

    fn start(&self, _id: PlaybackId, _buffer: Arc<SampleBuffer>, _done: PlaybackDone) -> Result<()> {
        Err(LinguaError::PlaybackUnavailable(
            "no audio output device".into(),
        ))
    }

    fn stop(&self, _id: PlaybackId) {}
}

#[cfg(feature = "audio-cpal")]
pub use self::cpal_output::CpalOutput;

#[cfg(feature = "audio-cpal")]
mod cpal_output {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    };
    use crossbeam_channel::{select, Receiver, Sender};
    use parking_lot::Mutex;
    use tracing::{debug, error, info, warn};

    use super::{CompletionSender, OutputDevice, PlaybackDone, PlaybackId};
    use crate::audio::{resample::resample_all, SampleBuffer};
    use crate::error::{LinguaError, Result};

    const RESUME_TIMEOUT: Duration = Duration::from_secs(2);
    const OVERFLOW_POLL: Duration = Duration::from_millis(250);

    /// Buffer currently being rendered by the callback.
    struct Voice {
        id: PlaybackId,
        /// Planes already converted to the device rate.
        planes: Vec<Vec<f32>>,
        pos: usize,
    }

    type SharedVoice = Arc<Mutex<Option<Voice>>>;

    enum Command {
        Resume(Sender<Result<()>>),
        Start {
            id: PlaybackId,
            buffer: Arc<SampleBuffer>,
            done: PlaybackDone,
        },
        Stop(PlaybackId),
        Shutdown,
    }

    /// Default output device driven from a dedicated thread.
    ///
    /// The thread creates, owns and drops the `!Send` cpal stream. `start`
    /// and `stop` only post commands to it. `resume` also waits for the
    /// reply, bounded by `RESUME_TIMEOUT`.
    pub struct CpalOutput {
        commands: Sender<Command>,
        /// Actual device sample rate (Hz).
        pub sample_rate: u32,
    }

    impl CpalOutput {
        /// Open the system default output device.
        ///
        /// Blocks until the stream is confirmed open (or fails).
        ///
        /// # Errors
        /// `LinguaError::PlaybackUnavailable` when no device exists or the
        /// stream cannot be built.
        pub fn open_default() -> Result<Self> {
            let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<Command>();
            let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

            std::thread::Builder::new()
                .name("lingua-output".into())
                .spawn(move || {
                    let voice: SharedVoice = Arc::new(Mutex::new(None));
                    let (finished_tx, finished_rx) = crossbeam_channel::bounded::<PlaybackId>(16);
                    let completions = CompletionSender::new(finished_tx);

                    let (stream, sample_rate, channels) =
                        match open_stream(Arc::clone(&voice), completions.clone()) {
                            Ok(opened) => opened,
                            Err(e) => {
                                let _ = open_tx.send(Err(e));
                                return;
                            }
                        };
                    let _ = open_tx.send(Ok(sample_rate));

                    let worker = Worker {
                        stream,
                        sample_rate,
                        channels,
                        voice,
                        pending: HashMap::new(),
                    };
                    run_worker(worker, cmd_rx, finished_rx, &completions);
                })
                .map_err(|e| LinguaError::PlaybackUnavailable(format!("spawn output thread: {e}")))?;

            match open_rx.recv() {
                Ok(Ok(sample_rate)) => {
                    info!(sample_rate, "audio output ready");
                    Ok(Self {
                        commands: cmd_tx,
                        sample_rate,
                    })
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(LinguaError::PlaybackUnavailable(
                    "output thread died unexpectedly".into(),
                )),
            }
        }

        fn send(&self, command: Command) -> Result<()> {
            self.commands
                .send(command)
                .map_err(|_| LinguaError::PlaybackUnavailable("output thread is gone".into()))
        }
    }

    impl OutputDevice for CpalOutput {
        fn resume(&self) -> Result<()> {
            let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
            self.send(Command::Resume(reply_tx))?;
            reply_rx.recv_timeout(RESUME_TIMEOUT).map_err(|_| {
                LinguaError::PlaybackUnavailable("output device did not resume".into())
            })?
        }

        fn start(&self, id: PlaybackId, buffer: Arc<SampleBuffer>, done: PlaybackDone) -> Result<()> {
            self.send(Command::Start { id, buffer, done })
        }

        fn stop(&self, id: PlaybackId) {
            let _ = self.send(Command::Stop(id));
        }
    }

    impl Drop for CpalOutput {
        fn drop(&mut self) {
            let _ = self.commands.send(Command::Shutdown);
        }
    }

    struct Worker {
        stream: Stream,
        sample_rate: u32,
        channels: u16,
        voice: SharedVoice,
        /// Completion callbacks keyed by the voice they belong to.
        pending: HashMap<PlaybackId, PlaybackDone>,
    }

    fn run_worker(
        mut worker: Worker,
        commands: Receiver<Command>,
        finished: Receiver<PlaybackId>,
        completions: &CompletionSender,
    ) {
        let overflow_poll = crossbeam_channel::tick(OVERFLOW_POLL);
        loop {
            select! {
                recv(commands) -> msg => match msg {
                    Ok(Command::Resume(reply)) => {
                        let result = worker
                            .stream
                            .play()
                            .map_err(|e| LinguaError::PlaybackUnavailable(e.to_string()));
                        let _ = reply.send(result);
                    }
                    Ok(Command::Start { id, buffer, done }) => worker.start(id, &buffer, done),
                    Ok(Command::Stop(id)) => worker.stop(id),
                    Ok(Command::Shutdown) | Err(_) => break,
                },
                recv(finished) -> msg => {
                    if let Ok(id) = msg {
                        worker.finish(id);
                    }
                }
                recv(overflow_poll) -> _ => {
                    if let Some(id) = completions.take_overflow() {
                        warn!(%id, "completion queue was full, finishing late");
                        worker.finish(id);
                    }
                }
            }
        }
        *worker.voice.lock() = None;
        // Stream drops here, releasing the device on this thread.
        debug!("audio output thread exiting");
    }

    impl Worker {
        fn start(&mut self, id: PlaybackId, buffer: &SampleBuffer, done: PlaybackDone) {
            let mut planes = Vec::with_capacity(buffer.planes().len());
            for plane in buffer.planes() {
                match resample_all(plane, buffer.sample_rate(), self.sample_rate) {
                    Ok(converted) => planes.push(converted),
                    Err(e) => {
                        // Report it as finished so the scheduler releases the turn.
                        error!(%id, "cannot resample voice: {e}");
                        done(id);
                        return;
                    }
                }
            }
            debug!(%id, channels = self.channels, frames = planes[0].len(), "voice queued");

            let previous = self.voice.lock().replace(Voice { id, planes, pos: 0 });
            if let Some(prev) = previous {
                self.pending.remove(&prev.id);
            }
            self.pending.insert(id, done);
        }

        fn finish(&mut self, id: PlaybackId) {
            match self.pending.remove(&id) {
                Some(done) => done(id),
                None => debug!(%id, "finished voice has no pending callback"),
            }
        }

        fn stop(&mut self, id: PlaybackId) {
            let mut voice = self.voice.lock();
            if voice.as_ref().map(|v| v.id) == Some(id) {
                *voice = None;
            }
            self.pending.remove(&id);
        }
    }

    fn open_stream(voice: SharedVoice, finished: CompletionSender) -> Result<(Stream, u32, u16)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LinguaError::PlaybackUnavailable("no default output device".into()))?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| LinguaError::PlaybackUnavailable(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: StreamConfig = supported.config();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, voice, finished),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, voice, finished),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, voice, finished),
            fmt => {
                return Err(LinguaError::PlaybackUnavailable(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LinguaError::PlaybackUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LinguaError::PlaybackUnavailable(e.to_string()))?;

        Ok((stream, sample_rate, channels))
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        voice: SharedVoice,
        finished: CompletionSender,
    ) -> std::result::Result<Stream, cpal::BuildStreamError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        device.build_output_stream(
            config,
            move |data: &mut [T], _info| {
                let silence = T::from_sample(0.0f32);
                let Some(mut guard) = voice.try_lock() else {
                    data.fill(silence);
                    return;
                };
                let Some(current) = guard.as_mut() else {
                    data.fill(silence);
                    return;
                };

                let len = current.planes[0].len();
                let plane_count = current.planes.len();
                for frame in data.chunks_mut(channels) {
                    for (ch, out) in frame.iter_mut().enumerate() {
                        *out = match current.planes[ch % plane_count].get(current.pos) {
                            Some(&s) => T::from_sample(s),
                            None => silence,
                        };
                    }
                    if current.pos < len {
                        current.pos += 1;
                    }
                }

                if current.pos >= len {
                    let id = current.id;
                    *guard = None;
                    finished.notify(id);
                }
            },
            |err| error!("audio output stream error: {err}"),
            None,
        )
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
pub struct CpalOutput {
    pub sample_rate: u32,
}

#[cfg(not(feature = "audio-cpal"))]
impl CpalOutput {
    pub fn open_default() -> Result<Self> {
        Err(LinguaError::PlaybackUnavailable(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl OutputDevice for CpalOutput {
    fn resume(&self) -> Result<()> {
        Err(LinguaError::PlaybackUnavailable(
            "compiled without audio-cpal feature".into(),
        ))
    }

    fn start(&self, _id: PlaybackId, _buffer: Arc<SampleBuffer>, _done: PlaybackDone) -> Result<()> {
        self.resume()
    }

    fn stop(&self, _id: PlaybackId) {}
}

use anyhow::{anyhow, Result};
use futures_util::stream::StreamExt;
use log::{debug, warn};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::playback::{AudioEngine, PlaybackState};
use crate::utils::parsing::ParsingUtils;

/// Bytes to collect before probing the stream format.
const PREBUFFER_BYTES: usize = 64 * 1024;
/// Read data is dropped from the front once the reader is this far in.
const COMPACT_THRESHOLD: usize = 2 * 1024 * 1024;
const MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Network bytes waiting to be decoded.
#[derive(Default)]
struct StreamBuffer {
    data: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl StreamBuffer {
    fn unread(&self) -> usize {
        self.data.len() - self.pos
    }

    fn push(&mut self, chunk: &[u8]) {
        if self.pos > COMPACT_THRESHOLD {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
        if self.data.len() + chunk.len() > MAX_BUFFER_BYTES {
            // Decoder has fallen far behind a live stream; skip ahead.
            let drop = self.data.len() / 4;
            self.data.drain(..drop);
            self.pos = self.pos.saturating_sub(drop);
            debug!("Stream buffer overflow, dropped {}KB", drop / 1024);
        }
        self.data.extend_from_slice(chunk);
    }
}

/// Blocking reader over the network buffer so we can feed Symphonia.
/// Waits for data instead of reporting EOF until the network side is done.
struct StreamingSource {
    shared: Arc<Mutex<StreamBuffer>>,
    cancel: CancellationToken,
}

impl Read for StreamingSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            {
                let mut shared = self
                    .shared
                    .lock()
                    .map_err(|_| std::io::Error::other("stream buffer lock poisoned"))?;

                if shared.unread() > 0 {
                    let n = buf.len().min(shared.unread());
                    let start = shared.pos;
                    buf[..n].copy_from_slice(&shared.data[start..start + n]);
                    shared.pos += n;
                    return Ok(n);
                }

                if shared.finished || self.cancel.is_cancelled() {
                    return Ok(0);
                }
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }
    }
}

impl Seek for StreamingSource {
    fn seek(&mut self, _: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "seek not supported"))
    }
}

impl MediaSource for StreamingSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

struct PlayerState {
    current_url: Option<String>,
    playback_state: PlaybackState,
    sink: Option<Sink>,
    cancellation_token: Option<CancellationToken>,
    volume: f32,
}

impl std::fmt::Debug for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerState")
            .field("current_url", &self.current_url)
            .field("playback_state", &self.playback_state)
            .field("sink", &self.sink.as_ref().map(|_| "Some(Sink)"))
            .field("volume", &self.volume)
            .finish()
    }
}

impl PlayerState {
    fn new() -> Self {
        Self {
            current_url: None,
            playback_state: PlaybackState::Stopped,
            sink: None,
            cancellation_token: None,
            volume: 1.0,
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        debug!("Player state changing from {:?} to {:?}", self.playback_state, state);
        self.playback_state = state;
    }

    /// End the current stream: the download and decode tasks see the
    /// cancelled token and exit, and queued samples go with the sink.
    fn halt(&mut self, next: PlaybackState) {
        if let Some(token) = self.cancellation_token.take() {
            token.cancel();
        }
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        if self.playback_state != next {
            self.set_state(next);
        }
    }
}

fn lock(state: &Mutex<PlayerState>) -> Result<MutexGuard<'_, PlayerState>> {
    state.lock().map_err(|_| anyhow!("Failed to acquire player state lock"))
}

/// rodio output + Symphonia decoding of HTTP audio streams.
///
/// Each `play` spawns a tokio task that downloads the stream into a shared
/// buffer, and a blocking task that decodes it and hands sample buffers to
/// the sink. Must be created inside a tokio runtime.
pub struct StreamPlayer {
    state: Arc<Mutex<PlayerState>>,
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    client: reqwest::Client,
}

impl StreamPlayer {
    pub fn new() -> Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            state: Arc::new(Mutex::new(PlayerState::new())),
            _stream: stream,
            stream_handle,
            client,
        })
    }

    async fn run_stream(
        url: String,
        client: reqwest::Client,
        state: Arc<Mutex<PlayerState>>,
        stream_handle: OutputStreamHandle,
        token: CancellationToken,
    ) -> Result<()> {
        let stream_url = ParsingUtils::resolve_stream_url(&client, &url).await?;
        debug!("Fetching stream from URL: {}", stream_url);

        let response = client.get(&stream_url).send().await?.error_for_status()?;

        {
            let mut state = lock(&state)?;
            if token.is_cancelled() {
                return Ok(());
            }
            let sink = Sink::try_new(&stream_handle)?;
            sink.set_volume(state.volume);
            state.sink = Some(sink);
            state.set_state(PlaybackState::Playing);
        }

        let shared = Arc::new(Mutex::new(StreamBuffer::default()));

        // Network task: keep filling the buffer until the stream ends or we stop.
        {
            let shared = shared.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut stream = response.bytes_stream();
                let mut total_bytes = 0usize;
                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => break,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(chunk)) => {
                            total_bytes += chunk.len();
                            match shared.lock() {
                                Ok(mut buf) => buf.push(&chunk),
                                Err(_) => break,
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Stream read failed: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                if let Ok(mut buf) = shared.lock() {
                    buf.finished = true;
                }
                debug!("Network stream ended, total bytes: {}KB", total_bytes / 1024);
            });
        }

        // Wait for some initial data before probing.
        loop {
            let ready = {
                let buf = shared.lock().map_err(|_| anyhow!("stream buffer lock poisoned"))?;
                buf.unread() >= PREBUFFER_BYTES || buf.finished
            };
            if ready || token.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if token.is_cancelled() {
            return Ok(());
        }

        let mut hint = Hint::new();
        let lower = stream_url.to_lowercase();
        if lower.contains("aac") {
            hint.with_extension("aac");
        } else if lower.contains("mp3") || lower.contains("mpeg") {
            hint.with_extension("mp3");
        }

        let (audio_tx, mut audio_rx) = mpsc::channel::<rodio::buffer::SamplesBuffer<f32>>(16);
        let source = StreamingSource {
            shared,
            cancel: token.clone(),
        };
        let decode_task = {
            let token = token.clone();
            tokio::task::spawn_blocking(move || decode_stream(source, hint, audio_tx, token))
        };

        loop {
            tokio::select! {
                buffer = audio_rx.recv() => match buffer {
                    Some(buffer) => {
                        let guard = lock(&state)?;
                        if let Some(sink) = guard.sink.as_ref() {
                            sink.append(buffer);
                        }
                    }
                    None => break,
                },
                _ = token.cancelled() => break,
            }
        }

        match decode_task.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("decoder task failed: {}", e)),
        }
    }
}

impl AudioEngine for StreamPlayer {
    fn play(&self, url: &str) -> Result<()> {
        self.stop()?;

        let token = CancellationToken::new();
        {
            let mut state = lock(&self.state)?;
            state.current_url = Some(url.to_string());
            state.cancellation_token = Some(token.clone());
            state.set_state(PlaybackState::Connecting);
        }

        let state = self.state.clone();
        let stream_handle = self.stream_handle.clone();
        let client = self.client.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            let result =
                Self::run_stream(url, client, state.clone(), stream_handle, token.clone()).await;

            if let Err(e) = result {
                warn!("Streaming failed: {}", e);
                if !token.is_cancelled() {
                    if let Ok(mut state) = lock(&state) {
                        state.sink = None;
                        state.set_state(PlaybackState::Error(e.to_string()));
                    }
                }
            }
        });

        Ok(())
    }

    /// Live radio cannot be resumed where it left off, so pausing drops the
    /// stream; playing again reconnects.
    fn pause(&self) -> Result<()> {
        let mut state = lock(&self.state)?;
        if state.playback_state == PlaybackState::Playing {
            state.halt(PlaybackState::Paused);
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = lock(&self.state)?;
        state.halt(PlaybackState::Stopped);
        state.current_url = None;
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        if let Ok(mut state) = lock(&self.state) {
            state.volume = volume;
            if let Some(sink) = state.sink.as_ref() {
                sink.set_volume(volume);
            }
        }
    }

    fn state(&self) -> PlaybackState {
        lock(&self.state)
            .map(|state| state.playback_state.clone())
            .unwrap_or_else(|e| PlaybackState::Error(e.to_string()))
    }
}

impl Drop for StreamPlayer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// CPU-heavy probing and decoding; runs on the blocking pool.
fn decode_stream(
    source: StreamingSource,
    hint: Hint,
    audio_tx: mpsc::Sender<rodio::buffer::SamplesBuffer<f32>>,
    token: CancellationToken,
) -> Result<()> {
    let mss = MediaSourceStream::new(
        Box::new(source) as Box<dyn MediaSource>,
        MediaSourceStreamOptions::default(),
    );
    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default track"))?;
    let track_id = track.id;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    debug!(
        "Found audio track: codec={:?}, sample_rate={:?}, channels={:?}",
        track.codec_params.codec, track.codec_params.sample_rate, track.codec_params.channels
    );

    decode_packets(format.as_mut(), decoder.as_mut(), track_id, &audio_tx, &token);
    debug!("Decode task ended");
    Ok(())
}

fn decode_packets(
    format: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    audio_tx: &mpsc::Sender<rodio::buffer::SamplesBuffer<f32>>,
    token: &CancellationToken,
) {
    while !token.is_cancelled() {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Stream reached end");
                return;
            }
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder reset required (unsupported)");
                return;
            }
            Err(e) => {
                debug!("Format error: {}", e);
                return;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Non-fatal, skip bad frame
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => {
                debug!("Decoder error: {}", e);
                return;
            }
        };

        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);

        let buffer = rodio::buffer::SamplesBuffer::new(
            spec.channels.count() as u16,
            spec.rate,
            samples.samples().to_vec(),
        );
        if audio_tx.blocking_send(buffer).is_err() {
            return;
        }
    }
}

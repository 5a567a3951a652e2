//! Background stream recorder.
//!
//! One recording runs on its own OS thread doing blocking HTTP and file I/O.
//! Cancellation is cooperative: the worker checks the stop flag once per
//! chunk, so a stop request takes effect after the read in flight returns
//! (bounded by the read timeout).

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::actions::Notification;

pub const RECORD_CHUNK_SIZE: usize = 8192;
pub const RECORDER_USER_AGENT: &str = "FM-Radio-Recorder/1.0";
const MAX_NAME_CHARS: usize = 40;

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Bounds each chunk read and the wait for response headers.
    pub read_timeout: Duration,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            user_agent: RECORDER_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// How a recording session ended.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The stream was stopped, ended, or broke off mid-way. Zero-byte files
    /// are removed, anything else is kept.
    Finished { bytes: u64 },
    /// The request could not be established; no file is left behind.
    Failed(String),
}

/// Keeps alphanumerics and ` .-_`, replaces everything else, caps the length.
pub fn sanitize_station_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();
    safe.trim().to_string()
}

/// Container extension guessed from the stream URL.
pub fn guess_extension(url: &str) -> &'static str {
    let url = url.to_lowercase();
    if url.contains("mp3") || url.contains("mpeg") {
        ".mp3"
    } else if url.contains("aac") {
        ".aac"
    } else {
        ".mp3"
    }
}

pub fn recording_file_name(now: DateTime<Local>, station_name: &str, url: &str) -> String {
    let name = if station_name.is_empty() {
        "station"
    } else {
        station_name
    };
    format!(
        "record_{}_{}{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        sanitize_station_name(name),
        guess_extension(url)
    )
}

/// Stream `url` into `path` until `stop` is set, the stream ends, or a read
/// fails. Only a failure to establish the request is reported as `Failed`.
pub fn record_to_file(url: &str, path: &Path, stop: &AtomicBool, options: &RecorderOptions) -> RecordOutcome {
    let mut response = match open_stream(url, options) {
        Ok(response) => response,
        Err(e) => {
            warn!("Recording request to {} failed: {:#}", url, e);
            remove_quietly(path);
            return RecordOutcome::Failed(format!("{:#}", e));
        }
    };

    let mut file = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot create recording file {}: {}", path.display(), e);
            return RecordOutcome::Failed(format!("Cannot create {}: {}", path.display(), e));
        }
    };

    let mut buf = vec![0u8; RECORD_CHUNK_SIZE];
    let mut bytes = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let n = match response.read(&mut buf) {
            Ok(0) => {
                debug!("Recording stream ended");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Recording read stopped: {}", e);
                break;
            }
        };
        if let Err(e) = file.write_all(&buf[..n]) {
            warn!("Writing {} failed: {}", path.display(), e);
            break;
        }
        bytes += n as u64;
    }

    if let Err(e) = file.flush() {
        warn!("Flushing {} failed: {}", path.display(), e);
    }
    drop(file);

    if bytes == 0 {
        remove_quietly(path);
    }
    info!("Recording of {} finished with {} bytes", url, bytes);
    RecordOutcome::Finished { bytes }
}

fn open_stream(url: &str, options: &RecorderOptions) -> Result<reqwest::blocking::Response> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(options.user_agent.as_str())
        .connect_timeout(options.connect_timeout)
        .timeout(options.read_timeout)
        .build()
        .context("building HTTP client")?;

    let response = client.get(url).send()?.error_for_status()?;
    Ok(response)
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

/// A running recording. Dropping the handle does not stop the worker; call
/// [`RecordingHandle::request_stop`].
#[derive(Debug)]
pub struct RecordingHandle {
    pub path: PathBuf,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RecordingHandle {
    /// Spawns the worker. The outcome is posted to `notify` when it ends.
    pub fn start(
        url: String,
        path: PathBuf,
        options: RecorderOptions,
        notify: UnboundedSender<Notification>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let worker_path = path.clone();

        let thread = thread::Builder::new()
            .name("recorder".to_string())
            .spawn(move || {
                let outcome = record_to_file(&url, &worker_path, &worker_stop, &options);
                let _ = notify.send(Notification::RecordingFinished {
                    path: worker_path,
                    outcome,
                });
            })
            .context("spawning recorder thread")?;

        info!("Recording started: {}", path.display());
        Ok(Self {
            path,
            stop,
            thread: Some(thread),
        })
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Reap the worker once its completion notification has arrived.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Recorder thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::BufRead;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use tempfile::tempdir;

    /// Serves exactly one request with `status` and `body`, then closes.
    /// The raw request head is sent back through the returned channel.
    fn serve_once(status: &'static str, body: Vec<u8>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/live.mp3", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            let _ = tx.send(head);

            let mut stream = stream;
            let header = format!(
                "HTTP/1.1 {}\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
        });

        (url, rx)
    }

    fn quick_options() -> RecorderOptions {
        RecorderOptions {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            ..RecorderOptions::default()
        }
    }

    #[test]
    fn test_sanitize_station_name() {
        assert_eq!(sanitize_station_name("Radio Ñ 1/2 *Live*"), "Radio Ñ 1_2 _Live_");
        assert_eq!(sanitize_station_name("  padded.name-x_y  "), "padded.name-x_y");
        assert_eq!(sanitize_station_name(&"a".repeat(60)).len(), 40);
    }

    #[test]
    fn test_guess_extension() {
        assert_eq!(guess_extension("http://x/stream.MP3"), ".mp3");
        assert_eq!(guess_extension("http://x/audio/mpeg"), ".mp3");
        assert_eq!(guess_extension("http://x/live-aac"), ".aac");
        assert_eq!(guess_extension("http://x/live"), ".mp3");
    }

    #[test]
    fn test_recording_file_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            recording_file_name(now, "Jazz FM: 24/7", "http://x/aac"),
            "record_2024-03-09_07-05-01_Jazz FM_ 24_7.aac"
        );
        assert_eq!(
            recording_file_name(now, "", "http://x/live"),
            "record_2024-03-09_07-05-01_station.mp3"
        );
    }

    #[test]
    fn test_records_whole_stream() {
        let body: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let (url, head_rx) = serve_once("200 OK", body.clone());
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp3");

        let outcome = record_to_file(&url, &path, &AtomicBool::new(false), &quick_options());

        assert!(matches!(outcome, RecordOutcome::Finished { bytes } if bytes == body.len() as u64));
        assert_eq!(fs::read(&path).unwrap(), body);

        let head = head_rx.recv().unwrap().to_lowercase();
        assert!(head.starts_with("get /live.mp3 "));
        assert!(head.contains("user-agent: fm-radio-recorder/1.0"));
    }

    #[test]
    fn test_http_error_leaves_no_file() {
        let (url, _head_rx) = serve_once("404 Not Found", b"missing".to_vec());
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp3");

        let outcome = record_to_file(&url, &path, &AtomicBool::new(false), &quick_options());

        assert!(matches!(outcome, RecordOutcome::Failed(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_connection_refused_leaves_no_file() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp3");

        let outcome = record_to_file(
            &format!("http://{}/live", addr),
            &path,
            &AtomicBool::new(false),
            &quick_options(),
        );

        assert!(matches!(outcome, RecordOutcome::Failed(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_stop_before_first_chunk_leaves_no_data() {
        let (url, _head_rx) = serve_once("200 OK", vec![7u8; 4096]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp3");

        let outcome = record_to_file(&url, &path, &AtomicBool::new(true), &quick_options());

        assert!(matches!(outcome, RecordOutcome::Finished { bytes: 0 }));
        assert!(!path.exists());
    }

    #[test]
    fn test_handle_posts_outcome() {
        let body = vec![1u8; 10_000];
        let (url, _head_rx) = serve_once("200 OK", body.clone());
        let dir = tempdir().unwrap();
        let path = dir.path().join("handle.mp3");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = RecordingHandle::start(url, path.clone(), quick_options(), tx).unwrap();
        assert!(!handle.is_stopping());

        let Some(Notification::RecordingFinished { path: done, outcome }) = rx.blocking_recv() else {
            panic!("expected a recording notification");
        };
        assert_eq!(done, path);
        assert!(matches!(outcome, RecordOutcome::Finished { bytes: 10_000 }));
        handle.join();
        assert_eq!(fs::metadata(&path).unwrap().len(), 10_000);
    }
}

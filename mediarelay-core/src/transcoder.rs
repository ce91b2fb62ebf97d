use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::config::TranscoderSection;

#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("failed to launch {binary}: {source}")]
    Spawn {
        source: std::io::Error,
        binary: PathBuf,
    },
}

pub type TranscodeResult<T> = Result<T, TranscoderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeKind {
    Fetch,
    Encode { crf: u32 },
}

impl fmt::Display for TranscodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeKind::Fetch => write!(f, "fetch"),
            TranscodeKind::Encode { crf } => write!(f, "encode(crf={crf})"),
        }
    }
}

/// One invocation of the external binary.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub kind: TranscodeKind,
    pub args: Vec<String>,
    pub output: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeStatus {
    Success,
    Failed { code: Option<i32> },
    TimedOut { after: Duration },
}

impl TranscodeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TranscodeStatus::Success)
    }
}

impl fmt::Display for TranscodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeStatus::Success => write!(f, "exit 0"),
            TranscodeStatus::Failed { code: Some(code) } => write!(f, "exit {code}"),
            TranscodeStatus::Failed { code: None } => write!(f, "terminated by signal"),
            TranscodeStatus::TimedOut { after } => write!(f, "timed out after {after:?}"),
        }
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(&self, job: &TranscodeJob) -> TranscodeResult<TranscodeStatus>;
}

/// Runs jobs through a local `ffmpeg`. Output is captured and discarded;
/// only the exit status is consulted. A job that outlives its timeout is
/// killed when its future is dropped.
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, job: &TranscodeJob) -> TranscodeResult<TranscodeStatus> {
        let mut command = Command::new(&self.binary);
        command
            .kill_on_drop(true)
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        match timeout(job.timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(TranscodeStatus::Success),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if let Some(last) = stderr.lines().rev().find(|line| !line.trim().is_empty()) {
                    debug!(job = %job.kind, stderr = %last.trim(), "transcoder exited with failure");
                }
                Ok(TranscodeStatus::Failed {
                    code: output.status.code(),
                })
            }
            Ok(Err(source)) => Err(TranscoderError::Spawn {
                source,
                binary: self.binary.clone(),
            }),
            Err(_) => Ok(TranscodeStatus::TimedOut { after: job.timeout }),
        }
    }
}

/// Builds the two invocation shapes from configuration.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    settings: TranscoderSection,
}

impl JobBuilder {
    pub fn new(settings: TranscoderSection) -> Self {
        Self { settings }
    }

    /// Stream-copy download with reconnect flags; no re-encoding.
    pub fn fetch(&self, source: &Url, output: &Path) -> TranscodeJob {
        let args = vec![
            "-rw_timeout".to_string(),
            self.settings.rw_timeout_micros.to_string(),
            "-reconnect".to_string(),
            "1".to_string(),
            "-reconnect_at_eof".to_string(),
            "1".to_string(),
            "-reconnect_streamed".to_string(),
            "1".to_string(),
            "-reconnect_delay_max".to_string(),
            self.settings.reconnect_delay_max_seconds.to_string(),
            "-i".to_string(),
            source.to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];
        TranscodeJob {
            kind: TranscodeKind::Fetch,
            args,
            output: output.to_path_buf(),
            timeout: self.settings.fetch_timeout(),
        }
    }

    /// Constant-quality video re-encode with the audio stream copied.
    pub fn encode(&self, input: &Path, output: &Path, crf: u32) -> TranscodeJob {
        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-crf".to_string(),
            crf.to_string(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];
        TranscodeJob {
            kind: TranscodeKind::Encode { crf },
            args,
            output: output.to_path_buf(),
            timeout: self.settings.encode_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> JobBuilder {
        JobBuilder::new(TranscoderSection::default())
    }

    #[test]
    fn fetch_job_copies_streams_with_reconnect_flags() {
        let source = Url::parse("https://proxy.example/?id=abc").unwrap();
        let job = builder().fetch(&source, Path::new("/work/abc.mp4"));
        assert_eq!(job.kind, TranscodeKind::Fetch);
        assert_eq!(
            job.args,
            vec![
                "-rw_timeout",
                "5000000",
                "-reconnect",
                "1",
                "-reconnect_at_eof",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                "https://proxy.example/?id=abc",
                "-c",
                "copy",
                "-y",
                "/work/abc.mp4",
            ]
        );
        assert_eq!(job.output, PathBuf::from("/work/abc.mp4"));
    }

    #[test]
    fn encode_job_sets_crf_and_copies_audio() {
        let job = builder().encode(
            Path::new("/work/abc.mp4"),
            Path::new("/work/compressed_abc.mp4"),
            28,
        );
        assert_eq!(job.kind, TranscodeKind::Encode { crf: 28 });
        let crf_at = job.args.iter().position(|arg| arg == "-crf").unwrap();
        assert_eq!(job.args[crf_at + 1], "28");
        let audio_at = job.args.iter().position(|arg| arg == "-c:a").unwrap();
        assert_eq!(job.args[audio_at + 1], "copy");
        assert_eq!(job.args.last().map(String::as_str), Some("/work/compressed_abc.mp4"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let transcoder = FfmpegTranscoder::new("/nonexistent/mediarelay-ffmpeg");
        let job = builder().encode(Path::new("in.mp4"), Path::new("out.mp4"), 24);
        let err = transcoder.run(&job).await.unwrap_err();
        assert!(matches!(err, TranscoderError::Spawn { .. }));
    }

    fn raw_job(args: &[&str], timeout: Duration) -> TranscodeJob {
        TranscodeJob {
            kind: TranscodeKind::Fetch,
            args: args.iter().map(|arg| arg.to_string()).collect(),
            output: PathBuf::from("unused"),
            timeout,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported_with_code() {
        let transcoder = FfmpegTranscoder::new("sh");
        let job = raw_job(&["-c", "echo boom >&2; exit 3"], Duration::from_secs(10));
        let status = transcoder.run(&job).await.unwrap();
        assert_eq!(status, TranscodeStatus::Failed { code: Some(3) });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn overrunning_job_times_out() {
        let transcoder = FfmpegTranscoder::new("sleep");
        let job = raw_job(&["5"], Duration::from_millis(100));
        let status = transcoder.run(&job).await.unwrap();
        assert!(matches!(status, TranscodeStatus::TimedOut { .. }));
    }
}

//! Upload-triggered incident transcription
//!
//! When an alert's audio clip lands in object storage at
//! `audio/{userId}/{incidentId}.m4a`, [`TranscriptionJob`] fetches it, runs
//! speech-to-text and merges the transcript (or the error) into the
//! incident record. The job is fire-and-forget from the app's point of view
//! and safe to run more than once for the same upload.

pub mod whisper;

pub use whisper::{WhisperClient, WhisperConfig, WhisperError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::store::IncidentStore;

/// `audio/{userId}/{incidentId}.m4a`
static AUDIO_OBJECT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^audio/([^/]+)/([^/]+)\.m4a$").unwrap());

/// Identifiers extracted from an uploaded audio object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioObjectPath {
    pub user_id: String,
    pub incident_id: String,
    pub file_name: String,
}

/// Parses `audio/{userId}/{incidentId}.m4a`; anything else is `None`
pub fn parse_audio_object_path(path: &str) -> Option<AudioObjectPath> {
    let captures = AUDIO_OBJECT_PATTERN.captures(path)?;
    let user_id = captures.get(1)?.as_str();
    let incident_id = captures.get(2)?.as_str();

    Some(AudioObjectPath {
        user_id: user_id.to_string(),
        incident_id: incident_id.to_string(),
        file_name: format!("{}.m4a", incident_id),
    })
}

/// Speech-to-text backend
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, file_name: &str, audio: &[u8]) -> Result<String>;

    /// Recorded as `transcriptSource`
    fn source_name(&self) -> &str;
}

/// Where uploaded audio objects are read from
#[async_trait]
pub trait AudioObjectSource: Send + Sync {
    async fn fetch(&self, object_path: &str) -> Result<Vec<u8>>;
}

/// Objects stored as files under a root directory
#[derive(Debug, Clone)]
pub struct LocalObjectSource {
    root: PathBuf,
}

impl LocalObjectSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, object_path: &str) -> Result<PathBuf> {
        let relative = Path::new(object_path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("Refusing object path outside storage root: {}", object_path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AudioObjectSource for LocalObjectSource {
    async fn fetch(&self, object_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(object_path)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read audio object {:?}", path))
    }
}

/// What a job run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The object is not an incident recording
    Ignored,
    Transcribed { incident_id: String, chars: usize },
    /// The error was recorded on the incident
    Failed { incident_id: String, error: String },
}

/// Transcribes uploaded incident audio
pub struct TranscriptionJob {
    source: Arc<dyn AudioObjectSource>,
    speech: Arc<dyn SpeechToText>,
    incidents: Arc<IncidentStore>,
    clock: Arc<dyn Clock>,
}

impl TranscriptionJob {
    pub fn new(
        source: Arc<dyn AudioObjectSource>,
        speech: Arc<dyn SpeechToText>,
        incidents: Arc<IncidentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            speech,
            incidents,
            clock,
        }
    }

    /// Handles one finalized upload
    ///
    /// Fetch and transcription failures are recorded on the incident and
    /// reported as [`JobOutcome::Failed`]. Only a failure to write the
    /// incident record is returned as an error.
    pub async fn handle_upload(&self, object_path: &str) -> Result<JobOutcome> {
        let Some(object) = parse_audio_object_path(object_path) else {
            tracing::debug!("Ignoring non-incident upload: {}", object_path);
            return Ok(JobOutcome::Ignored);
        };

        match self.transcribe(object_path, &object).await {
            Ok(transcript) => {
                self.incidents
                    .record_transcript(
                        &object.incident_id,
                        &object.user_id,
                        &transcript,
                        self.speech.source_name(),
                        self.clock.now(),
                    )
                    .context("Failed to store transcript")?;

                tracing::info!(
                    "Transcribed incident {} ({} chars)",
                    object.incident_id,
                    transcript.chars().count()
                );
                Ok(JobOutcome::Transcribed {
                    chars: transcript.chars().count(),
                    incident_id: object.incident_id,
                })
            }
            Err(e) => {
                let error = format!("{:#}", e);
                tracing::error!("Transcription failed for {}: {}", object.incident_id, error);

                self.incidents
                    .record_error(&object.incident_id, &object.user_id, &error)
                    .context("Failed to store transcription error")?;

                Ok(JobOutcome::Failed {
                    incident_id: object.incident_id,
                    error,
                })
            }
        }
    }

    async fn transcribe(&self, object_path: &str, object: &AudioObjectPath) -> Result<String> {
        let audio = self.source.fetch(object_path).await?;
        self.speech.transcribe(&object.file_name, &audio).await
    }

    /// Runs [`handle_upload`](Self::handle_upload) in the background
    pub fn spawn_upload(self: &Arc<Self>, object_path: impl Into<String>) -> JoinHandle<()> {
        let job = Arc::clone(self);
        let object_path = object_path.into();
        tokio::spawn(async move {
            if let Err(e) = job.handle_upload(&object_path).await {
                tracing::error!("Transcription job for {} failed: {:#}", object_path, e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    struct EchoSpeech;

    #[async_trait]
    impl SpeechToText for EchoSpeech {
        async fn transcribe(&self, _file_name: &str, audio: &[u8]) -> Result<String> {
            if audio.is_empty() {
                anyhow::bail!("empty audio");
            }
            Ok(String::from_utf8_lossy(audio).into_owned())
        }

        fn source_name(&self) -> &str {
            "echo"
        }
    }

    fn job(root: &Path) -> (TranscriptionJob, Arc<IncidentStore>) {
        let incidents = Arc::new(IncidentStore::new(Arc::new(MemoryStore::new())));
        let job = TranscriptionJob::new(
            Arc::new(LocalObjectSource::new(root)),
            Arc::new(EchoSpeech),
            incidents.clone(),
            Arc::new(SystemClock),
        );
        (job, incidents)
    }

    #[test]
    fn test_parse_audio_object_path() {
        let parsed = parse_audio_object_path("audio/user-1/inc-42.m4a").unwrap();
        assert_eq!(parsed.user_id, "user-1");
        assert_eq!(parsed.incident_id, "inc-42");
        assert_eq!(parsed.file_name, "inc-42.m4a");

        assert!(parse_audio_object_path("images/user-1/inc-42.m4a").is_none());
        assert!(parse_audio_object_path("audio/inc-42.m4a").is_none());
        assert!(parse_audio_object_path("audio/user-1/inc-42.mp3").is_none());
        assert!(parse_audio_object_path("audio/user-1/nested/inc-42.m4a").is_none());
    }

    #[test]
    fn test_local_source_rejects_traversal() {
        let source = LocalObjectSource::new("/srv/objects");
        assert!(source.resolve("../etc/passwd").is_err());
        assert!(source.resolve("/etc/passwd").is_err());
        assert_eq!(
            source.resolve("audio/u/i.m4a").unwrap(),
            PathBuf::from("/srv/objects/audio/u/i.m4a")
        );
    }

    #[tokio::test]
    async fn test_transcribes_upload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("audio/user-1")).unwrap();
        std::fs::write(dir.path().join("audio/user-1/inc-1.m4a"), b"nisaidie").unwrap();

        let (job, incidents) = job(dir.path());
        let outcome = job.handle_upload("audio/user-1/inc-1.m4a").await.unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Transcribed {
                incident_id: "inc-1".to_string(),
                chars: 8
            }
        );
        let record = incidents.get("inc-1").unwrap().unwrap();
        assert_eq!(record.transcript.as_deref(), Some("nisaidie"));
        assert_eq!(record.transcript_source.as_deref(), Some("echo"));
        assert_eq!(record.user_id.as_deref(), Some("user-1"));
        assert!(record.transcribed_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_object_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let (job, incidents) = job(dir.path());

        let outcome = job.handle_upload("audio/user-1/inc-2.m4a").await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed { .. }));

        let record = incidents.get("inc-2").unwrap().unwrap();
        assert!(record.transcript.is_none());
        assert!(record
            .transcript_error
            .unwrap()
            .contains("Failed to read audio object"));
    }

    #[tokio::test]
    async fn test_ignores_other_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let (job, incidents) = job(dir.path());

        let outcome = job.handle_upload("avatars/user-1.png").await.unwrap();
        assert_eq!(outcome, JobOutcome::Ignored);
        assert!(incidents.incident_ids().unwrap().is_empty());
    }
}

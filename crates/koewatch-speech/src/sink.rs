//! The pluggable speech sink: synthesize text to audio bytes and play them.
//! The bundled implementation talks to a VOICEVOX-compatible engine over
//! HTTP and shells out to the platform audio player.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Blocks until playback completes.
    async fn play(&self, audio: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct VoiceParams {
    pub speed: f64,
    pub pitch: f64,
    pub volume: f64,
    pub intonation: f64,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            speed: 1.5,
            pitch: 0.0,
            volume: 1.0,
            intonation: 1.0,
        }
    }
}

pub struct VoicevoxSink {
    client: reqwest::Client,
    base_url: String,
    speaker_id: u32,
    params: VoiceParams,
}

impl VoicevoxSink {
    pub fn new(base_url: impl Into<String>, speaker_id: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SYNTHESIS_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            speaker_id,
            params: VoiceParams::default(),
        })
    }

    pub fn with_params(mut self, params: VoiceParams) -> Self {
        self.params = params;
        self
    }

    /// Short GET probe; a dead engine disables speech instead of failing
    /// every utterance.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/version", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn apply_params(&self, query: &mut serde_json::Value) {
        query["speedScale"] = self.params.speed.into();
        query["pitchScale"] = self.params.pitch.into();
        query["volumeScale"] = self.params.volume.into();
        query["intonationScale"] = self.params.intonation.into();
    }
}

#[async_trait]
impl SpeechSink for VoicevoxSink {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let speaker = self.speaker_id.to_string();

        let query_url = format!("{}/audio_query", self.base_url);
        let response = self
            .client
            .post(&query_url)
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .context("audio_query request failed")?;
        if !response.status().is_success() {
            bail!("audio_query returned {}", response.status());
        }
        let mut query: serde_json::Value =
            response.json().await.context("audio_query is not JSON")?;
        self.apply_params(&mut query);

        let synthesis_url = format!("{}/synthesis", self.base_url);
        let response = self
            .client
            .post(&synthesis_url)
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await
            .context("synthesis request failed")?;
        if !response.status().is_success() {
            bail!("synthesis returned {}", response.status());
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn play(&self, audio: &[u8]) -> Result<()> {
        let path = scratch_wav_path();
        tokio::fs::write(&path, audio)
            .await
            .with_context(|| format!("cannot write audio to {}", path.display()))?;

        let result = play_file(&path).await;
        let _ = tokio::fs::remove_file(&path).await;
        result
    }
}

fn scratch_wav_path() -> PathBuf {
    std::env::temp_dir().join(format!("koewatch-{}.wav", std::process::id()))
}

#[cfg(target_os = "macos")]
async fn play_file(path: &std::path::Path) -> Result<()> {
    run_player("afplay", path).await
}

#[cfg(not(target_os = "macos"))]
async fn play_file(path: &std::path::Path) -> Result<()> {
    // prefer ALSA, fall back to PulseAudio
    if run_player("aplay", path).await.is_ok() {
        return Ok(());
    }
    run_player("paplay", path).await
}

async fn run_player(player: &str, path: &std::path::Path) -> Result<()> {
    let status = tokio::process::Command::new(player)
        .arg(path)
        .status()
        .await
        .with_context(|| format!("cannot spawn {}", player))?;
    if !status.success() {
        bail!("{} exited with {}", player, status);
    }
    Ok(())
}

use anyhow::{Context, bail};
use serde::Deserialize;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub words: Vec<Word>,
}

#[derive(Debug, Clone)]
pub struct Transcript {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    tokens: Vec<WhisperToken>,
}

#[derive(Debug, Deserialize)]
struct WhisperToken {
    text: String,
    offsets: WhisperOffsets,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: i64,
    to: i64,
}

/// Run whisper-cli over a narration wav and return word-level timestamps.
/// `--max-len 1` is what makes `--split-on-word` take effect in whisper.cpp,
/// so every emitted token is a whole word instead of a BPE fragment.
pub fn transcribe(
    audio: &Path,
    model: &Path,
    language: &str,
    work_dir: &Path,
) -> anyhow::Result<Transcript> {
    let output_base = work_dir.join("transcript");
    info!("Transcribing {} with whisper-cli", audio.display());
    let status = Command::new("whisper-cli")
        .args(whisper_args(audio, model, language, &output_base))
        .status()
        .context("failed to run whisper-cli")?;
    if !status.success() {
        bail!("whisper-cli failed for {}", audio.display());
    }

    let json_path = output_base.with_extension("json");
    let json = fs::read_to_string(&json_path)
        .with_context(|| format!("missing whisper output {}", json_path.display()))?;
    parse_transcript(&json)
}

fn whisper_args(audio: &Path, model: &Path, language: &str, output_base: &Path) -> Vec<OsString> {
    vec![
        "-m".into(),
        model.into(),
        "-f".into(),
        audio.into(),
        "-l".into(),
        language.into(),
        "--output-json-full".into(),
        "--split-on-word".into(),
        "--max-len".into(),
        "1".into(),
        "-of".into(),
        output_base.into(),
    ]
}

pub fn parse_transcript(json: &str) -> anyhow::Result<Transcript> {
    let parsed: WhisperOutput =
        serde_json::from_str(json).context("unexpected whisper JSON shape")?;

    let mut words = Vec::new();
    for seg in parsed.transcription {
        for tok in seg.tokens {
            let text = tok.text.trim();
            // Bracketed entries are model markers like [_BEG_], not speech.
            if text.is_empty() || text.starts_with('[') || text.starts_with('<') {
                continue;
            }
            words.push(Word {
                text: text.to_string(),
                start: tok.offsets.from as f64 / 1000.0,
                end: tok.offsets.to as f64 / 1000.0,
            });
        }
    }
    Ok(Transcript {
        segments: split_into_sentences(words),
    })
}

/// At max-len 1 whisper emits one word per segment; regroup the words into
/// sentence segments so caption bursts can span neighboring words.
fn split_into_sentences(words: Vec<Word>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for word in words {
        let ends_sentence = word.text.ends_with(['.', '!', '?']);
        current.push(word);
        if ends_sentence {
            segments.push(Segment {
                words: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        segments.push(Segment { words: current });
    }
    segments
}

mod args;
mod audio;
mod captions;
mod card;
mod compose;
mod reddit;
mod store;
mod text;
mod transcribe;
mod tts;

use anyhow::{Context, ensure};
use args::Args;
use chrono::Utc;
use clap::Parser;
use compose::ComposePlan;
use fontdue::Font;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use store::{AudioFileRecord, FinishedVideoRecord, Store};
use tracing::{error, info, warn};

const URL_PREFIX: &str = "https://www.reddit.com/";
const URL_SENTINEL: &str = "done";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info") // set to "debug" for more logs
        .init();

    info!("Starting reddit shorts video generation pipeline");

    let args = Args::parse();

    for tool in ["ffmpeg", "ffprobe", "piper", "whisper-cli"] {
        if which::which(tool).is_err() {
            error!("Required tool '{}' not found on PATH", tool);
            std::process::exit(1);
        }
    }
    if !args.background.exists() {
        error!("Background video not found: {}", args.background.display());
        std::process::exit(1);
    }
    info!("Background video found: {}", args.background.display());

    let urls = if args.url.is_empty() {
        collect_urls(std::io::stdin().lock())?
    } else {
        args.url.clone()
    };
    if urls.is_empty() {
        info!("No URLs provided, nothing to do");
        return Ok(());
    }
    info!("Queued {} post(s)", urls.len());

    let music = match &args.music {
        Some(m) => m.clone(),
        None => prompt_music_choice(&args.data_dir.join("background_music"))?,
    };
    info!("Using background music: {}", music.display());

    let font = card::load_title_font(&args.font)?;
    let store = Store::open(&args.data_dir.join("finished_vids"))?;
    let finished = store.videos()?;
    info!(
        "Bookkeeping: {} video(s) and {} audio file(s) on record",
        finished.len(),
        store.audio()?.len()
    );

    for url in &urls {
        if already_finished(&finished, url) {
            info!("Skipping already generated post: {}", url);
            continue;
        }
        info!("Processing {}", url);
        if let Err(e) = process_url(url, &args, &music, &font, &store).await {
            error!("Failed to process {}: {:?}", url, e);
        }
    }

    info!("Process complete.");
    Ok(())
}

/// Collecting state of the batch driver: read lines until the sentinel,
/// keeping only reddit post URLs.
fn collect_urls(reader: impl BufRead) -> anyhow::Result<Vec<String>> {
    println!("Enter reddit post URLs, one per line; type '{URL_SENTINEL}' to start processing.");
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.eq_ignore_ascii_case(URL_SENTINEL) {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if line.starts_with(URL_PREFIX) {
            urls.push(line.to_string());
        } else {
            warn!("Ignoring line that is not a reddit post URL: {}", line);
        }
    }
    Ok(urls)
}

/// A post already present in the video records is not rendered again.
fn already_finished(
    finished: &std::collections::BTreeMap<String, FinishedVideoRecord>,
    url: &str,
) -> bool {
    finished.values().any(|r| r.url == url)
}

fn prompt_music_choice(dir: &Path) -> anyhow::Result<PathBuf> {
    let mut tracks: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read music dir {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    tracks.sort();
    ensure!(
        !tracks.is_empty(),
        "no background music found in {}",
        dir.display()
    );
    if tracks.len() == 1 {
        return Ok(tracks.remove(0));
    }

    for (i, track) in tracks.iter().enumerate() {
        let name = track
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| track.display().to_string());
        println!("{}: {}", i + 1, name);
    }
    print!("Select background music [1-{}]: ", tracks.len());
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let choice: usize = line
        .trim()
        .parse()
        .context("music selection is not a number")?;
    ensure!(
        (1..=tracks.len()).contains(&choice),
        "music selection out of range"
    );
    Ok(tracks.swap_remove(choice - 1))
}

async fn process_url(
    url: &str,
    args: &Args,
    music: &Path,
    font: &Font,
    store: &Store,
) -> anyhow::Result<()> {
    let submission = reddit::fetch_submission(url).await?;
    info!("Fetched post: {:.120}", submission.title);

    let title = text::censor_text(&text::parse_text(&submission.title));
    let body = text::censor_text(&text::parse_text(&submission.body));
    ensure!(!body.is_empty(), "submission has no body text to narrate");

    // Per-submission working dir so parallel-ish runs never collide on
    // temp artifact names.
    let work = args.data_dir.join("tmp").join(&submission.id);
    fs::create_dir_all(&work)?;
    let audio_dir = args.data_dir.join("text_audio");
    fs::create_dir_all(&audio_dir)?;

    let title_wav = audio_dir.join(format!("{}_title.wav", submission.id));
    let body_wav = audio_dir.join(format!("{}_body.wav", submission.id));
    info!("Synthesizing narration ({} + {} chars)", title.len(), body.len());
    tts::synthesize(&args.piper_model, &title, &title_wav)?;
    tts::synthesize(&args.piper_model, &body, &body_wav)?;

    if (args.tempo - 1.0).abs() > f64::EPSILON {
        info!("Time-stretching narration by {}", args.tempo);
        for wav in [&title_wav, &body_wav] {
            let stretched = work.join(
                wav.file_name()
                    .context("narration path has no file name")?,
            );
            tts::time_stretch(wav, &stretched, args.tempo)?;
            fs::rename(&stretched, wav)?;
        }
    }

    for (wav, kind) in [(&title_wav, "title"), (&body_wav, "body")] {
        store.record_audio(
            wav,
            AudioFileRecord {
                submission_id: submission.id.clone(),
                kind: kind.to_string(),
                created_at: Utc::now(),
            },
        )?;
    }

    let intro_duration = audio::wav_duration_seconds(&title_wav)?;
    let body_duration = audio::wav_duration_seconds(&body_wav)?;
    info!(
        "Narration durations: title {:.2}s, body {:.2}s",
        intro_duration, body_duration
    );

    let transcript = transcribe::transcribe(&body_wav, &args.whisper_model, &args.language, &work)?;
    let mut rng = StdRng::from_entropy();
    let bursts = captions::group_bursts(&transcript, &mut rng);
    info!("Built {} caption bursts", bursts.len());
    let ass_path = work.join("captions.ass");
    captions::write_ass(&ass_path, &bursts, intro_duration)?;

    let card_path = work.join("card.png");
    let card = card::render_card(&title, font, args.title_font_size, &args.logo, &card_path)?;
    info!("Rendered overlay card ({}x{})", card::CARD_WIDTH, card.height);

    let out_dir = args.data_dir.join("finished_vids");
    fs::create_dir_all(&out_dir)?;
    let output = out_dir.join(format!("{}.mp4", submission.id));

    let background_duration = audio::probe_duration_seconds(&args.background)?;
    let slice = compose::plan_background_slice(
        background_duration,
        intro_duration + body_duration,
        &mut rng,
    );
    let plan = ComposePlan {
        background: args.background.clone(),
        card: card.path.clone(),
        card_height: card.height,
        title_audio: title_wav.clone(),
        body_audio: body_wav.clone(),
        music: music.to_path_buf(),
        subtitles: ass_path.clone(),
        intro_duration,
        body_duration,
        music_gain: args.music_gain,
        fps: args.fps,
        output: output.clone(),
    };
    compose::compose(&plan, &slice)?;

    store.record_video(
        &output,
        FinishedVideoRecord {
            url: url.to_string(),
            title: submission.title.clone(),
            created_at: Utc::now(),
        },
    )?;

    if let Err(e) = fs::remove_dir_all(&work) {
        warn!("Failed to clean up {}: {}", work.display(), e);
    }
    info!("Finished video written to {}", output.display());
    Ok(())
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
pub struct Args {
    /// Reddit post URL; repeat to queue several. Without it URLs are read
    /// from stdin until a "done" line.
    #[clap(long)]
    pub url: Vec<String>,

    #[clap(long, default_value = "./data")]
    pub data_dir: PathBuf,

    #[clap(long, default_value = "./data/background_video.mp4")]
    pub background: PathBuf,

    /// Background music track; without it a numeric prompt lists the files
    /// under <data-dir>/background_music.
    #[clap(long)]
    pub music: Option<PathBuf>,

    #[clap(long, default_value = "./data/logo.png")]
    pub logo: PathBuf,

    #[clap(long, default_value = "./data/fonts/Montserrat-ExtraBold.ttf")]
    pub font: PathBuf,

    #[clap(long, default_value_t = 20.0)]
    pub title_font_size: f32,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: PathBuf,

    #[clap(long, default_value = "./models/ggml-small.bin")]
    pub whisper_model: PathBuf,

    #[clap(long, default_value = "en")]
    pub language: String,

    /// Narration speed factor; 1.0 leaves the synthesized audio untouched.
    #[clap(long, default_value_t = 1.0)]
    pub tempo: f64,

    #[clap(long, default_value_t = 0.15)]
    pub music_gain: f64,

    #[clap(long, default_value_t = 24)]
    pub fps: u32,
}

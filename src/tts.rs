use anyhow::{Context, bail};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::error;

pub fn synthesize(model: &Path, text: &str, out_path: &Path) -> anyhow::Result<()> {
    let mut child = Command::new("piper")
        .arg("--model")
        .arg(model)
        .arg("--output_file")
        .arg(out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .context("failed to spawn piper process")?;

    {
        let stdin = child
            .stdin
            .as_mut()
            .context("failed to open piper stdin")?;
        stdin.write_all(text.as_bytes())?;
    }

    let status = child.wait()?;
    if !status.success() {
        error!("Piper TTS command failed for {}", out_path.display());
        bail!("TTS engine returned non-zero for {}", out_path.display());
    }
    Ok(())
}

/// Speed the narration up or down without changing pitch. ffmpeg's atempo
/// only accepts factors in [0.5, 100.0].
pub fn time_stretch(input: &Path, output: &Path, tempo: f64) -> anyhow::Result<()> {
    if !(0.5..=100.0).contains(&tempo) {
        bail!("tempo {} outside the supported range [0.5, 100.0]", tempo);
    }
    let status = Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
        .arg(input)
        .args(["-filter:a", &format!("atempo={}", tempo)])
        .arg(output)
        .status()
        .context("failed to run ffmpeg for time stretch")?;
    if !status.success() {
        bail!("ffmpeg atempo failed for {}", input.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_stretch_rejects_out_of_range_tempo() {
        let err = time_stretch(Path::new("in.wav"), Path::new("out.wav"), 0.1);
        assert!(err.is_err());
        let err = time_stretch(Path::new("in.wav"), Path::new("out.wav"), 150.0);
        assert!(err.is_err());
    }
}

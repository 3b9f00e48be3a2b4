use anyhow::{Context, bail};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info};

/// Seconds shaved off the end of the mixed audio to dodge encoder artifacts
/// at end-of-file.
pub const TAIL_TRIM: f64 = 0.5;

/// Extra background video read past the required length when the source is
/// long enough, as headroom for the final trim.
pub const SUBCLIP_MARGIN: f64 = 2.0;

#[derive(Debug)]
pub struct ComposePlan {
    pub background: PathBuf,
    pub card: PathBuf,
    pub card_height: u32,
    pub title_audio: PathBuf,
    pub body_audio: PathBuf,
    pub music: PathBuf,
    pub subtitles: PathBuf,
    pub intro_duration: f64,
    pub body_duration: f64,
    pub music_gain: f64,
    pub fps: u32,
    pub output: PathBuf,
}

impl ComposePlan {
    pub fn total_duration(&self) -> f64 {
        self.intro_duration + self.body_duration
    }
}

/// Which part of the background video covers the narration: either a random
/// contiguous subclip, or the whole clip looped end-to-end and trimmed to
/// exactly the requested length.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSlice {
    pub start: f64,
    pub duration: f64,
    pub looped: bool,
}

pub fn plan_background_slice<R: Rng>(
    background_duration: f64,
    total: f64,
    rng: &mut R,
) -> BackgroundSlice {
    if background_duration > total {
        let start = rng.gen_range(0.0..background_duration - total);
        let margin = SUBCLIP_MARGIN.min(background_duration - start - total);
        BackgroundSlice {
            start,
            duration: total + margin,
            looped: false,
        }
    } else {
        BackgroundSlice {
            start: 0.0,
            duration: total,
            looped: true,
        }
    }
}

/// One ffmpeg invocation: crop the background to 9:16, overlay the
/// pop-animated card during the intro, burn the caption bursts into the main
/// segment, concat both, and mix looped music under the narration.
pub fn build_ffmpeg_args(plan: &ComposePlan, slice: &BackgroundSlice) -> Vec<String> {
    let total = plan.total_duration();
    let intro = plan.intro_duration;
    let fps = plan.fps;
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

    // input 0: background video
    if slice.looped {
        args.extend(["-stream_loop".into(), "-1".into()]);
        args.extend(["-t".into(), format!("{:.3}", slice.duration)]);
    } else {
        args.extend(["-ss".into(), format!("{:.3}", slice.start)]);
        args.extend(["-t".into(), format!("{:.3}", slice.duration)]);
    }
    args.extend(["-i".into(), plan.background.to_string_lossy().into_owned()]);

    // input 1: overlay card image, held for the whole intro
    args.extend(["-loop".into(), "1".into()]);
    args.extend(["-t".into(), format!("{:.3}", intro)]);
    args.extend(["-i".into(), plan.card.to_string_lossy().into_owned()]);

    // inputs 2 and 3: title and body narration
    args.extend(["-i".into(), plan.title_audio.to_string_lossy().into_owned()]);
    args.extend(["-i".into(), plan.body_audio.to_string_lossy().into_owned()]);

    // input 4: background music, looped for as long as the mix needs it
    args.extend(["-stream_loop".into(), "-1".into()]);
    args.extend(["-i".into(), plan.music.to_string_lossy().into_owned()]);

    let crop = "crop=ih*9/16:ih:(iw-ih*9/16)/2:0";
    let pop = format!("z='max(1.0,1.1-pow((on/{fps})/0.1,2))'");
    let ass_path = escape_filter_path(&plan.subtitles);
    let atrim_end = (total - TAIL_TRIM).max(0.0);

    let filter = format!(
        "[0:v]{crop},scale=1080:1920,fps={fps},setsar=1[bg];\
         [bg]split=2[bg_a][bg_b];\
         [bg_a]trim=0:{intro:.3},setpts=PTS-STARTPTS[bg_intro];\
         [bg_b]trim={intro:.3}:{total:.3},setpts=PTS-STARTPTS[bg_main];\
         [1:v]zoompan={pop}:d=1:x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':fps={fps}:s={cw}x{ch}[card];\
         [bg_intro][card]overlay=(W-w)/2:(H-h)/2:shortest=1[intro_v];\
         [intro_v][bg_main]concat=n=2:v=1:a=0[vcat];\
         [vcat]ass='{ass_path}'[vout];\
         [2:a][3:a]concat=n=2:v=0:a=1[narration];\
         [4:a]volume={gain}[music];\
         [narration][music]amix=inputs=2:duration=first:normalize=0[mix];\
         [mix]atrim=0:{atrim_end:.3},asetpts=PTS-STARTPTS[aout]",
        cw = crate::card::CARD_WIDTH,
        ch = plan.card_height,
        gain = plan.music_gain,
    );

    args.extend(["-filter_complex".into(), filter]);
    args.extend(["-map".into(), "[vout]".into()]);
    args.extend(["-map".into(), "[aout]".into()]);
    args.extend(["-c:v".into(), "libx264".into()]);
    args.extend(["-c:a".into(), "aac".into()]);
    args.extend(["-r".into(), fps.to_string()]);
    args.extend(["-pix_fmt".into(), "yuv420p".into()]);
    args.push(plan.output.to_string_lossy().into_owned());
    args
}

pub fn compose(plan: &ComposePlan, slice: &BackgroundSlice) -> anyhow::Result<()> {
    let args = build_ffmpeg_args(plan, slice);
    info!(
        "Rendering final video ({:.2}s intro + {:.2}s main) to {}",
        plan.intro_duration,
        plan.body_duration,
        plan.output.display()
    );
    let status = Command::new("ffmpeg")
        .args(&args)
        .status()
        .context("failed to run ffmpeg")?;
    if !status.success() {
        error!("ffmpeg failed to produce {}", plan.output.display());
        bail!("ffmpeg failed to produce final video");
    }
    Ok(())
}

fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_plan() -> ComposePlan {
        ComposePlan {
            background: PathBuf::from("bg.mp4"),
            card: PathBuf::from("card.png"),
            card_height: 320,
            title_audio: PathBuf::from("title.wav"),
            body_audio: PathBuf::from("body.wav"),
            music: PathBuf::from("moments.m4a"),
            subtitles: PathBuf::from("subs.ass"),
            intro_duration: 3.0,
            body_duration: 4.0,
            music_gain: 0.15,
            fps: 24,
            output: PathBuf::from("out.mp4"),
        }
    }

    #[test]
    fn short_background_loops_to_exact_total() {
        let mut rng = StdRng::seed_from_u64(1);
        let slice = plan_background_slice(5.0, 7.0, &mut rng);
        assert!(slice.looped);
        assert_eq!(slice.start, 0.0);
        assert!((slice.duration - 7.0).abs() < 1e-9);
    }

    #[test]
    fn long_background_takes_bounded_random_subclip() {
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let slice = plan_background_slice(10.0, 7.0, &mut rng);
            assert!(!slice.looped);
            assert!(slice.start >= 0.0 && slice.start < 3.0);
            assert!(slice.duration >= 7.0);
            assert!(slice.duration <= 7.0 + SUBCLIP_MARGIN + 1e-9);
            assert!(slice.start + slice.duration <= 10.0 + 1e-9);
        }
    }

    #[test]
    fn looped_args_carry_stream_loop_and_exact_trim() {
        let plan = sample_plan();
        let slice = BackgroundSlice {
            start: 0.0,
            duration: 7.0,
            looped: true,
        };
        let args = build_ffmpeg_args(&plan, &slice);
        let joined = args.join(" ");
        assert!(joined.starts_with("-y"));
        assert_eq!(joined.matches("-stream_loop").count(), 2); // background + music
        assert!(joined.contains("-t 7.000"));
        assert!(!joined.contains("-ss"));
    }

    #[test]
    fn filter_graph_crops_mixes_and_trims_tail() {
        let plan = sample_plan();
        let slice = BackgroundSlice {
            start: 1.5,
            duration: 9.0,
            looped: false,
        };
        let args = build_ffmpeg_args(&plan, &slice);
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("crop=ih*9/16:ih:(iw-ih*9/16)/2:0"));
        assert!(filter.contains("scale=1080:1920"));
        assert!(filter.contains("trim=0:3.000"));
        assert!(filter.contains("trim=3.000:7.000"));
        assert!(filter.contains("concat=n=2:v=1:a=0"));
        assert!(filter.contains("concat=n=2:v=0:a=1"));
        assert!(filter.contains("volume=0.15"));
        assert!(filter.contains("amix=inputs=2:duration=first:normalize=0"));
        assert!(filter.contains("atrim=0:6.500"));
        assert!(filter.contains("ass='subs.ass'"));
        assert!(filter.contains("s=500x320"));
    }

    #[test]
    fn subclip_args_seek_into_background() {
        let plan = sample_plan();
        let slice = BackgroundSlice {
            start: 1.5,
            duration: 9.0,
            looped: false,
        };
        let args = build_ffmpeg_args(&plan, &slice);
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "1.500");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn filter_path_escaping_handles_colons_and_quotes() {
        assert_eq!(escape_filter_path(Path::new("C:\\tmp\\o'k.ass")), "C\\:/tmp/o\\'k.ass");
    }
}

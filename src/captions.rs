use crate::transcribe::Transcript;
use rand::Rng;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One or two consecutive transcribed words sharing a single on-screen
/// display interval.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionBurst {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

pub const POP_SECONDS: f64 = 0.1;
const TWO_WORD_PROBABILITY: f64 = 0.3;

/// Caption scale over time since burst start: pops in at 110% and settles
/// quadratically to 100%.
pub fn pop_scale(t: f64) -> f64 {
    if t <= 0.0 {
        return 1.1;
    }
    (1.1 - (t / POP_SECONDS).powi(2)).max(1.0)
}

/// Time after burst start at which `pop_scale` reaches 1.0.
pub fn pop_settle_seconds() -> f64 {
    POP_SECONDS * 0.1_f64.sqrt()
}

/// Walk each segment left to right, taking two words as one burst with
/// probability 0.3 and one word otherwise. Bursts never span segments.
pub fn group_bursts<R: Rng>(transcript: &Transcript, rng: &mut R) -> Vec<CaptionBurst> {
    let mut bursts = Vec::new();
    for segment in &transcript.segments {
        let words = &segment.words;
        let mut i = 0;
        while i < words.len() {
            let take = if i + 1 < words.len() && rng.gen_bool(TWO_WORD_PROBABILITY) {
                2
            } else {
                1
            };
            let group = &words[i..i + take];
            let text = group
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            bursts.push(CaptionBurst {
                text,
                start: group[0].start,
                end: group[take - 1].end,
            });
            i += take;
        }
    }
    bursts
}

/// Write the bursts as an ASS subtitle file for ffmpeg's `ass` filter. Each
/// burst gets two stacked events sharing one scale animation: a thick black
/// stroke layer under a white fill layer. `offset` shifts burst times onto
/// the final video timeline (the body narration starts after the intro).
pub fn write_ass(path: &Path, bursts: &[CaptionBurst], offset: f64) -> anyhow::Result<()> {
    let mut f = File::create(path)?;
    writeln!(f, "[Script Info]")?;
    writeln!(f, "ScriptType: v4.00+")?;
    writeln!(f, "PlayResX: 1080")?;
    writeln!(f, "PlayResY: 1920")?;
    writeln!(f, "WrapStyle: 0")?;
    writeln!(f, "ScaledBorderAndShadow: yes")?;
    writeln!(f)?;
    writeln!(f, "[V4+ Styles]")?;
    writeln!(
        f,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    )?;
    writeln!(
        f,
        "Style: Stroke,Barlow ExtraBold,110,&H00000000,&H00000000,&H00000000,&H00000000,-1,0,0,0,100,100,0,0,1,8,0,5,40,40,0,1"
    )?;
    writeln!(
        f,
        "Style: Fill,Barlow ExtraBold,110,&H00FFFFFF,&H00FFFFFF,&H00000000,&H00000000,-1,0,0,0,100,100,0,0,1,0,0,5,40,40,0,1"
    )?;
    writeln!(f)?;
    writeln!(f, "[Events]")?;
    writeln!(
        f,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    )?;

    // \t with accel 2 reproduces the quadratic settle of pop_scale.
    let start_pct = (pop_scale(0.0) * 100.0).round() as u64;
    let settle_ms = (pop_settle_seconds() * 1000.0).round() as u64;
    let anim = format!(
        r"{{\fscx{start_pct}\fscy{start_pct}\t(0,{settle_ms},2,\fscx100\fscy100)}}"
    );

    for burst in bursts {
        let start = format_ass_time(burst.start + offset);
        let end = format_ass_time(burst.end + offset);
        let text = sanitize(&burst.text);
        writeln!(f, "Dialogue: 0,{start},{end},Stroke,,0,0,0,,{anim}{text}")?;
        writeln!(f, "Dialogue: 1,{start},{end},Fill,,0,0,0,,{anim}{text}")?;
    }
    Ok(())
}

fn sanitize(text: &str) -> String {
    text.replace('{', "(").replace('}', ")").replace('\n', " ")
}

fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_sec = total_cs / 100;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{Segment, Transcript, Word};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start,
            end,
        }
    }

    fn sample_transcript() -> Transcript {
        Transcript {
            segments: vec![
                Segment {
                    words: vec![
                        word("So", 0.0, 0.2),
                        word("this", 0.2, 0.4),
                        word("happened", 0.4, 0.9),
                        word("yesterday", 0.9, 1.5),
                    ],
                },
                Segment {
                    words: vec![word("honestly", 1.6, 2.1), word("wild", 2.1, 2.4)],
                },
            ],
        }
    }

    #[test]
    fn every_word_appears_exactly_once() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let bursts = group_bursts(&sample_transcript(), &mut rng);
            let joined = bursts
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            assert_eq!(joined, "So this happened yesterday honestly wild");
        }
    }

    #[test]
    fn bursts_are_time_ordered_with_non_decreasing_starts() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let bursts = group_bursts(&sample_transcript(), &mut rng);
            for pair in bursts.windows(2) {
                assert!(pair[0].start <= pair[1].start);
            }
            for b in &bursts {
                assert!(b.start <= b.end);
            }
        }
    }

    #[test]
    fn burst_interval_spans_first_start_to_last_end() {
        let mut rng = StdRng::seed_from_u64(0);
        let bursts = group_bursts(&sample_transcript(), &mut rng);
        assert!((bursts[0].start - 0.0).abs() < 1e-9);
        assert!((bursts.last().unwrap().end - 2.4).abs() < 1e-9);
    }

    #[test]
    fn pop_scale_starts_high_and_settles() {
        assert!((pop_scale(0.0) - 1.1).abs() < 1e-9);
        assert!((pop_scale(pop_settle_seconds()) - 1.0).abs() < 1e-9);
        assert!((pop_scale(0.5) - 1.0).abs() < 1e-9);
        let mut prev = pop_scale(0.0);
        for i in 1..=100 {
            let s = pop_scale(i as f64 * 0.001);
            assert!(s <= prev + 1e-12);
            prev = s;
        }
    }

    #[test]
    fn ass_file_has_two_layers_per_burst_and_applies_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.ass");
        let bursts = vec![CaptionBurst {
            text: "Hello world".to_string(),
            start: 1.0,
            end: 1.5,
        }];
        write_ass(&path, &bursts, 3.0).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Dialogue:").count(), 2);
        assert!(content.contains("0:00:04.00"));
        assert!(content.contains("0:00:04.50"));
        assert!(content.contains(r"\fscx110"));
        assert!(content.contains("Style: Stroke"));
        assert!(content.contains("Style: Fill"));
    }

    #[test]
    fn ass_text_strips_braces() {
        assert_eq!(sanitize("a {b}\nc"), "a (b) c");
    }
}

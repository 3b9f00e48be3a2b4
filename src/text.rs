use regex::{Captures, Regex};

/// Expand the Reddit shorthand a narrator cannot read aloud: subreddit
/// abbreviations and age/gender parentheticals like "(25F)".
pub fn parse_text(text: &str) -> String {
    let mut out = Regex::new(r"(?i)\bAITAH?\b")
        .unwrap()
        .replace_all(text, "Am I the Asshole?")
        .into_owned();
    out = Regex::new(r"(?i)\bWIBTA\b")
        .unwrap()
        .replace_all(&out, "Would I Be the Asshole?")
        .into_owned();
    out = Regex::new(r"(?i)\bTIFU\b")
        .unwrap()
        .replace_all(&out, "Today I F'd Up")
        .into_owned();

    let age_gender = Regex::new(r"\((\d{1,3})\s*([MmFf])\)").unwrap();
    age_gender
        .replace_all(&out, |caps: &Captures| {
            let sex = if caps[2].eq_ignore_ascii_case("f") {
                "Female"
            } else {
                "Male"
            };
            format!("({} {})", sex, &caps[1])
        })
        .into_owned()
}

/// Star out the vowels of listed profanity, case-insensitively:
/// "fuck this shit" -> "f*ck this sh*t".
pub fn censor_text(text: &str) -> String {
    let re = Regex::new(r"(?i)\b(fuck|shit|bitch|cunt|dick|piss)\w*").unwrap();
    re.replace_all(text, |caps: &Captures| {
        caps[0]
            .chars()
            .map(|c| if "aeiouAEIOU".contains(c) { '*' } else { c })
            .collect::<String>()
    })
    .into_owned()
}

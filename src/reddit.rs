use anyhow::anyhow;
use reqwest::header::USER_AGENT;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RedditListing {
    pub data: RedditListingData,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData {
    pub children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild {
    pub data: RedditPost,
}

#[derive(Debug, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// Fetch a single submission by post URL. Reddit serves `<post-url>.json` as
/// a pair of listings; the first listing's first child is the post itself.
pub async fn fetch_submission(url: &str) -> anyhow::Result<Submission> {
    let json_url = json_endpoint(url);
    let client = reqwest::Client::new();
    let res = client
        .get(&json_url)
        .header(USER_AGENT, "redditshorts-bot-rust/0.1")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let listings: Vec<RedditListing> = serde_json::from_str(&res)?;
    let post = listings
        .into_iter()
        .next()
        .and_then(|l| l.data.children.into_iter().next())
        .ok_or_else(|| anyhow!("no submission found at {}", url))?
        .data;

    Ok(Submission {
        id: post.id,
        title: post.title.trim().to_string(),
        body: post.selftext.trim().to_string(),
    })
}

/// Share links carry query strings or fragments ("?utm_source=share");
/// those must come off before the `.json` suffix goes on.
fn json_endpoint(url: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    format!("{}.json", base.trim_end_matches('/'))
}

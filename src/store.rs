use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const VIDEOS_FILE: &str = "generated_videos.json";
pub const AUDIO_FILE: &str = "generated_audio.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedVideoRecord {
    pub url: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFileRecord {
    pub submission_id: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Path-keyed JSON records of finished videos and synthesized audio.
/// Updates take a scoped lock file and land via an atomic rename, so a
/// concurrent run fails fast instead of silently clobbering records.
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create store dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn record_video(&self, path: &Path, record: FinishedVideoRecord) -> anyhow::Result<()> {
        self.update(VIDEOS_FILE, path, record)
    }

    pub fn record_audio(&self, path: &Path, record: AudioFileRecord) -> anyhow::Result<()> {
        self.update(AUDIO_FILE, path, record)
    }

    pub fn videos(&self) -> anyhow::Result<BTreeMap<String, FinishedVideoRecord>> {
        self.load(VIDEOS_FILE)
    }

    pub fn audio(&self) -> anyhow::Result<BTreeMap<String, AudioFileRecord>> {
        self.load(AUDIO_FILE)
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> anyhow::Result<BTreeMap<String, T>> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read_to_string(&path)?;
        serde_json::from_str(&data)
            .with_context(|| format!("corrupt bookkeeping file {}", path.display()))
    }

    fn update<T: Serialize + DeserializeOwned>(
        &self,
        file: &str,
        key: &Path,
        value: T,
    ) -> anyhow::Result<()> {
        let _lock = StoreLock::acquire(&self.dir.join(format!("{file}.lock")))?;
        let mut map: BTreeMap<String, T> = self.load(file)?;
        map.insert(key.to_string_lossy().into_owned(), value);

        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(&map)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(path: &Path) -> anyhow::Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(Self {
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => bail!(
                "bookkeeping is locked by another run ({}); remove the file if that run is dead",
                path.display()
            ),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_record(url: &str) -> FinishedVideoRecord {
        FinishedVideoRecord {
            url: url.to_string(),
            title: "a title".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn records_survive_reload_keyed_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .record_video(Path::new("out/a.mp4"), video_record("https://www.reddit.com/r/x/1"))
            .unwrap();
        store
            .record_video(Path::new("out/b.mp4"), video_record("https://www.reddit.com/r/x/2"))
            .unwrap();

        let videos = Store::open(dir.path()).unwrap().videos().unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos["out/a.mp4"].url, "https://www.reddit.com/r/x/1");
    }

    #[test]
    fn rerecording_same_path_overwrites_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .record_video(Path::new("out/a.mp4"), video_record("first"))
            .unwrap();
        store
            .record_video(Path::new("out/a.mp4"), video_record("second"))
            .unwrap();
        let videos = store.videos().unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos["out/a.mp4"].url, "second");
    }

    #[test]
    fn held_lock_rejects_a_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let lock_path = dir.path().join(format!("{VIDEOS_FILE}.lock"));
        fs::write(&lock_path, b"").unwrap();
        assert!(
            store
                .record_video(Path::new("out/a.mp4"), video_record("u"))
                .is_err()
        );
        fs::remove_file(&lock_path).unwrap();
        assert!(
            store
                .record_video(Path::new("out/a.mp4"), video_record("u"))
                .is_ok()
        );
    }

    #[test]
    fn lock_is_released_after_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let audio = AudioFileRecord {
            submission_id: "abc".to_string(),
            kind: "title".to_string(),
            created_at: Utc::now(),
        };
        store.record_audio(Path::new("a.wav"), audio.clone()).unwrap();
        assert!(!dir.path().join(format!("{AUDIO_FILE}.lock")).exists());
        store.record_audio(Path::new("b.wav"), audio).unwrap();
        assert_eq!(store.audio().unwrap().len(), 2);
    }
}

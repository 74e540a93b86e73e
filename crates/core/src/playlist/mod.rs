use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

/// A single catalog entry. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub source_url: String,
    pub cover_image_url: String,
}

impl Song {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        source_url: impl Into<String>,
        cover_image_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            source_url: source_url.into(),
            cover_image_url: cover_image_url.into(),
        }
    }
}

/// Fixed, ordered, non-empty list of songs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Playlist {
    songs: Vec<Song>,
}

impl Playlist {
    pub fn new(songs: Vec<Song>) -> Result<Self> {
        if songs.is_empty() {
            return Err(PlayerError::InvalidInput(
                "a playlist needs at least one song",
            ));
        }
        Ok(Self { songs })
    }

    /// The catalog compiled into the widget.
    pub fn catalog() -> Self {
        const CATALOG: [(&str, &str, &str, &str); 8] = [
            (
                "Under Bright Lights (ft. Indy Skies)",
                "TWERL & Ekko & Sidetrack",
                "/music/song1.mp3",
                "/images/cover1.jpg",
            ),
            ("Bring Me Back", "zekk", "/music/song2.mp3", "/images/cover2.jpg"),
            (
                "Highscore",
                "Teminite & Panda Eyes",
                "/music/song3.mp3",
                "/images/cover3.jpg",
            ),
            (
                "AbsoluTe disoRdeR",
                "Acute Disarray",
                "/music/song4.mp3",
                "/images/cover4.png",
            ),
            (
                "I Really Want to Stay at Your House",
                "Samuel Kim Lorien",
                "/music/song5.mp3",
                "/images/cover5.jpg",
            ),
            ("All Night", "KILL SCRIPT", "/music/song6.mp3", "/images/cover6.jpg"),
            ("Make U SWEAT!", "Knock2", "/music/song7.mp3", "/images/cover7.jpg"),
            ("THE SIXTH SENSE", "Reol", "/music/song8.mp3", "/images/cover8.jpg"),
        ];

        Self {
            songs: CATALOG
                .iter()
                .map(|(title, artist, url, cover)| Song::new(*title, *artist, *url, *cover))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }
}

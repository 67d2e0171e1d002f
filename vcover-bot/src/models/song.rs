//! Song search candidates

use serde::{Deserialize, Serialize};

/// Maximum number of candidates offered for selection
pub const MAX_SONG_CANDIDATES: usize = 10;

/// One search hit offered to the user
///
/// Lives only for the duration of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongCandidate {
    /// Search backend song id, passed to inference as `song_name_src`
    pub id: String,
    pub name: String,
    /// Display string of all credited artists
    pub artists: String,
}

/// Numbered song listing shown before the song choice
pub fn format_song_listing(songs: &[SongCandidate]) -> String {
    let lines = songs
        .iter()
        .take(MAX_SONG_CANDIDATES)
        .enumerate()
        .map(|(i, s)| format!("{}. {} - {}", i + 1, s.name, s.artists))
        .collect::<Vec<_>>();
    format!("为您找到以下歌曲：\n{}", lines.join("\n"))
}

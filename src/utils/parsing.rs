use anyhow::Result;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Pls,
    M3u,
}

/// Playlist helpers for station URLs that point at `.pls` / `.m3u` files
/// rather than at the stream itself.
pub struct ParsingUtils;

impl ParsingUtils {
    /// Classify a URL by the extension of its path, ignoring any query string.
    pub fn playlist_kind(url: &str) -> Option<PlaylistKind> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        if path.ends_with(".pls") {
            Some(PlaylistKind::Pls)
        } else if path.ends_with(".m3u") || path.ends_with(".m3u8") {
            Some(PlaylistKind::M3u)
        } else {
            None
        }
    }

    /// First `FileN=` entry of a .pls playlist.
    pub fn parse_pls_content(content: &str) -> Option<String> {
        content.lines().map(str::trim).find_map(|line| {
            let (key, value) = line.split_once('=')?;
            let is_file_key = key
                .strip_prefix("File")
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            (is_file_key && !value.trim().is_empty()).then(|| value.trim().to_string())
        })
    }

    /// First non-comment line of an .m3u / .m3u8 playlist.
    pub fn parse_m3u_content(content: &str) -> Option<String> {
        content
            .lines()
            .map(|line| line.trim().trim_start_matches('\u{feff}'))
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
    }

    /// Resolve a station URL to a playable stream URL. Direct stream URLs are
    /// returned unchanged; playlists are fetched and their first entry used.
    pub async fn resolve_stream_url(client: &reqwest::Client, url: &str) -> Result<String> {
        let Some(kind) = Self::playlist_kind(url) else {
            return Ok(url.to_string());
        };

        debug!("Fetching playlist {}", url);
        let content = client.get(url).send().await?.error_for_status()?.text().await?;

        let stream = match kind {
            PlaylistKind::Pls => Self::parse_pls_content(&content),
            PlaylistKind::M3u => Self::parse_m3u_content(&content),
        };

        match stream {
            Some(stream) => {
                debug!("Playlist {} resolved to {}", url, stream);
                Ok(stream)
            }
            None => anyhow::bail!("No stream URL found in playlist {}", url),
        }
    }
}

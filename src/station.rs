use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Longest now-playing line shown in the display panel.
const NOW_PLAYING_MAX_CHARS: usize = 47;
const DEFAULT_PRIORITY: i64 = 1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Location {
    #[serde(deserialize_with = "deserialize_text")]
    pub city: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub state: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub country: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            city: String::new(),
            state: String::new(),
            country: "US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Socials {
    #[serde(deserialize_with = "deserialize_text")]
    pub twitter: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub instagram: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NowPlaying {
    #[serde(deserialize_with = "deserialize_optional_text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_text")]
    pub artist: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_text")]
    pub show: Option<String>,
}

/// One configured radio source.
///
/// Every optional field has a documented default which is applied while
/// deserializing, so a record in the station file only needs `name`, `url`
/// and `frequency`. Keys this struct does not know about are kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Station {
    #[serde(deserialize_with = "deserialize_text")]
    pub name: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub url: String,
    /// Display label, not necessarily numeric ("98.5", "DAB", ...).
    #[serde(deserialize_with = "deserialize_text")]
    pub frequency: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub genre: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub format: String,
    #[serde(deserialize_with = "deserialize_or_default")]
    pub location: Location,
    #[serde(deserialize_with = "deserialize_text")]
    pub language: String,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub bitrate: Option<u32>,
    #[serde(deserialize_with = "deserialize_text")]
    pub codec: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub logo: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub description: String,
    #[serde(deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_flag_or_false")]
    pub favorite: bool,
    #[serde(deserialize_with = "deserialize_optional_text")]
    pub last_played: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub popularity: Option<u32>,
    #[serde(deserialize_with = "deserialize_text")]
    pub stream_type: String,
    #[serde(deserialize_with = "deserialize_flag_or_true")]
    pub is_live: bool,
    #[serde(deserialize_with = "deserialize_tags")]
    pub fallback_urls: Vec<String>,
    #[serde(deserialize_with = "deserialize_text")]
    pub status: String,
    #[serde(deserialize_with = "deserialize_optional_number")]
    pub latency_ms: Option<u32>,
    #[serde(deserialize_with = "deserialize_or_default")]
    pub now_playing: Option<NowPlaying>,
    #[serde(deserialize_with = "deserialize_text")]
    pub schedule_url: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub website: String,
    #[serde(deserialize_with = "deserialize_or_default")]
    pub socials: Socials,
    /// 0 means "unset"; the store replaces it with the list position on load.
    #[serde(deserialize_with = "deserialize_dial_position")]
    pub dial_position: u32,
    #[serde(deserialize_with = "deserialize_text")]
    pub band: String,
    #[serde(deserialize_with = "deserialize_text")]
    pub hd_channel: String,
    #[serde(deserialize_with = "deserialize_priority")]
    pub priority: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Station {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            frequency: String::new(),
            genre: String::new(),
            format: "streaming".to_string(),
            location: Location::default(),
            language: "en".to_string(),
            bitrate: None,
            codec: String::new(),
            logo: String::new(),
            description: String::new(),
            tags: Vec::new(),
            favorite: false,
            last_played: None,
            popularity: None,
            stream_type: "icecast".to_string(),
            is_live: true,
            fallback_urls: Vec::new(),
            status: "unknown".to_string(),
            latency_ms: None,
            now_playing: None,
            schedule_url: String::new(),
            website: String::new(),
            socials: Socials::default(),
            dial_position: 0,
            band: "FM".to_string(),
            hd_channel: String::new(),
            priority: DEFAULT_PRIORITY,
            extra: Map::new(),
        }
    }
}

impl Station {
    pub fn new(name: impl Into<String>, url: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            frequency: frequency.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unknown"
        } else {
            &self.name
        }
    }

    pub fn display_frequency(&self) -> &str {
        if self.frequency.is_empty() {
            "??"
        } else {
            &self.frequency
        }
    }

    /// Whether the label reads as a number, so a unit can be shown after it.
    pub fn has_numeric_frequency(&self) -> bool {
        self.frequency
            .trim()
            .parse::<f64>()
            .is_ok_and(f64::is_finite)
    }

    /// Case-insensitive search match. `query` must already be lowercased.
    pub fn matches(&self, query: &str) -> bool {
        let hit = |field: &str| field.to_lowercase().contains(query);

        hit(&self.name)
            || hit(&self.frequency)
            || hit(&self.genre)
            || hit(&self.description)
            || self.tags.iter().any(|tag| hit(tag))
            || hit(&self.location.city)
            || hit(&self.location.state)
    }

    /// Single "artist – title  (show)" line, truncated to fit the display.
    pub fn now_playing_text(&self) -> String {
        let Some(np) = &self.now_playing else {
            return String::new();
        };

        let field = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();
        let (title, artist, show) = (field(&np.title), field(&np.artist), field(&np.show));

        let mut parts = Vec::new();
        if !artist.is_empty() && !title.is_empty() {
            parts.push(format!("{} – {}", artist, title));
        } else if !title.is_empty() {
            parts.push(title);
        }
        if !show.is_empty() {
            parts.push(format!("({})", show));
        }

        truncate_with_ellipsis(&parts.join("  "), NOW_PLAYING_MAX_CHARS)
    }

    /// Station name followed by genre, bitrate and description when present.
    pub fn summary(&self) -> String {
        let mut sub = Vec::new();
        let genre = self.genre.trim();
        if !genre.is_empty() {
            sub.push(genre.to_string());
        }
        if let Some(bitrate) = self.bitrate {
            sub.push(format!("{} kbps", bitrate));
        }
        let description = self.description.trim();
        if !description.is_empty() {
            sub.push(description.to_string());
        }

        if sub.is_empty() {
            self.display_name().to_string()
        } else {
            format!("{}  ·  {}", self.display_name(), sub.join("  ·  "))
        }
    }

    pub fn list_label(&self) -> String {
        format!("  {}  {}", self.display_frequency(), self.display_name())
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars - 1).collect();
    format!("{}…", head.trim_end())
}

/// Strings may be written as numbers (`"frequency": 98.5`) or `null`.
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Number(serde_json::Number),
        Bool(bool),
    }

    match Option::<TextOrNumber>::deserialize(deserializer) {
        Ok(Some(TextOrNumber::Text(s))) => Ok(s),
        Ok(Some(TextOrNumber::Number(n))) => Ok(n.to_string()),
        Ok(Some(TextOrNumber::Bool(b))) => Ok(b.to_string()),
        Ok(None) | Err(_) => Ok(String::new()),
    }
}

fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(deserialize_text(deserializer)?).filter(|s| !s.is_empty()))
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer) {
        Ok(StringOrVec::String(s)) if s.is_empty() => Ok(vec![]),
        Ok(StringOrVec::String(s)) => Ok(vec![s]),
        Ok(StringOrVec::Vec(v)) => Ok(v),
        Err(_) => Ok(vec![]),
    }
}

fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
    }

    match Option::<StringOrNumber>::deserialize(deserializer) {
        Ok(Some(StringOrNumber::String(s))) => Ok(s.trim().parse().ok()),
        Ok(Some(StringOrNumber::Number(n))) if n >= 0.0 && n <= u32::MAX as f64 => {
            Ok(Some(n as u32))
        }
        _ => Ok(None),
    }
}

fn deserialize_dial_position<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_optional_number(deserializer).map(Option::unwrap_or_default)
}

/// Values of the wrong shape (`"location": "Berlin"`) fall back to the
/// field's default instead of rejecting the whole station.
fn deserialize_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Accepts `true`, `"yes"`, `"1"`, `0` and the like.
fn deserialize_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn deserialize_flag_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_optional_flag(deserializer).map(|flag| flag.unwrap_or(false))
}

fn deserialize_flag_or_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_optional_flag(deserializer).map(|flag| flag.unwrap_or(true))
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let priority = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64),
        _ => None,
    };
    Ok(priority.unwrap_or(DEFAULT_PRIORITY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_record_gets_defaults() {
        let station: Station =
            serde_json::from_str(r#"{"name":"A","url":"http://x/a","frequency":"90.0"}"#).unwrap();

        assert_eq!(station.name, "A");
        assert_eq!(station.format, "streaming");
        assert_eq!(station.location.country, "US");
        assert_eq!(station.language, "en");
        assert_eq!(station.stream_type, "icecast");
        assert_eq!(station.band, "FM");
        assert_eq!(station.priority, 1);
        assert!(station.is_live);
        assert!(!station.favorite);
        assert_eq!(station.bitrate, None);
        assert_eq!(station.dial_position, 0);
        assert!(station.extra.is_empty());
    }

    #[test]
    fn test_lenient_fields() {
        let station: Station = serde_json::from_str(
            r#"{"name":"B","url":"http://x/b","frequency":91.5,"tags":"jazz","bitrate":"128","genre":null}"#,
        )
        .unwrap();

        assert_eq!(station.frequency, "91.5");
        assert_eq!(station.tags, vec!["jazz".to_string()]);
        assert_eq!(station.bitrate, Some(128));
        assert_eq!(station.genre, "");
    }

    #[test]
    fn test_mistyped_fields_fall_back_to_defaults() {
        let station: Station = serde_json::from_str(
            r#"{"name":"A","url":"http://x/a","frequency":"90.0",
                "priority":"2","favorite":"yes","isLive":"no",
                "location":"Berlin","socials":"none","nowPlaying":"live"}"#,
        )
        .unwrap();

        assert_eq!(station.priority, 2);
        assert!(station.favorite);
        assert!(!station.is_live);
        assert_eq!(station.location, Location::default());
        assert_eq!(station.socials, Socials::default());
        assert_eq!(station.now_playing, None);

        let station: Station = serde_json::from_str(
            r#"{"name":"B","priority":"high","favorite":{},"isLive":null}"#,
        )
        .unwrap();
        assert_eq!(station.priority, DEFAULT_PRIORITY);
        assert!(!station.favorite);
        assert!(station.is_live);
    }

    #[test]
    fn test_numeric_frequency() {
        assert!(Station::new("A", "", "98.5").has_numeric_frequency());
        assert!(Station::new("A", "", " 101 ").has_numeric_frequency());
        assert!(!Station::new("A", "", "DAB").has_numeric_frequency());
        assert!(!Station::new("A", "", "—").has_numeric_frequency());
        assert!(!Station::new("A", "", "").has_numeric_frequency());
        assert!(!Station::new("A", "", "inf").has_numeric_frequency());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let json = r#"{"name":"C","url":"http://x/c","frequency":"1","custom":{"k":[1,2]}}"#;
        let station: Station = serde_json::from_str(json).unwrap();
        assert!(station.extra.contains_key("custom"));

        let back: Station = serde_json::from_str(&serde_json::to_string(&station).unwrap()).unwrap();
        assert_eq!(back, station);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(Station::new("D", "http://x/d", "92.1")).unwrap();
        assert!(value.get("dialPosition").is_some());
        assert!(value.get("fallbackUrls").is_some());
        assert!(value.get("dial_position").is_none());
    }

    #[test]
    fn test_matches_name_tags_and_location() {
        let mut station = Station::new("Groove Salad", "http://x", "88.1");
        station.tags = vec!["Ambient".to_string()];
        station.location.city = "San Francisco".to_string();

        assert!(station.matches("groove"));
        assert!(station.matches("88.1"));
        assert!(station.matches("ambient"));
        assert!(station.matches("francisco"));
        assert!(!station.matches("polka"));
    }

    #[test]
    fn test_now_playing_text() {
        let mut station = Station::new("E", "http://x", "1");
        assert_eq!(station.now_playing_text(), "");

        station.now_playing = Some(NowPlaying {
            title: Some("Song".to_string()),
            artist: Some("Band".to_string()),
            show: Some("Morning".to_string()),
        });
        assert_eq!(station.now_playing_text(), "Band – Song  (Morning)");

        station.now_playing = Some(NowPlaying {
            title: Some("x".repeat(80)),
            ..NowPlaying::default()
        });
        let text = station.now_playing_text();
        assert_eq!(text.chars().count(), NOW_PLAYING_MAX_CHARS);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn test_summary() {
        let mut station = Station::new("F", "http://x", "1");
        assert_eq!(station.summary(), "F");

        station.genre = "Jazz".to_string();
        station.bitrate = Some(128);
        station.description = "Smooth".to_string();
        assert_eq!(station.summary(), "F  ·  Jazz  ·  128 kbps  ·  Smooth");
    }
}

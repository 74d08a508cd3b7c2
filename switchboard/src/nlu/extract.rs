//! Per-intent parameter extractors.
//!
//! Each extractor is a pure function from the lowercased utterance (and its
//! tokens) to a parameter map. Keyword groups and patterns live in tables
//! so the dispatch loop stays uniform.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

static BY_ARTIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"by\s+([^,\n]+)").unwrap());
static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").unwrap());
static PERCENTAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());
static PIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"pin\s*(\d+)|gpio\s*(\d+)").unwrap());
static PIN_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"to\s+(\d+)|value\s+(\d+)|(\d+)%").unwrap());
static TEMPERATURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*degrees?|(\d+)°").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static FS_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/\\][\w\s/\\.-]+").unwrap());
static DESTINATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"to\s+([^,\n]+)").unwrap());

type Params = BTreeMap<String, String>;

/// Dispatches to the extractor for `intent`; intents without one (e.g.
/// question_answer, follow_up) yield an empty map.
pub(crate) fn extract(intent: &str, text: &str, tokens: &[&str]) -> Params {
    match intent {
        "play_music" => music(text, tokens),
        "control_volume" => volume(text),
        "switch_audio" => audio_device(text),
        "system_control" => system(tokens),
        "hardware_control" => hardware(text),
        "smart_home" => smart_home(text),
        "file_operation" => file_operation(text),
        "navigation" => navigation(text),
        _ => Params::new(),
    }
}

/// First group keyword found in `text` wins.
fn detect(text: &str, groups: &[(&str, &[&str])]) -> Option<String> {
    for (label, keywords) in groups {
        if keywords.iter().any(|k| text.contains(k)) {
            return Some((*label).to_string());
        }
    }
    None
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().trim().to_string())
    })
}

fn music(text: &str, tokens: &[&str]) -> Params {
    let mut params = Params::new();

    if let Some(artist) = first_capture(&BY_ARTIST, text) {
        params.insert("artist".into(), artist);
    }

    const GENRES: &[&str] = &[
        "jazz",
        "rock",
        "classical",
        "pop",
        "electronic",
        "ambient",
        "folk",
        "metal",
        "blues",
        "country",
    ];
    if let Some(genre) = GENRES.iter().find(|g| text.contains(*g)) {
        params.insert("genre".into(), (*genre).to_string());
    }

    const PLATFORMS: &[&str] = &["spotify", "apple music", "youtube", "soundcloud"];
    if let Some(platform) = PLATFORMS.iter().find(|p| text.contains(*p)) {
        params.insert("platform".into(), (*platform).to_string());
    }

    if let Some(mood) = detect(
        text,
        &[
            ("relaxing", &["relaxing", "calm", "peaceful", "chill"]),
            ("energetic", &["energetic", "upbeat", "fast", "dance"]),
            ("sad", &["sad", "melancholy", "depressing"]),
            ("happy", &["happy", "cheerful", "uplifting"]),
        ],
    ) {
        params.insert("mood".into(), mood);
    }

    // Nothing specific matched: fall back to the utterance minus stopwords.
    if params.is_empty() {
        const STOPWORDS: &[&str] = &["play", "music", "song", "some"];
        let query: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|t| !STOPWORDS.contains(t))
            .collect();
        if !query.is_empty() {
            params.insert("query".into(), query.join(" "));
        }
    }

    params
}

fn volume(text: &str) -> Params {
    let mut params = Params::new();

    if let Some(action) = detect(
        text,
        &[
            ("up", &["up", "higher", "louder", "increase"]),
            ("down", &["down", "lower", "quieter", "decrease"]),
            ("mute", &["mute", "silent", "off"]),
            ("unmute", &["unmute", "on"]),
            ("max", &["max", "maximum", "full"]),
            ("min", &["min", "minimum"]),
        ],
    ) {
        params.insert("action".into(), action);
    }

    // Standalone integer in [0, 100], or an explicit percentage.
    if let Some(level) = first_capture(&BARE_NUMBER, text) {
        if level.parse::<u32>().map_or(false, |n| n <= 100) {
            params.insert("level".into(), level);
        }
    }
    if let Some(level) = first_capture(&PERCENTAGE, text) {
        params.insert("level".into(), level);
    }

    params
}

fn audio_device(text: &str) -> Params {
    let mut params = Params::new();
    if let Some(device) = detect(
        text,
        &[
            ("headphones", &["headphones", "headset", "earbuds"]),
            ("speakers", &["speakers", "speaker"]),
            ("bluetooth", &["bluetooth", "bt"]),
            ("rtsp", &["rtsp", "network", "streaming"]),
            ("hdmi", &["hdmi", "tv", "television"]),
            ("usb", &["usb"]),
        ],
    ) {
        params.insert("device".into(), device);
    }
    params
}

fn system(tokens: &[&str]) -> Params {
    const ACTIONS: &[&str] = &[
        "open", "close", "launch", "run", "execute", "kill", "start", "stop",
    ];
    let mut params = Params::new();
    for (i, token) in tokens.iter().enumerate() {
        if ACTIONS.contains(token) {
            params.insert("action".into(), (*token).to_string());
            if i + 1 < tokens.len() {
                params.insert("target".into(), tokens[i + 1..].join(" "));
            }
            break;
        }
    }
    params
}

fn hardware(text: &str) -> Params {
    let mut params = Params::new();

    if let Some(pin) = first_capture(&PIN, text) {
        params.insert("pin".into(), pin);
    }

    if let Some(action) = detect(
        text,
        &[
            ("on", &["on", "high", "enable", "activate"]),
            ("off", &["off", "low", "disable", "deactivate"]),
            ("toggle", &["toggle", "switch"]),
            ("read", &["read", "get", "check"]),
            ("write", &["write", "set"]),
        ],
    ) {
        params.insert("action".into(), action);
    }

    if let Some(value) = first_capture(&PIN_VALUE, text) {
        params.insert("value".into(), value);
    }

    params
}

fn smart_home(text: &str) -> Params {
    let mut params = Params::new();

    if let Some(device_type) = detect(
        text,
        &[
            ("lights", &["lights", "light", "lamp", "bulb"]),
            (
                "temperature",
                &["temperature", "thermostat", "heating", "cooling"],
            ),
            ("security", &["lock", "unlock", "alarm", "camera", "door"]),
            ("blinds", &["blinds", "curtains", "shades"]),
        ],
    ) {
        params.insert("device_type".into(), device_type);
    }

    if let Some(action) = detect(
        text,
        &[
            ("unlock", &["unlock"]),
            ("lock", &["lock"]),
            ("on", &["turn on", "on", "enable"]),
            ("off", &["turn off", "off", "disable"]),
            ("dim", &["dim", "dimmer"]),
            ("brighten", &["brighten", "brighter"]),
        ],
    ) {
        params.insert("action".into(), action);
    }

    const ROOMS: &[&str] = &[
        "living room",
        "bedroom",
        "kitchen",
        "bathroom",
        "office",
        "garage",
    ];
    if let Some(room) = ROOMS.iter().find(|r| text.contains(*r)) {
        params.insert("location".into(), (*room).to_string());
    }

    if let Some(temperature) = first_capture(&TEMPERATURE, text) {
        params.insert("temperature".into(), temperature);
    }

    params
}

fn file_operation(text: &str) -> Params {
    let mut params = Params::new();

    if let Some(url) = URL.find(text) {
        params.insert("url".into(), url.as_str().to_string());
    }
    if let Some(path) = FS_PATH.find(text) {
        // Skip the path part of a URL already captured.
        if !params
            .get("url")
            .map_or(false, |u| u.contains(path.as_str()))
        {
            params.insert("path".into(), path.as_str().to_string());
        }
    }

    const ACTIONS: &[&str] = &[
        "download", "upload", "copy", "move", "delete", "create", "save",
    ];
    if let Some(action) = ACTIONS.iter().find(|a| text.contains(*a)) {
        params.insert("action".into(), (*action).to_string());
    }

    params
}

fn navigation(text: &str) -> Params {
    let mut params = Params::new();

    if let Some(destination) = first_capture(&DESTINATION, text) {
        params.insert("destination".into(), destination);
    }

    if let Some(mode) = detect(
        text,
        &[
            ("driving", &["drive", "driving", "car"]),
            ("walking", &["walk", "walking", "foot"]),
            ("transit", &["transit", "bus", "train", "public"]),
            ("cycling", &["bike", "cycling", "bicycle"]),
        ],
    ) {
        params.insert("mode".into(), mode);
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(intent: &str, text: &str) -> Params {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered.split_whitespace().collect();
        extract(intent, &lowered, &tokens)
    }

    #[test]
    fn music_captures_artist_genre_platform_mood() {
        let p = run("play_music", "play some relaxing jazz by Miles Davis on spotify");
        assert_eq!(p.get("artist").map(String::as_str), Some("miles davis on spotify"));
        assert_eq!(p.get("genre").map(String::as_str), Some("jazz"));
        assert_eq!(p.get("platform").map(String::as_str), Some("spotify"));
        assert_eq!(p.get("mood").map(String::as_str), Some("relaxing"));
    }

    #[test]
    fn music_falls_back_to_a_stopword_free_query() {
        let p = run("play_music", "play some daft punk music");
        assert_eq!(p.get("query").map(String::as_str), Some("daft punk"));
    }

    #[test]
    fn volume_maps_actions_and_levels() {
        let p = run("control_volume", "make it louder");
        assert_eq!(p.get("action").map(String::as_str), Some("up"));

        let p = run("control_volume", "set volume to 40");
        assert_eq!(p.get("level").map(String::as_str), Some("40"));

        let p = run("control_volume", "volume at 70%");
        assert_eq!(p.get("level").map(String::as_str), Some("70"));

        // Out-of-range integers are not levels.
        let p = run("control_volume", "volume 150");
        assert!(p.get("level").is_none());
    }

    #[test]
    fn audio_device_detection() {
        let p = run("switch_audio", "switch output to bluetooth");
        assert_eq!(p.get("device").map(String::as_str), Some("bluetooth"));
        let p = run("switch_audio", "change to the tv");
        assert_eq!(p.get("device").map(String::as_str), Some("hdmi"));
    }

    #[test]
    fn system_takes_the_remainder_as_target() {
        let p = run("system_control", "open the music player");
        assert_eq!(p.get("action").map(String::as_str), Some("open"));
        assert_eq!(p.get("target").map(String::as_str), Some("the music player"));
    }

    #[test]
    fn hardware_pin_action_value() {
        let p = run("hardware_control", "turn on gpio pin 18");
        assert_eq!(p.get("pin").map(String::as_str), Some("18"));
        assert_eq!(p.get("action").map(String::as_str), Some("on"));

        let p = run("hardware_control", "set pwm pin 12 to 80");
        assert_eq!(p.get("pin").map(String::as_str), Some("12"));
        assert_eq!(p.get("value").map(String::as_str), Some("80"));
        assert_eq!(p.get("action").map(String::as_str), Some("write"));
    }

    #[test]
    fn smart_home_room_and_temperature() {
        let p = run("smart_home", "set the kitchen temperature to 22 degrees");
        assert_eq!(p.get("device_type").map(String::as_str), Some("temperature"));
        assert_eq!(p.get("location").map(String::as_str), Some("kitchen"));
        assert_eq!(p.get("temperature").map(String::as_str), Some("22"));

        let p = run("smart_home", "unlock the front door");
        assert_eq!(p.get("device_type").map(String::as_str), Some("security"));
        assert_eq!(p.get("action").map(String::as_str), Some("unlock"));
    }

    #[test]
    fn file_operation_url_and_action() {
        let p = run("file_operation", "download https://example.com/a.zip");
        assert_eq!(
            p.get("url").map(String::as_str),
            Some("https://example.com/a.zip")
        );
        assert_eq!(p.get("action").map(String::as_str), Some("download"));

        let p = run("file_operation", "copy /tmp/report.txt");
        assert_eq!(p.get("path").map(String::as_str), Some("/tmp/report.txt"));
        assert_eq!(p.get("action").map(String::as_str), Some("copy"));
    }

    #[test]
    fn navigation_destination_and_mode() {
        let p = run("navigation", "navigate to the main station");
        assert_eq!(
            p.get("destination").map(String::as_str),
            Some("the main station")
        );

        let p = run("navigation", "walking directions to the park");
        assert_eq!(p.get("mode").map(String::as_str), Some("walking"));
    }
}

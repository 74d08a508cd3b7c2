//! Intent engine: maps an utterance to an [`IntentResult`].
//!
//! Intent definitions are data, not code: one static catalog consumed by a
//! single scoring loop, plus one extractor-dispatch table in [`extract`].
//! For a given utterance and context the result is deterministic.

mod extract;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::SessionContext;

/// Sentinel intent when nothing scored positively.
pub const INTENT_UNKNOWN: &str = "unknown";
/// Intent whose meaning is only defined relative to the previous turn.
pub const INTENT_FOLLOW_UP: &str = "follow_up";

/// Context-sensitive score boost attached to an intent definition.
pub struct ContextBoost {
    /// Boost applies when the session's last intent is one of these.
    pub last_intents: &'static [&'static str],
    /// Boost applies when the session's `location` variable contains one of
    /// these.
    pub locations: &'static [&'static str],
    pub amount: f64,
}

/// One row of the intent catalog.
pub struct IntentDef {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub weight: f64,
    pub requires_context: bool,
    pub boost: Option<ContextBoost>,
}

/// The fixed intent catalog.
pub const CATALOG: &[IntentDef] = &[
    IntentDef {
        name: "play_music",
        keywords: &[
            "play", "music", "song", "track", "album", "artist", "spotify", "youtube", "stream",
        ],
        weight: 1.0,
        requires_context: false,
        boost: Some(ContextBoost {
            last_intents: &["control_volume", "switch_audio"],
            locations: &[],
            amount: 0.3,
        }),
    },
    IntentDef {
        name: "control_volume",
        keywords: &[
            "volume", "loud", "quiet", "mute", "unmute", "louder", "quieter", "sound",
        ],
        weight: 1.0,
        requires_context: false,
        boost: Some(ContextBoost {
            last_intents: &["play_music"],
            locations: &[],
            amount: 0.2,
        }),
    },
    IntentDef {
        name: "switch_audio",
        keywords: &[
            "switch", "change", "output", "headphones", "speakers", "bluetooth", "rtsp", "device",
        ],
        weight: 1.0,
        requires_context: false,
        boost: Some(ContextBoost {
            last_intents: &["play_music", "control_volume"],
            locations: &[],
            amount: 0.2,
        }),
    },
    IntentDef {
        name: "system_control",
        keywords: &[
            "open", "close", "launch", "run", "execute", "kill", "start", "stop", "application",
        ],
        weight: 1.0,
        requires_context: false,
        boost: None,
    },
    IntentDef {
        name: "file_operation",
        keywords: &[
            "download", "upload", "copy", "move", "delete", "create", "save", "file",
        ],
        weight: 1.0,
        requires_context: false,
        boost: None,
    },
    IntentDef {
        name: "smart_home",
        keywords: &[
            "lights",
            "temperature",
            "thermostat",
            "lock",
            "unlock",
            "dim",
            "brightness",
            "home",
        ],
        weight: 1.0,
        requires_context: false,
        boost: Some(ContextBoost {
            last_intents: &[],
            locations: &["home", "house"],
            amount: 0.3,
        }),
    },
    IntentDef {
        name: "communication",
        keywords: &[
            "send", "call", "message", "text", "email", "whatsapp", "telegram", "notify",
        ],
        weight: 1.0,
        requires_context: false,
        boost: None,
    },
    IntentDef {
        name: "navigation",
        keywords: &[
            "directions", "navigate", "route", "map", "location", "traffic", "gps", "drive",
        ],
        weight: 1.0,
        requires_context: false,
        boost: None,
    },
    IntentDef {
        name: "hardware_control",
        keywords: &[
            "gpio", "pin", "sensor", "led", "relay", "pwm", "analog", "digital", "hardware",
        ],
        weight: 1.0,
        requires_context: false,
        boost: None,
    },
    IntentDef {
        name: "question_answer",
        keywords: &[
            "what", "how", "why", "when", "where", "who", "tell", "explain", "define",
        ],
        weight: 0.8,
        requires_context: false,
        boost: None,
    },
    IntentDef {
        name: INTENT_FOLLOW_UP,
        keywords: &[
            "yes", "no", "continue", "stop", "again", "repeat", "more", "next", "previous",
        ],
        weight: 0.5,
        requires_context: true,
        boost: None,
    },
];

/// Classification outcome for one utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    /// In [0, 1].
    pub confidence: f64,
    pub parameters: BTreeMap<String, String>,
    pub original_text: String,
    /// True when context boosted scoring or supplied missing parameters.
    pub context_used: bool,
    /// Up to three next-best `(intent, score)` pairs.
    pub alternatives: Vec<(String, f64)>,
}

impl IntentResult {
    pub fn unknown(text: &str) -> Self {
        Self {
            intent: INTENT_UNKNOWN.to_string(),
            confidence: 0.0,
            parameters: BTreeMap::new(),
            original_text: text.to_string(),
            context_used: false,
            alternatives: Vec::new(),
        }
    }
}

/// Deterministic intent classifier and parameter extractor.
#[derive(Default)]
pub struct IntentEngine;

impl IntentEngine {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `text`, optionally informed by session context.
    pub fn parse(&self, text: &str, context: Option<&SessionContext>) -> IntentResult {
        let lowered = text.to_lowercase();
        let lowered = lowered.trim();
        let tokens: Vec<&str> = lowered.split_whitespace().collect();
        if tokens.is_empty() {
            return IntentResult::unknown(text);
        }

        let mut scores: Vec<(&'static str, f64)> = Vec::new();
        let mut context_used = false;

        for def in CATALOG {
            let base = score_intent(lowered, &tokens, def, context.is_some());
            if base <= 0.0 {
                continue;
            }
            let boost = context
                .and_then(|ctx| def.boost.as_ref().map(|b| boost_for(b, ctx)))
                .unwrap_or(0.0);
            if boost > 0.0 {
                context_used = true;
            }
            scores.push((def.name, base + boost));
        }

        if scores.is_empty() {
            return IntentResult::unknown(text);
        }

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let (best_intent, best_score) = scores[0];
        let confidence = (best_score / tokens.len() as f64).min(1.0);
        let alternatives = scores
            .iter()
            .skip(1)
            .take(3)
            .map(|(name, score)| (name.to_string(), *score))
            .collect();

        IntentResult {
            intent: best_intent.to_string(),
            confidence,
            parameters: extract::extract(best_intent, lowered, &tokens),
            original_text: text.to_string(),
            context_used,
            alternatives,
        }
    }
}

/// Keyword hits plus a positional bonus for early keywords, scaled by the
/// intent weight. Context-requiring intents score zero without a session.
fn score_intent(text: &str, tokens: &[&str], def: &IntentDef, has_context: bool) -> f64 {
    if def.requires_context && !has_context {
        return 0.0;
    }

    let keyword_score = def
        .keywords
        .iter()
        .filter(|k| text.contains(*k))
        .count() as f64;

    let mut position_score = 0.0;
    for (i, token) in tokens.iter().take(5).enumerate() {
        if def.keywords.contains(token) {
            position_score += (5 - i) as f64 * 0.1;
        }
    }

    (keyword_score + position_score) * def.weight
}

fn boost_for(boost: &ContextBoost, context: &SessionContext) -> f64 {
    let mut amount = 0.0;
    if boost.last_intents.contains(&context.last_intent.as_str()) {
        amount += boost.amount;
    }
    if !boost.locations.is_empty() {
        if let Some(location) = context.variables.get("location") {
            let location = location.to_lowercase();
            if boost.locations.iter().any(|l| location.contains(l)) {
                amount += boost.amount;
            }
        }
    }
    amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InterfaceKind;
    use chrono::Utc;

    fn session() -> SessionContext {
        SessionContext {
            session_id: "sess_test".into(),
            user_id: "u1".into(),
            interface_type: InterfaceKind::Text,
            created_at: Utc::now(),
            last_accessed: Utc::now(),
            command_history: vec![],
            response_history: vec![],
            variables: BTreeMap::new(),
            last_intent: String::new(),
            last_parameters: BTreeMap::new(),
            last_used_service: String::new(),
            service_state: BTreeMap::new(),
        }
    }

    #[test]
    fn nonsense_scores_unknown() {
        let engine = IntentEngine::new();
        let result = engine.parse("banana helicopter", None);
        assert_eq!(result.intent, INTENT_UNKNOWN);
        assert_eq!(result.confidence, 0.0);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn early_keywords_earn_the_position_bonus() {
        let engine = IntentEngine::new();
        let first = engine.parse("play some jazz", None);
        assert_eq!(first.intent, "play_music");
        // "play" leads the utterance: hit (1.0) + position (0.5).
        assert!(first.confidence >= 0.5);
    }

    #[test]
    fn follow_up_requires_context() {
        let engine = IntentEngine::new();
        let without = engine.parse("yes", None);
        assert_eq!(without.intent, INTENT_UNKNOWN);

        let with = engine.parse("yes", Some(&session()));
        assert_eq!(with.intent, INTENT_FOLLOW_UP);
    }

    #[test]
    fn last_intent_boost_marks_context_used() {
        let engine = IntentEngine::new();
        let mut ctx = session();
        ctx.last_intent = "play_music".into();

        let boosted = engine.parse("make it louder", Some(&ctx));
        assert_eq!(boosted.intent, "control_volume");
        assert!(boosted.context_used);
        assert!(boosted.confidence >= 0.4);

        let unboosted = engine.parse("make it louder", None);
        assert!(!unboosted.context_used);
        assert!(boosted.confidence > unboosted.confidence);
    }

    #[test]
    fn location_variable_boosts_smart_home() {
        let engine = IntentEngine::new();
        let mut ctx = session();
        ctx.variables.insert("location".into(), "at home".into());
        let result = engine.parse("dim the lights", Some(&ctx));
        assert_eq!(result.intent, "smart_home");
        assert!(result.context_used);
    }

    #[test]
    fn classification_is_deterministic() {
        let engine = IntentEngine::new();
        let a = engine.parse("turn on gpio pin 18", None);
        let b = engine.parse("turn on gpio pin 18", None);
        assert_eq!(a, b);
        assert_eq!(a.intent, "hardware_control");
    }

    #[test]
    fn alternatives_are_capped_at_three() {
        let engine = IntentEngine::new();
        // Touches keywords of many intents at once.
        let result = engine.parse(
            "play music send message open file lights gpio what route",
            None,
        );
        assert!(result.alternatives.len() <= 3);
        assert!(!result.alternatives.is_empty());
    }
}

//! Trader style detection.
//!
//! A cheap heuristic classifier over fixed rule tables. Its only job is to
//! guess which posting style a message is written in so the dispatcher can
//! try the matching parser first; a wrong guess costs one extra `can_parse`
//! call, nothing more. Pure function of the text: no side effects, never
//! fails.

use regex::{Regex, RegexBuilder};

use crate::domain::error::SigtraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraderStyle {
    /// Labeled `Entry:/TP1:/SL:` call sheets.
    Structured,
    /// Pipe-and-emoji decorated channel posts.
    Decorated,
    /// Prose zone entries with invalidation levels.
    ZoneTrader,
    /// One-line shorthand (`long btc x10 e:45000`).
    Shorthand,
    Unknown,
}

impl TraderStyle {
    /// Parser the dispatcher should try first for this style.
    pub fn parser_hint(&self) -> Option<&'static str> {
        match self {
            TraderStyle::Structured => Some("trade-format-a"),
            TraderStyle::Decorated => Some("trade-format-b"),
            TraderStyle::ZoneTrader => Some("zone-caller"),
            TraderStyle::Shorthand => Some("compact-caller"),
            TraderStyle::Unknown => None,
        }
    }
}

/// Detection outcome: style, confidence in [0,1], and which table entries
/// matched.
#[derive(Debug, Clone)]
pub struct StyleMatch {
    pub style: TraderStyle,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Score weights: required patterns dominate, keywords refine, optional
/// patterns nudge, exclusions punish.
const REQUIRED_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.3;
const OPTIONAL_WEIGHT: f64 = 0.1;
const EXCLUSION_PENALTY: f64 = 0.3;

struct StyleProfile {
    style: TraderStyle,
    required: &'static [&'static str],
    keywords: &'static [&'static str],
    optional: &'static [&'static str],
    exclusions: &'static [&'static str],
    min_confidence: f64,
}

const PROFILES: &[StyleProfile] = &[
    StyleProfile {
        style: TraderStyle::Structured,
        required: &[r"\bentry\s*[:@]", r"\b(?:tp|target)\s*\d?\s*[:@]"],
        keywords: &["entry", "tp", "sl", "leverage"],
        optional: &[r"\b(?:sl|stop\s*loss)\s*[:@]", r"\b(?:long|short)\b"],
        exclusions: &[r"\bclosed\b", r"\bresult\b"],
        min_confidence: 0.45,
    },
    StyleProfile {
        style: TraderStyle::Decorated,
        required: &[r"direction\s*[:：]", r"\|"],
        keywords: &["direction", "targets", "entry", "stoploss"],
        optional: &[r"[🚀🔥📈📉⚡]", r"#\w{2,10}/\w{3,5}"],
        exclusions: &[r"\bresult\b", r"\bpnl\b"],
        min_confidence: 0.45,
    },
    StyleProfile {
        style: TraderStyle::ZoneTrader,
        required: &[
            r"\b(?:buy(?:ing)?|accumulat\w+|long(?:ing)?|short(?:ing)?|sell(?:ing)?)\b",
            r"\d\s*[-–]\s*\d",
        ],
        keywords: &["zone", "invalidation", "targets", "here"],
        optional: &[r"\binvalidation\b", r"\btargets?\b"],
        exclusions: &[r"\bentry\s*:", r"\|"],
        min_confidence: 0.4,
    },
    StyleProfile {
        style: TraderStyle::Shorthand,
        required: &[r"(?m)^\s*(?:long|short)\b", r"\b[et]p?\s*:\s*\S*\d"],
        keywords: &["e:", "t:", "sl:", "x"],
        optional: &[r"\bx\s*\d{1,3}\b"],
        exclusions: &[r"direction\s*:"],
        min_confidence: 0.45,
    },
];

struct CompiledProfile {
    style: TraderStyle,
    required: Vec<(String, Regex)>,
    keywords: Vec<String>,
    optional: Vec<(String, Regex)>,
    exclusions: Vec<(String, Regex)>,
    min_confidence: f64,
}

pub struct StyleDetector {
    profiles: Vec<CompiledProfile>,
}

fn compile(pattern: &str) -> Result<Regex, SigtraderError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SigtraderError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn compile_all(patterns: &[&str]) -> Result<Vec<(String, Regex)>, SigtraderError> {
    patterns
        .iter()
        .map(|p| Ok((p.to_string(), compile(p)?)))
        .collect()
}

impl StyleDetector {
    pub fn new() -> Result<Self, SigtraderError> {
        let mut profiles = Vec::with_capacity(PROFILES.len());
        for profile in PROFILES {
            profiles.push(CompiledProfile {
                style: profile.style,
                required: compile_all(profile.required)?,
                keywords: profile.keywords.iter().map(|k| k.to_string()).collect(),
                optional: compile_all(profile.optional)?,
                exclusions: compile_all(profile.exclusions)?,
                min_confidence: profile.min_confidence,
            });
        }
        Ok(StyleDetector { profiles })
    }

    /// Classify a message. Returns `Unknown` when no style clears its own
    /// minimum confidence.
    pub fn detect(&self, text: &str) -> StyleMatch {
        let lowered = text.to_lowercase();

        let mut best: Option<StyleMatch> = None;
        let mut best_cleared = false;

        for profile in &self.profiles {
            let mut evidence = Vec::new();

            let required_hits = count_matches(&profile.required, text, "required", &mut evidence);
            let keyword_hits = profile
                .keywords
                .iter()
                .filter(|kw| lowered.contains(kw.as_str()))
                .inspect(|kw| evidence.push(format!("keyword:{kw}")))
                .count();
            let optional_hits = count_matches(&profile.optional, text, "optional", &mut evidence);
            let exclusion_hits =
                count_matches(&profile.exclusions, text, "exclusion", &mut evidence);

            let mut confidence = REQUIRED_WEIGHT * ratio(required_hits, profile.required.len())
                + KEYWORD_WEIGHT * ratio(keyword_hits, profile.keywords.len())
                + OPTIONAL_WEIGHT * ratio(optional_hits, profile.optional.len())
                - EXCLUSION_PENALTY * exclusion_hits as f64;
            confidence = confidence.clamp(0.0, 1.0);

            let cleared = confidence >= profile.min_confidence;
            let better = match &best {
                None => true,
                Some(b) => confidence > b.confidence,
            };
            // A style that clears its minimum always beats one that does not.
            if (cleared && !best_cleared) || (better && cleared == best_cleared) {
                best_cleared = cleared;
                best = Some(StyleMatch {
                    style: profile.style,
                    confidence,
                    evidence,
                });
            }
        }

        match best {
            Some(m) if best_cleared => m,
            Some(m) => StyleMatch {
                style: TraderStyle::Unknown,
                confidence: m.confidence,
                evidence: m.evidence,
            },
            None => StyleMatch {
                style: TraderStyle::Unknown,
                confidence: 0.0,
                evidence: Vec::new(),
            },
        }
    }
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn count_matches(
    patterns: &[(String, Regex)],
    text: &str,
    label: &str,
    evidence: &mut Vec<String>,
) -> usize {
    patterns
        .iter()
        .filter(|(source, re)| {
            if re.is_match(text) {
                evidence.push(format!("{label}:{source}"));
                true
            } else {
                false
            }
        })
        .count()
}

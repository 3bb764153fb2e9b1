//! Rule-table intent recognition for free-text workspace requests.
//!
//! Rules are evaluated in table order and every matching rule produces a
//! candidate. Resource actions that name a single workspace (terminate,
//! reboot, start, stop, status, diagnose) sit ahead of the broader
//! provisioning and listing rules so that equal-confidence ties resolve to
//! the more specific action.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use workdesk_core::config::IntentConfig;
use workdesk_core::domain::intent::{Entities, IntentTag, RecognizedIntent};
use workdesk_core::domain::workspace::BundleType;

pub const BASE_CONFIDENCE: f64 = 0.8;
pub const FULL_MATCH_CONFIDENCE: f64 = 1.0;

const UNKNOWN_CLARIFICATION: &str = "I'm not sure what you'd like to do. Could you rephrase? \
     For example: \"list my workspaces\" or \"provision a STANDARD workspace\".";

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("invalid pattern for `{intent}`: {source}")]
    Pattern { intent: &'static str, source: regex::Error },
}

struct RuleSpec {
    intent: IntentTag,
    patterns: &'static [&'static str],
    tool: Option<&'static str>,
}

const RULES: &[RuleSpec] = &[
    RuleSpec {
        intent: IntentTag::TerminateResource,
        patterns: &[
            r"\b(terminate|destroy|decommission)\b",
            r"\bdelete\b.*\bworkspace",
            r"\bremove (my |the )?workspace\b",
        ],
        tool: Some("terminate_workspace"),
    },
    RuleSpec {
        intent: IntentTag::RebootResource,
        patterns: &[r"\b(reboot|restart)\b"],
        tool: Some("reboot_workspace"),
    },
    RuleSpec {
        intent: IntentTag::StartResource,
        patterns: &[r"\bstart\b", r"\b(turn|power|switch) on\b", r"\bresume\b", r"\bwake up\b"],
        tool: Some("start_workspace"),
    },
    RuleSpec {
        intent: IntentTag::StopResource,
        patterns: &[r"\bstop\b", r"\bshut ?down\b", r"\b(turn|power|switch) off\b"],
        tool: Some("stop_workspace"),
    },
    RuleSpec {
        intent: IntentTag::ResourceStatus,
        patterns: &[
            r"\bstatus\b",
            r"\bstate of\b",
            r"\bis ws-[a-z0-9]+ (running|up|down|stopped|available|healthy)\b",
        ],
        tool: Some("get_workspace_status"),
    },
    RuleSpec {
        intent: IntentTag::Diagnose,
        patterns: &[
            r"\b(diagnose|troubleshoot)\b",
            r"\b(can't|cannot|can not|unable to) (connect|log ?in|reach)\b",
            r"\b(not working|broken|unresponsive|frozen)\b",
            r"\b(very |really |so )?slow\b",
        ],
        tool: Some("diagnose_workspace"),
    },
    RuleSpec {
        intent: IntentTag::ProvisionResource,
        patterns: &[
            r"\bprovision\b",
            r"\b(create|launch|spin up|set up)\b.*\bworkspace",
            r"\bnew workspace\b",
        ],
        tool: Some("provision_workspace"),
    },
    RuleSpec {
        intent: IntentTag::ListResources,
        patterns: &[
            r"\blist\b",
            r"\bshow (me )?(all |my )?workspaces\b",
            r"\b(what|which) workspaces (do i|are)\b",
        ],
        tool: Some("list_workspaces"),
    },
    RuleSpec {
        intent: IntentTag::CostQuery,
        patterns: &[r"\b(cost|costs|spend|spending|billing|bill)\b", r"\bhow much\b"],
        tool: Some("get_cost_summary"),
    },
    RuleSpec {
        intent: IntentTag::Recommend,
        patterns: &[
            r"\b(recommend|recommendation|suggest)\b",
            r"\b(which|what) (bundle|workspace type|size)\b",
            r"\bbest (bundle|workspace) for\b",
        ],
        tool: Some("recommend_bundle"),
    },
    RuleSpec {
        intent: IntentTag::SupportRequest,
        patterns: &[
            r"\b(support|help ?desk) ticket\b",
            r"\bopen (a )?ticket\b",
            r"\b(contact|talk to|reach) (support|a human|someone)\b",
        ],
        tool: Some("create_support_ticket"),
    },
    RuleSpec {
        intent: IntentTag::Help,
        patterns: &[r"\bhelp\b", r"\bwhat can you do\b", r"\bhow do i use\b"],
        tool: None,
    },
    RuleSpec {
        intent: IntentTag::Greeting,
        patterns: &[r"^(hi|hello|hey|howdy|good (morning|afternoon|evening))\b"],
        tool: None,
    },
];

const TIME_PERIODS: &[(&str, &str)] = &[
    ("this month", "current_month"),
    ("current month", "current_month"),
    ("last month", "last_month"),
    ("previous month", "last_month"),
    ("this week", "current_week"),
    ("last week", "last_week"),
    ("this quarter", "current_quarter"),
    ("last quarter", "last_quarter"),
    ("this year", "current_year"),
    ("year to date", "current_year"),
    ("ytd", "current_year"),
    ("yesterday", "yesterday"),
    ("today", "today"),
];

// Longer names first so `graphics pro` is never read as `graphics`.
const BUNDLE_SYNONYMS: &[(&str, BundleType)] = &[
    ("graphicspro", BundleType::GraphicsPro),
    ("graphics pro", BundleType::GraphicsPro),
    ("graphics_pro", BundleType::GraphicsPro),
    ("graphics-pro", BundleType::GraphicsPro),
    ("powerpro", BundleType::PowerPro),
    ("power pro", BundleType::PowerPro),
    ("power_pro", BundleType::PowerPro),
    ("power-pro", BundleType::PowerPro),
    ("graphics", BundleType::Graphics),
    ("performance", BundleType::Performance),
    ("power", BundleType::Power),
    ("standard", BundleType::Standard),
    ("value", BundleType::Value),
    ("basic", BundleType::Value),
];

struct CompiledRule {
    intent: IntentTag,
    tool: Option<&'static str>,
    patterns: Vec<CompiledPattern>,
}

struct CompiledPattern {
    source: &'static str,
    regex: Regex,
}

#[derive(Clone, Debug)]
struct Candidate {
    intent: IntentTag,
    tool: Option<&'static str>,
    confidence: f64,
}

/// Workload traits used to pick a bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequirements {
    #[serde(default)]
    pub gpu: bool,
    #[serde(default)]
    pub ml: bool,
    #[serde(default)]
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub use_case: Option<UseCase>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    Development,
    Design,
    Office,
    DataAnalysis,
}

impl BundleRequirements {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// Picks at most three bundles, strongest requirement first.
///
/// Precedence: GPU, then ML or heavy compute, then intensity, then use case.
/// With no signal at all the answer is `STANDARD`.
pub fn recommend_bundles(requirements: &BundleRequirements) -> Vec<BundleType> {
    let mut picks = Vec::new();

    if requirements.gpu {
        picks.extend([BundleType::GraphicsPro, BundleType::Graphics]);
    }
    if requirements.ml {
        picks.extend([BundleType::PowerPro, BundleType::Power]);
    }
    match requirements.intensity {
        Some(Intensity::High) => picks.extend([BundleType::Performance, BundleType::Power]),
        Some(Intensity::Medium) => picks.extend([BundleType::Standard, BundleType::Performance]),
        Some(Intensity::Low) => picks.extend([BundleType::Value, BundleType::Standard]),
        None => {}
    }
    match requirements.use_case {
        Some(UseCase::Development) => picks.push(BundleType::Performance),
        Some(UseCase::Design) => picks.push(BundleType::Graphics),
        Some(UseCase::Office) => picks.push(BundleType::Standard),
        Some(UseCase::DataAnalysis) => picks.push(BundleType::Power),
        None => {}
    }
    if picks.is_empty() {
        picks.push(BundleType::Standard);
    }

    let mut ranked = Vec::with_capacity(3);
    for bundle in picks {
        if !ranked.contains(&bundle) {
            ranked.push(bundle);
        }
        if ranked.len() == 3 {
            break;
        }
    }
    ranked
}

pub struct IntentRecognizer {
    rules: Vec<CompiledRule>,
    workspace_id: Regex,
    tag_reference: Regex,
    config: IntentConfig,
}

impl IntentRecognizer {
    pub fn new(config: IntentConfig) -> Result<Self, IntentError> {
        let mut rules = Vec::with_capacity(RULES.len());
        for spec in RULES {
            let mut patterns = Vec::with_capacity(spec.patterns.len());
            for pattern in spec.patterns.iter().copied() {
                let regex = Regex::new(pattern).map_err(|source| IntentError::Pattern {
                    intent: spec.intent.as_str(),
                    source,
                })?;
                patterns.push(CompiledPattern { source: pattern, regex });
            }
            rules.push(CompiledRule { intent: spec.intent, tool: spec.tool, patterns });
        }

        let workspace_id = Regex::new(r"(?i)\bws-[a-z0-9]+\b")
            .map_err(|source| IntentError::Pattern { intent: "workspace_id", source })?;
        let tag_reference = Regex::new(r"(?i)\b(team|project|department)\s*:\s*([a-z0-9_.\-]+)")
            .map_err(|source| IntentError::Pattern { intent: "tag_reference", source })?;

        Ok(Self { rules, workspace_id, tag_reference, config })
    }

    pub fn config(&self) -> &IntentConfig {
        &self.config
    }

    /// Evaluation order of the rule table.
    pub fn rule_order(&self) -> Vec<IntentTag> {
        self.rules.iter().map(|rule| rule.intent).collect()
    }

    pub fn recognize(&self, text: &str) -> RecognizedIntent {
        self.recognize_in_context(text, None)
    }

    /// Like [`recognize`](Self::recognize), but a resource-scoped intent that
    /// names no workspace falls back to `current_subject`.
    pub fn recognize_in_context(
        &self,
        text: &str,
        current_subject: Option<&str>,
    ) -> RecognizedIntent {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return RecognizedIntent::unknown(UNKNOWN_CLARIFICATION);
        }

        let mut candidates = self.match_rules(&normalized);
        if candidates.is_empty() {
            return RecognizedIntent::unknown(UNKNOWN_CLARIFICATION);
        }
        // stable: equal confidence keeps table order
        candidates.sort_by(|left, right| right.confidence.total_cmp(&left.confidence));

        let top = candidates[0].clone();
        let mut ambiguous = false;
        let mut clarification = None;
        if let Some(runner_up) = candidates.get(1) {
            if runner_up.confidence > self.config.ambiguity_threshold {
                ambiguous = true;
                clarification = Some(format!(
                    "Did you want to {} or {}?",
                    top.intent.label(),
                    runner_up.intent.label()
                ));
            }
        }

        let mut entities = self.extract_entities(top.intent, text, &normalized);
        if top.intent.is_resource_scoped() && !entities.contains_key("workspace_id") {
            if let Some(subject) = current_subject {
                entities.insert("workspace_id".to_string(), json!(subject));
            }
        }

        if let Some(missing) = missing_entity_prompt(top.intent, &entities) {
            ambiguous = true;
            clarification = Some(missing);
        }

        tracing::debug!(
            event_name = "intent.recognized",
            intent = top.intent.as_str(),
            confidence = top.confidence,
            candidates = candidates.len(),
            ambiguous,
            "intent recognized"
        );

        RecognizedIntent {
            intent: top.intent,
            confidence: top.confidence,
            entities,
            suggested_tool: top.tool.map(str::to_string),
            ambiguous,
            clarification,
        }
    }

    fn match_rules(&self, normalized: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for rule in &self.rules {
            let best = rule
                .patterns
                .iter()
                .filter_map(|pattern| self.score_pattern(pattern, normalized))
                .fold(None, |best: Option<f64>, score| {
                    Some(best.map_or(score, |current| current.max(score)))
                });
            if let Some(confidence) = best {
                candidates.push(Candidate { intent: rule.intent, tool: rule.tool, confidence });
            }
        }
        candidates
    }

    fn score_pattern(&self, pattern: &CompiledPattern, normalized: &str) -> Option<f64> {
        let found = pattern.regex.find(normalized)?;
        let mut confidence = if found.start() == 0 && found.end() == normalized.len() {
            FULL_MATCH_CONFIDENCE
        } else {
            BASE_CONFIDENCE
        };
        if pattern.source.len() >= self.config.specificity_min_len {
            confidence = (confidence + self.config.specificity_bonus).min(1.0);
        }
        Some(confidence)
    }

    fn extract_entities(&self, intent: IntentTag, raw: &str, normalized: &str) -> Entities {
        let mut entities = Entities::new();

        if let Some(found) = self.workspace_id.find(raw) {
            entities.insert("workspace_id".to_string(), json!(found.as_str().to_ascii_lowercase()));
        }

        if matches!(intent, IntentTag::ProvisionResource | IntentTag::Recommend) {
            if let Some(bundle) = extract_bundle_type(normalized) {
                entities.insert("bundle_type".to_string(), json!(bundle.as_str()));
            }
        }

        if matches!(intent, IntentTag::CostQuery | IntentTag::ListResources) {
            if let Some(period) = extract_time_period(normalized) {
                entities.insert("time_period".to_string(), json!(period));
            }
        }

        for captures in self.tag_reference.captures_iter(raw) {
            if let (Some(kind), Some(value)) = (captures.get(1), captures.get(2)) {
                entities
                    .entry(kind.as_str().to_ascii_lowercase())
                    .or_insert_with(|| json!(value.as_str()));
            }
        }

        if intent == IntentTag::Recommend {
            let requirements = extract_requirements(normalized);
            entities.insert("requirements".to_string(), requirements.to_value());
        }

        if intent == IntentTag::SupportRequest || intent == IntentTag::Diagnose {
            entities.insert("description".to_string(), json!(raw.trim()));
        }

        entities
    }
}

fn missing_entity_prompt(intent: IntentTag, entities: &Entities) -> Option<String> {
    if intent.is_resource_scoped() && !entities.contains_key("workspace_id") {
        return Some(format!(
            "Which workspace should I use to {}? Please include its id (for example ws-abc123).",
            intent.label()
        ));
    }
    if intent == IntentTag::ProvisionResource && !entities.contains_key("bundle_type") {
        let options = BundleType::ALL.iter().map(BundleType::as_str).collect::<Vec<_>>();
        return Some(format!(
            "Which bundle should the new workspace use? Options: {}.",
            options.join(", ")
        ));
    }
    None
}

fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn extract_bundle_type(normalized: &str) -> Option<BundleType> {
    BUNDLE_SYNONYMS
        .iter()
        .find(|(phrase, _)| contains_word(normalized, phrase))
        .map(|(_, bundle)| *bundle)
}

fn extract_time_period(normalized: &str) -> Option<&'static str> {
    TIME_PERIODS
        .iter()
        .find(|(phrase, _)| contains_word(normalized, phrase))
        .map(|(_, period)| *period)
}

fn extract_requirements(normalized: &str) -> BundleRequirements {
    let any = |words: &[&str]| words.iter().any(|word| contains_word(normalized, word));

    let gpu = any(&["gpu", "graphics", "3d", "rendering", "cad", "video editing", "gaming"]);
    let ml = any(&[
        "ml",
        "machine learning",
        "ai",
        "deep learning",
        "model training",
        "data science",
        "high compute",
        "compute intensive",
        "compute-intensive",
        "simulation",
    ]);
    let intensity = if any(&["heavy", "intensive", "demanding", "high performance", "power user"])
    {
        Some(Intensity::High)
    } else if any(&["moderate", "medium", "regular"]) {
        Some(Intensity::Medium)
    } else if any(&["light", "occasional", "basic", "minimal"]) {
        Some(Intensity::Low)
    } else {
        None
    };
    let use_case = if any(&["development", "developer", "coding", "programming", "software"]) {
        Some(UseCase::Development)
    } else if any(&["design", "designer", "creative"]) {
        Some(UseCase::Design)
    } else if any(&["data analysis", "analytics", "analyst", "spreadsheets"]) {
        Some(UseCase::DataAnalysis)
    } else if any(&["office", "email", "documents", "browsing"]) {
        Some(UseCase::Office)
    } else {
        None
    };

    BundleRequirements { gpu, ml, intensity, use_case }
}

/// Reads a `requirements` object from tool parameters, ignoring unknown keys.
pub fn requirements_from_value(value: Option<&Value>) -> BundleRequirements {
    value.and_then(|value| serde_json::from_value(value.clone()).ok()).unwrap_or_default()
}

/// Summary of entities useful for logs and CLI output.
pub fn entity_summary(entities: &Entities) -> BTreeMap<String, String> {
    entities
        .iter()
        .map(|(key, value)| {
            let rendered = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            (key.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use workdesk_core::config::IntentConfig;
    use workdesk_core::domain::intent::IntentTag;
    use workdesk_core::domain::workspace::BundleType;

    use super::{
        recommend_bundles, BundleRequirements, Intensity, IntentRecognizer, UseCase,
        BASE_CONFIDENCE,
    };

    fn recognizer() -> IntentRecognizer {
        IntentRecognizer::new(IntentConfig::default()).expect("rule table compiles")
    }

    #[test]
    fn greeting_has_no_tool() {
        let intent = recognizer().recognize("hi");
        assert_eq!(intent.intent, IntentTag::Greeting);
        assert_eq!(intent.suggested_tool, None);
        assert!(!intent.ambiguous);
        assert!((intent.confidence - 1.0).abs() < 1e-9, "full match should score 1.0");
    }

    #[test]
    fn provision_request_extracts_bundle_type() {
        let intent = recognizer().recognize("provision a POWER workspace");
        assert_eq!(intent.intent, IntentTag::ProvisionResource);
        assert_eq!(intent.suggested_tool.as_deref(), Some("provision_workspace"));
        assert_eq!(intent.entity_str("bundle_type"), Some("POWER"));
        assert!(!intent.ambiguous);
        assert!((intent.confidence - BASE_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn longer_bundle_names_win_over_their_prefixes() {
        let recognizer = recognizer();
        let pro = recognizer.recognize("provision a graphics pro workspace");
        assert_eq!(pro.entity_str("bundle_type"), Some("GRAPHICSPRO"));
        let power_pro = recognizer.recognize("create a powerpro workspace for me");
        assert_eq!(power_pro.entity_str("bundle_type"), Some("POWERPRO"));
    }

    #[test]
    fn specific_actions_are_evaluated_before_generic_ones() {
        let order = recognizer().rule_order();
        let position = |tag: IntentTag| order.iter().position(|entry| *entry == tag);

        for specific in [
            IntentTag::TerminateResource,
            IntentTag::RebootResource,
            IntentTag::StartResource,
            IntentTag::StopResource,
            IntentTag::ResourceStatus,
            IntentTag::Diagnose,
        ] {
            for generic in [IntentTag::ProvisionResource, IntentTag::ListResources] {
                assert!(
                    position(specific) < position(generic),
                    "{specific} must be evaluated before {generic}"
                );
            }
        }
    }

    #[test]
    fn two_strong_matches_are_ambiguous_and_name_both() {
        let intent = recognizer().recognize("stop and then terminate ws-42");
        assert!(intent.ambiguous);
        assert_eq!(intent.intent, IntentTag::TerminateResource);
        assert_eq!(intent.suggested_tool.as_deref(), Some("terminate_workspace"));

        let clarification = intent.clarification.expect("clarification");
        assert!(clarification.contains(IntentTag::TerminateResource.label()));
        assert!(clarification.contains(IntentTag::StopResource.label()));
    }

    #[test]
    fn equal_confidence_ties_resolve_in_table_order() {
        let intent = recognizer().recognize("start or stop ws-1");
        assert!(intent.ambiguous);
        assert_eq!(intent.intent, IntentTag::StartResource);
        assert!((intent.confidence - BASE_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn higher_threshold_suppresses_cross_intent_ambiguity() {
        let strict = IntentRecognizer::new(IntentConfig {
            ambiguity_threshold: 0.95,
            ..IntentConfig::default()
        })
        .expect("rule table compiles");

        let intent = strict.recognize("stop and then terminate ws-42");
        assert!(!intent.ambiguous);
        assert_eq!(intent.intent, IntentTag::TerminateResource);
    }

    #[test]
    fn long_patterns_earn_specificity_bonus() {
        let intent = recognizer().recognize("is ws-9 running right now?");
        assert_eq!(intent.intent, IntentTag::ResourceStatus);
        assert!((intent.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn missing_workspace_id_overrides_with_targeted_clarification() {
        let intent = recognizer().recognize("please reboot my workspace");
        assert_eq!(intent.intent, IntentTag::RebootResource);
        assert!(intent.ambiguous);
        let clarification = intent.clarification.expect("clarification");
        assert!(clarification.contains("ws-abc123"));
    }

    #[test]
    fn missing_bundle_type_asks_for_bundle() {
        let intent = recognizer().recognize("provision something for me");
        assert_eq!(intent.intent, IntentTag::ProvisionResource);
        assert!(intent.ambiguous);
        assert!(intent.clarification.expect("clarification").contains("GRAPHICSPRO"));
    }

    #[test]
    fn current_subject_fills_missing_workspace_id() {
        let intent = recognizer().recognize_in_context("restart it please", Some("ws-77"));
        assert_eq!(intent.intent, IntentTag::RebootResource);
        assert_eq!(intent.entity_str("workspace_id"), Some("ws-77"));
        assert!(!intent.ambiguous);
    }

    #[test]
    fn unmatched_text_is_unknown_with_zero_confidence() {
        let intent = recognizer().recognize("the quick brown fox");
        assert_eq!(intent.intent, IntentTag::Unknown);
        assert_eq!(intent.confidence, 0.0);
        assert!(intent.ambiguous);
        assert!(intent.clarification.is_some());
    }

    #[test]
    fn cost_query_extracts_period_and_tags() {
        let intent = recognizer().recognize("What did Team: Platform spend this month?");
        assert_eq!(intent.intent, IntentTag::CostQuery);
        assert_eq!(intent.entity_str("time_period"), Some("current_month"));
        assert_eq!(intent.entity_str("team"), Some("Platform"));
    }

    #[test]
    fn workspace_ids_are_normalized_to_lower_case() {
        let intent = recognizer().recognize("terminate WS-AB12");
        assert_eq!(intent.entity_str("workspace_id"), Some("ws-ab12"));
        assert!(!intent.ambiguous);
    }

    #[test]
    fn recommend_builds_requirements_map() {
        let intent = recognizer().recognize("recommend something for machine learning and gpu work");
        assert_eq!(intent.intent, IntentTag::Recommend);
        assert_eq!(
            intent.entities.get("requirements"),
            Some(&json!({ "gpu": true, "ml": true, "intensity": null, "use_case": null }))
        );
    }

    #[test]
    fn recommendations_follow_precedence_and_cap_at_three() {
        let everything = BundleRequirements {
            gpu: true,
            ml: true,
            intensity: Some(Intensity::High),
            use_case: Some(UseCase::Development),
        };
        assert_eq!(
            recommend_bundles(&everything),
            vec![BundleType::GraphicsPro, BundleType::Graphics, BundleType::PowerPro]
        );

        let office = BundleRequirements {
            intensity: Some(Intensity::Medium),
            use_case: Some(UseCase::Office),
            ..BundleRequirements::default()
        };
        // STANDARD appears once even though two rules pick it
        assert_eq!(recommend_bundles(&office), vec![BundleType::Standard, BundleType::Performance]);

        assert_eq!(recommend_bundles(&BundleRequirements::default()), vec![BundleType::Standard]);
    }
}

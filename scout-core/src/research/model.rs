//! Research data model: inputs, assignments, findings, confidence, and the
//! accumulated intelligence a session builds up cycle by cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The fixed set of intelligence categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    People,
    Initiative,
    Technology,
    Competitive,
    Financial,
    Market,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 6] = [
        FindingCategory::People,
        FindingCategory::Initiative,
        FindingCategory::Technology,
        FindingCategory::Competitive,
        FindingCategory::Financial,
        FindingCategory::Market,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::People => "people",
            FindingCategory::Initiative => "initiative",
            FindingCategory::Technology => "technology",
            FindingCategory::Competitive => "competitive",
            FindingCategory::Financial => "financial",
            FindingCategory::Market => "market",
        }
    }

    /// Parse a category name, ignoring case and surrounding whitespace.
    pub fn parse_loose(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Human title for headings.
    pub fn title(&self) -> &'static str {
        match self {
            FindingCategory::People => "People",
            FindingCategory::Initiative => "Initiative",
            FindingCategory::Technology => "Technology",
            FindingCategory::Competitive => "Competitive",
            FindingCategory::Financial => "Financial",
            FindingCategory::Market => "Market",
        }
    }
}

impl std::fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal confidence: `none < low < medium < high < sufficient`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Sufficient,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "none",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Sufficient => "sufficient",
        }
    }

    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(ConfidenceLevel::None),
            "low" => Some(ConfidenceLevel::Low),
            "medium" => Some(ConfidenceLevel::Medium),
            "high" => Some(ConfidenceLevel::High),
            "sufficient" => Some(ConfidenceLevel::Sufficient),
            _ => None,
        }
    }

    /// Level implied by a count of active findings in a category.
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => ConfidenceLevel::None,
            1 => ConfidenceLevel::Low,
            2..=3 => ConfidenceLevel::Medium,
            4..=5 => ConfidenceLevel::High,
            _ => ConfidenceLevel::Sufficient,
        }
    }

    /// One level down, saturating at `none`.
    pub fn lowered(&self) -> Self {
        match self {
            ConfidenceLevel::None | ConfidenceLevel::Low => ConfidenceLevel::None,
            ConfidenceLevel::Medium => ConfidenceLevel::Low,
            ConfidenceLevel::High => ConfidenceLevel::Medium,
            ConfidenceLevel::Sufficient => ConfidenceLevel::High,
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category confidence. Always total over [`FindingCategory::ALL`]; a
/// category missing from a deserialized map reads as `none`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<FindingCategory, ConfidenceLevel>",
    into = "BTreeMap<FindingCategory, ConfidenceLevel>"
)]
pub struct ConfidenceAssessment {
    levels: BTreeMap<FindingCategory, ConfidenceLevel>,
}

impl ConfidenceAssessment {
    /// Every category at `none`.
    pub fn new() -> Self {
        Self {
            levels: FindingCategory::ALL
                .into_iter()
                .map(|c| (c, ConfidenceLevel::None))
                .collect(),
        }
    }

    pub fn get(&self, category: FindingCategory) -> ConfidenceLevel {
        self.levels.get(&category).copied().unwrap_or_default()
    }

    pub fn set(&mut self, category: FindingCategory, level: ConfidenceLevel) {
        self.levels.insert(category, level);
    }

    pub fn with(mut self, category: FindingCategory, level: ConfidenceLevel) -> Self {
        self.set(category, level);
        self
    }

    /// Categories and levels in category order.
    pub fn iter(&self) -> impl Iterator<Item = (FindingCategory, ConfidenceLevel)> + '_ {
        FindingCategory::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    pub fn all_at_least(&self, floor: ConfidenceLevel) -> bool {
        self.iter().all(|(_, level)| level >= floor)
    }

    /// Categories strictly below `floor`.
    pub fn below(&self, floor: ConfidenceLevel) -> Vec<FindingCategory> {
        self.iter()
            .filter(|(_, level)| *level < floor)
            .map(|(c, _)| c)
            .collect()
    }

    pub fn any_above_none(&self) -> bool {
        self.iter().any(|(_, level)| level > ConfidenceLevel::None)
    }
}

impl Default for ConfidenceAssessment {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<FindingCategory, ConfidenceLevel>> for ConfidenceAssessment {
    fn from(partial: BTreeMap<FindingCategory, ConfidenceLevel>) -> Self {
        let mut assessment = Self::new();
        for (category, level) in partial {
            assessment.set(category, level);
        }
        assessment
    }
}

impl From<ConfidenceAssessment> for BTreeMap<FindingCategory, ConfidenceLevel> {
    fn from(assessment: ConfidenceAssessment) -> Self {
        assessment.iter().collect()
    }
}

/// What a session researches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchInput {
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    pub initiative: String,
    /// Set when a follow-up question restarts the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
}

impl ResearchInput {
    pub fn new(
        company: impl Into<String>,
        industry: impl Into<String>,
        initiative: impl Into<String>,
    ) -> Self {
        let industry = industry.into();
        Self {
            company: company.into(),
            industry: if industry.trim().is_empty() {
                None
            } else {
                Some(industry)
            },
            initiative: initiative.into(),
            follow_up: None,
        }
    }
}

/// Assignment priority. Sorting ascending puts `High` first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// One focused research task produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Unique within its cycle.
    pub id: String,
    pub topic: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FindingCategory>,
    /// Action names the worker should prefer.
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl Assignment {
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            id: id.into(),
            instructions: topic.clone(),
            topic,
            category: None,
            suggested_actions: Vec::new(),
            priority: Priority::Medium,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: FindingCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Session-unique identifier of a path: cycle number plus assignment id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(String);

impl PathId {
    pub fn new(cycle: u32, assignment_id: &str) -> Self {
        Self(format!("c{cycle}-{assignment_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The cycle encoded in the id, if it is well formed.
    pub fn cycle(&self) -> Option<u32> {
        let (cycle, _) = self.0.strip_prefix('c')?.split_once('-')?;
        cycle.parse().ok()
    }
}

impl std::fmt::Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle marker for a finding. Findings are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FindingStatus {
    Active,
    /// A higher-confidence finding with the same source and category won.
    Superseded { by: Uuid },
    /// Same source and category, equal confidence, arrived later.
    Duplicate { of: Uuid },
}

/// One atomic piece of intelligence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub category: FindingCategory,
    pub summary: String,
    /// Category-dependent payload; opaque to the engine.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 0.0..=1.0
    pub confidence: f64,
    /// The path that produced this finding.
    pub path_id: PathId,
    pub cycle: u32,
    pub status: FindingStatus,
    pub recorded_at: DateTime<Utc>,
}

impl Finding {
    pub fn new(
        category: FindingCategory,
        summary: impl Into<String>,
        path_id: PathId,
        cycle: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            summary: summary.into(),
            content: serde_json::Value::Null,
            source: None,
            confidence: 0.5,
            path_id,
            cycle,
            status: FindingStatus::Active,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == FindingStatus::Active
    }

    /// Source reference normalized for comparison.
    pub fn source_key(&self) -> Option<String> {
        self.source.as_deref().map(normalize_source)
    }

    /// Summary plus any string fields of the content payload.
    pub fn text(&self) -> String {
        let mut text = self.summary.clone();
        collect_strings(&self.content, &mut text);
        text
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Lowercased, scheme-less, without a trailing slash or fragment.
pub fn normalize_source(source: &str) -> String {
    let s = source.trim().to_lowercase();
    let s = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))
        .unwrap_or(&s);
    let s = s.strip_prefix("www.").unwrap_or(s);
    let s = s.split('#').next().unwrap_or(s);
    s.trim_end_matches('/').to_string()
}

/// How two findings disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    DirectNegation,
    NumericDisagreement,
    /// Reported by the reasoning capability rather than the heuristics.
    Interpretive,
}

/// Two findings in one category that disagree. Both are retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub category: FindingCategory,
    pub finding_a: Uuid,
    pub finding_b: Uuid,
    pub kind: ContradictionKind,
    /// Why these conflict and which looks more reliable.
    pub annotation: String,
    pub detected_in_cycle: u32,
}

impl Contradiction {
    pub fn involves(&self, a: Uuid, b: Uuid) -> bool {
        (self.finding_a == a && self.finding_b == b) || (self.finding_a == b && self.finding_b == a)
    }
}

/// Something the session still does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FindingCategory>,
    pub description: String,
}

/// A related initiative noticed along the way. Advisory only: surfaced to
/// observers, never researched automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredInitiative {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub discovered_in_cycle: u32,
}

/// The session's running merged state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intelligence {
    /// Append-only.
    pub findings: Vec<Finding>,
    pub contradictions: Vec<Contradiction>,
    pub gaps: Vec<Gap>,
    pub initiatives: Vec<DiscoveredInitiative>,
    /// Per-category narrative summaries, when the merger produced them.
    #[serde(default)]
    pub summaries: BTreeMap<FindingCategory, String>,
    /// Cycles whose merge fell back to raw concatenation.
    #[serde(default)]
    pub unsynthesized_cycles: Vec<u32>,
}

impl Intelligence {
    pub fn active(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_active())
    }

    pub fn active_in(&self, category: FindingCategory) -> impl Iterator<Item = &Finding> {
        self.active().filter(move |f| f.category == category)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn finding(&self, id: Uuid) -> Option<&Finding> {
        self.findings.iter().find(|f| f.id == id)
    }

    pub fn contradictions_in(
        &self,
        category: FindingCategory,
    ) -> impl Iterator<Item = &Contradiction> {
        self.contradictions
            .iter()
            .filter(move |c| c.category == category)
    }

    pub fn has_initiative(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.initiatives
            .iter()
            .any(|i| i.name.trim().to_lowercase() == name)
    }
}

/// A vendor offering, used by the formatter to recommend partners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub vendor_name: String,
    #[serde(default)]
    pub partnership_level: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Portfolio file layout: a list of `[[vendors]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub vendors: Vec<PortfolioItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_confidence_ordering() {
        assert!(ConfidenceLevel::None < ConfidenceLevel::Low);
        assert!(ConfidenceLevel::Low < ConfidenceLevel::Medium);
        assert!(ConfidenceLevel::Medium < ConfidenceLevel::High);
        assert!(ConfidenceLevel::High < ConfidenceLevel::Sufficient);
    }

    #[test]
    fn test_confidence_from_count() {
        assert_eq!(ConfidenceLevel::from_count(0), ConfidenceLevel::None);
        assert_eq!(ConfidenceLevel::from_count(1), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_count(3), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_count(5), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_count(12), ConfidenceLevel::Sufficient);
    }

    #[test]
    fn test_confidence_lowered_saturates() {
        assert_eq!(ConfidenceLevel::Sufficient.lowered(), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::None.lowered(), ConfidenceLevel::None);
    }

    #[test]
    fn test_assessment_is_total_after_partial_deserialize() {
        let assessment: ConfidenceAssessment =
            serde_json::from_str(r#"{"people": "high", "market": "low"}"#).unwrap();
        assert_eq!(assessment.get(FindingCategory::People), ConfidenceLevel::High);
        assert_eq!(
            assessment.get(FindingCategory::Financial),
            ConfidenceLevel::None
        );
        assert_eq!(assessment.iter().count(), 6);

        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 6);
        assert_eq!(json["technology"], "none");
    }

    #[test]
    fn test_assessment_floor_queries() {
        let mut assessment = ConfidenceAssessment::new();
        assert!(!assessment.any_above_none());
        for c in FindingCategory::ALL {
            assessment.set(c, ConfidenceLevel::Medium);
        }
        assert!(assessment.all_at_least(ConfidenceLevel::Medium));
        assessment.set(FindingCategory::Financial, ConfidenceLevel::Low);
        assert!(!assessment.all_at_least(ConfidenceLevel::Medium));
        assert_eq!(
            assessment.below(ConfidenceLevel::Medium),
            vec![FindingCategory::Financial]
        );
    }

    #[test]
    fn test_priority_sorts_high_first() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_category_parse_loose() {
        assert_eq!(
            FindingCategory::parse_loose(" Technology "),
            Some(FindingCategory::Technology)
        );
        assert_eq!(FindingCategory::parse_loose("weather"), None);
    }

    #[test]
    fn test_normalize_source() {
        assert_eq!(
            normalize_source("https://www.Acme.com/news/"),
            "acme.com/news"
        );
        assert_eq!(
            normalize_source("http://acme.com/news#section"),
            "acme.com/news"
        );
    }

    #[test]
    fn test_finding_text_includes_content_strings() {
        let finding = Finding::new(
            FindingCategory::People,
            "New CIO hired",
            PathId::new(1, "path_1"),
            1,
        )
        .with_content(serde_json::json!({"details": "Jane Doe joins from Initech", "year": 2025}));
        let text = finding.text();
        assert!(text.contains("New CIO hired"));
        assert!(text.contains("Jane Doe"));
        assert!(!text.contains("2025"));
    }

    #[test]
    fn test_path_id_format() {
        assert_eq!(PathId::new(3, "path_2").as_str(), "c3-path_2");
        assert_eq!(PathId::new(3, "path_2").cycle(), Some(3));
        assert_eq!(PathId::from("path_2").cycle(), None);
    }

    #[test]
    fn test_research_input_blank_industry() {
        let input = ResearchInput::new("Acme Corp", "  ", "cloud migration");
        assert!(input.industry.is_none());
    }

    #[test]
    fn test_portfolio_toml() {
        let portfolio: Portfolio = toml::from_str(
            r#"
[[vendors]]
vendor_name = "CloudCo"
partnership_level = "gold"
capabilities = ["cloud migration", "kubernetes"]
"#,
        )
        .unwrap();
        assert_eq!(portfolio.vendors.len(), 1);
        assert_eq!(portfolio.vendors[0].capabilities[1], "kubernetes");
    }
}

//! Merger role: folds a cycle's worker output into the accumulated
//! intelligence.
//!
//! Every merger shares the same deterministic ledger. Findings whose source
//! and category match an active finding are deduplicated by confidence (the
//! loser is marked, never dropped) and contradictions are retained with an
//! annotation. What differs between mergers is how the assessment, summaries
//! and gaps are produced.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::contradiction::ContradictionDetector;
use super::model::{
    Assignment, ConfidenceAssessment, ConfidenceLevel, Contradiction, ContradictionKind,
    DiscoveredInitiative, Finding, FindingCategory, FindingStatus, Gap, Intelligence,
    ResearchInput,
};
use super::worker::WorkerResult;
use crate::brain::{Brain, ReasoningRole, Reply, parse_json};
use crate::error::RoleError;
use crate::retry::RetryPolicy;
use crate::types::Message;

const ROLE: &str = "merger";

/// Tangential signals shorter than this are noise.
const MIN_SIGNAL_CHARS: usize = 30;

const MAX_INITIATIVE_NAME_CHARS: usize = 100;

/// Everything a merger sees for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct MergeRequest<'a> {
    pub cycle: u32,
    pub input: &'a ResearchInput,
    /// Only the paths allowed to contribute.
    pub results: &'a [WorkerResult],
    /// Assignments that produced nothing this cycle.
    pub unfilled: &'a [Assignment],
    /// Initiatives the planner surfaced this cycle.
    pub proposed: &'a [DiscoveredInitiative],
    pub prior: &'a Intelligence,
    pub prior_assessment: &'a ConfidenceAssessment,
    /// Session-wide cap on discovered initiatives.
    pub initiative_limit: usize,
}

/// The merger's result. `intelligence` replaces the prior snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub intelligence: Intelligence,
    pub assessment: ConfidenceAssessment,
    pub gaps: Vec<Gap>,
    /// Initiatives first surfaced in this cycle.
    pub discovered: Vec<DiscoveredInitiative>,
    /// New non-duplicate findings.
    pub new_findings: usize,
    pub new_contradictions: usize,
    /// Produced by the raw fallback rather than a merger.
    pub unsynthesized: bool,
}

/// Merger role contract.
#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(&self, request: MergeRequest<'_>) -> Result<MergeOutcome, RoleError>;
}

/// Result of running the dedup ledger over a batch.
struct Ledger {
    intelligence: Intelligence,
    new_findings: usize,
    new_contradictions: Vec<Contradiction>,
}

/// Append a batch to a copy of `prior`, marking duplicates.
fn absorb(prior: &Intelligence, results: &[WorkerResult], cycle: u32, detect: bool) -> Ledger {
    let mut intelligence = prior.clone();
    let mut index: HashMap<(FindingCategory, String), usize> = intelligence
        .findings
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_active())
        .map(|(i, f)| ((f.category, dedup_key(f)), i))
        .collect();

    let mut new_findings = 0;
    let mut incoming_ids = Vec::new();
    for mut finding in results.iter().flat_map(|r| r.findings.iter().cloned()) {
        finding.status = FindingStatus::Active;
        let key = (finding.category, dedup_key(&finding));
        match index.get(&key).copied() {
            None => {
                new_findings += 1;
                index.insert(key, intelligence.findings.len());
            }
            Some(pos) => {
                let existing = &mut intelligence.findings[pos];
                if finding.confidence > existing.confidence {
                    existing.status = FindingStatus::Superseded { by: finding.id };
                    index.insert(key, intelligence.findings.len());
                } else if finding.confidence < existing.confidence {
                    finding.status = FindingStatus::Superseded { by: existing.id };
                } else {
                    finding.status = FindingStatus::Duplicate { of: existing.id };
                }
            }
        }
        if finding.is_active() {
            incoming_ids.push(finding.id);
        }
        intelligence.findings.push(finding);
    }

    let mut new_contradictions = Vec::new();
    if detect {
        let incoming: Vec<&Finding> = intelligence
            .findings
            .iter()
            .filter(|f| f.is_active() && incoming_ids.contains(&f.id))
            .collect();
        let existing: Vec<&Finding> = intelligence
            .active()
            .filter(|f| !incoming_ids.contains(&f.id))
            .collect();
        new_contradictions = ContradictionDetector::new().detect(
            &incoming,
            &existing,
            &intelligence.contradictions,
            cycle,
        );
    }
    intelligence
        .contradictions
        .extend(new_contradictions.iter().cloned());

    Ledger {
        intelligence,
        new_findings,
        new_contradictions,
    }
}

/// Normalized source, or the summary text for unsourced findings.
fn dedup_key(finding: &Finding) -> String {
    finding
        .source_key()
        .unwrap_or_else(|| format!("text:{}", finding.summary.trim().to_lowercase()))
}

/// Counts of active findings, kept from falling below the prior level
/// except where a new contradiction landed (one level down).
fn heuristic_assessment(
    intelligence: &Intelligence,
    prior: &ConfidenceAssessment,
    contradicted: &HashSet<FindingCategory>,
) -> ConfidenceAssessment {
    let mut assessment = ConfidenceAssessment::new();
    for category in FindingCategory::ALL {
        let counted = ConfidenceLevel::from_count(intelligence.active_in(category).count());
        let level = counted.max(prior.get(category));
        let level = if contradicted.contains(&category) {
            level.lowered()
        } else {
            level
        };
        assessment.set(category, level);
    }
    assessment
}

/// Categories below `medium` plus assignments that came back empty.
fn identify_gaps(assessment: &ConfidenceAssessment, unfilled: &[Assignment]) -> Vec<Gap> {
    let mut gaps: Vec<Gap> = assessment
        .below(ConfidenceLevel::Medium)
        .into_iter()
        .map(|category| Gap {
            category: Some(category),
            description: format!(
                "{} coverage is {}",
                category.title(),
                assessment.get(category)
            ),
        })
        .collect();
    gaps.extend(unfilled.iter().map(|a| Gap {
        category: a.category,
        description: format!("Unanswered: {}", a.topic),
    }));
    gaps
}

/// Fold planner proposals and worker tangential signals into the session's
/// initiatives. Returns the ones added.
fn discover_initiatives(
    intelligence: &mut Intelligence,
    proposed: &[DiscoveredInitiative],
    results: &[WorkerResult],
    cycle: u32,
    limit: usize,
) -> Vec<DiscoveredInitiative> {
    let from_signals = results
        .iter()
        .flat_map(|r| r.tangential_signals.iter())
        .map(|s| s.trim())
        .filter(|s| s.chars().count() >= MIN_SIGNAL_CHARS)
        .map(|signal| DiscoveredInitiative {
            name: signal.chars().take(MAX_INITIATIVE_NAME_CHARS).collect(),
            description: signal.to_string(),
            evidence: Vec::new(),
            discovered_in_cycle: cycle,
        });

    let mut added = Vec::new();
    for initiative in proposed.iter().cloned().chain(from_signals) {
        if intelligence.initiatives.len() >= limit {
            break;
        }
        if initiative.name.trim().is_empty() || intelligence.has_initiative(&initiative.name) {
            continue;
        }
        intelligence.initiatives.push(initiative.clone());
        added.push(initiative);
    }
    added
}

fn contradicted_categories(contradictions: &[Contradiction]) -> HashSet<FindingCategory> {
    contradictions.iter().map(|c| c.category).collect()
}

/// Raw concatenation with dedup by source URL. Used when a merger fails;
/// the prior assessment stands and the cycle is flagged unsynthesized.
pub fn fallback_merge(request: MergeRequest<'_>) -> MergeOutcome {
    let Ledger {
        mut intelligence,
        new_findings,
        ..
    } = absorb(request.prior, request.results, request.cycle, false);
    let discovered = discover_initiatives(
        &mut intelligence,
        request.proposed,
        request.results,
        request.cycle,
        request.initiative_limit,
    );
    intelligence.unsynthesized_cycles.push(request.cycle);
    let gaps = intelligence.gaps.clone();

    MergeOutcome {
        intelligence,
        assessment: request.prior_assessment.clone(),
        gaps,
        discovered,
        new_findings,
        new_contradictions: 0,
        unsynthesized: true,
    }
}

/// Deterministic merger: no reasoning calls.
#[derive(Debug, Default)]
pub struct HeuristicMerger;

impl HeuristicMerger {
    pub fn new() -> Self {
        Self
    }

    fn merge_now(&self, request: MergeRequest<'_>) -> MergeOutcome {
        let Ledger {
            mut intelligence,
            new_findings,
            new_contradictions,
        } = absorb(request.prior, request.results, request.cycle, true);

        let assessment = heuristic_assessment(
            &intelligence,
            request.prior_assessment,
            &contradicted_categories(&new_contradictions),
        );
        let gaps = identify_gaps(&assessment, request.unfilled);
        intelligence.gaps = gaps.clone();
        let discovered = discover_initiatives(
            &mut intelligence,
            request.proposed,
            request.results,
            request.cycle,
            request.initiative_limit,
        );

        MergeOutcome {
            intelligence,
            assessment,
            gaps,
            discovered,
            new_findings,
            new_contradictions: new_contradictions.len(),
            unsynthesized: false,
        }
    }
}

#[async_trait]
impl Merger for HeuristicMerger {
    async fn merge(&self, request: MergeRequest<'_>) -> Result<MergeOutcome, RoleError> {
        Ok(self.merge_now(request))
    }
}

const MERGER_SYSTEM_PROMPT: &str = r#"You merge research findings about one company initiative into structured intelligence for a sales team.
Findings are listed by category with short ids like F3. For each category write a short summary,
rate confidence, and point out findings that disagree, saying which seems more reliable and why.
Reply with JSON only:
{
  "categories": {
    "people": {"summary": "...", "insights": ["..."], "confidence": "none|low|medium|high|sufficient"}
  },
  "contradictions": [{"findings": ["F1", "F4"], "annotation": "why they conflict and which is more reliable"}],
  "gaps": [{"category": "financial", "description": "what is still unknown"}],
  "tangential_initiatives": [{"name": "...", "description": "...", "evidence": ["..."]}]
}"#;

#[derive(Debug, Default, Deserialize)]
struct MergerReply {
    #[serde(default)]
    categories: BTreeMap<String, CategoryReply>,
    #[serde(default)]
    contradictions: Vec<ContradictionReply>,
    #[serde(default)]
    gaps: Vec<GapReply>,
    #[serde(default)]
    tangential_initiatives: Vec<InitiativeReply>,
}

#[derive(Debug, Default, Deserialize)]
struct CategoryReply {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    insights: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContradictionReply {
    findings: Vec<String>,
    #[serde(default)]
    annotation: String,
}

#[derive(Debug, Deserialize)]
struct GapReply {
    #[serde(default)]
    category: Option<String>,
    description: String,
}

#[derive(Debug, Deserialize)]
struct InitiativeReply {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    evidence: Vec<String>,
}

/// Merger backed by the reasoning capability. The dedup ledger and the
/// heuristic contradiction checks still run locally.
pub struct LlmMerger {
    brain: Arc<Brain>,
    retry: RetryPolicy,
}

impl LlmMerger {
    pub fn new(brain: Arc<Brain>, retry: RetryPolicy) -> Self {
        Self { brain, retry }
    }

    async fn ask(&self, prompt: &str) -> Result<MergerReply, RoleError> {
        let reply = self
            .brain
            .invoke(
                ReasoningRole::Merger,
                MERGER_SYSTEM_PROMPT,
                &[Message::user(prompt)],
                &[],
            )
            .await
            .map_err(|source| RoleError::Capability { role: ROLE, source })?;
        match reply {
            Reply::Final { text } => parse_json(&text).map_err(|message| RoleError::Schema {
                role: ROLE,
                message,
            }),
            Reply::Actions { .. } => Err(RoleError::Schema {
                role: ROLE,
                message: "requested actions instead of returning a synthesis".into(),
            }),
        }
    }
}

/// Active findings numbered `F1..` for the prompt, with the id table.
fn merge_prompt(input: &ResearchInput, intelligence: &Intelligence) -> (String, Vec<Uuid>) {
    let mut ids = Vec::new();
    let mut prompt = format!(
        "Company: {}\nInitiative: {}\n",
        input.company, input.initiative
    );
    if let Some(question) = &input.follow_up {
        prompt.push_str(&format!("Follow-up question: {question}\n"));
    }
    for category in FindingCategory::ALL {
        let findings: Vec<&Finding> = intelligence.active_in(category).collect();
        if findings.is_empty() {
            continue;
        }
        prompt.push_str(&format!("\n### {}\n", category.title()));
        for finding in findings {
            ids.push(finding.id);
            prompt.push_str(&format!(
                "F{} (confidence {:.2}): {}\n",
                ids.len(),
                finding.confidence,
                finding.summary
            ));
            if let Some(source) = &finding.source {
                prompt.push_str(&format!("  Source: {source}\n"));
            }
        }
    }
    (prompt, ids)
}

fn resolve_ref(reference: &str, ids: &[Uuid]) -> Option<Uuid> {
    let n: usize = reference.trim().trim_start_matches(['F', 'f']).parse().ok()?;
    ids.get(n.checked_sub(1)?).copied()
}

#[async_trait]
impl Merger for LlmMerger {
    async fn merge(&self, request: MergeRequest<'_>) -> Result<MergeOutcome, RoleError> {
        let Ledger {
            mut intelligence,
            new_findings,
            mut new_contradictions,
        } = absorb(request.prior, request.results, request.cycle, true);

        let (prompt, ids) = merge_prompt(request.input, &intelligence);
        let reply = self.retry.run("merger", || self.ask(&prompt)).await?;

        for raw in reply.contradictions {
            let refs: Vec<Uuid> = raw
                .findings
                .iter()
                .filter_map(|r| resolve_ref(r, &ids))
                .collect();
            let [a, b] = refs[..] else {
                debug!(findings = ?raw.findings, "Ignoring contradiction without two findings");
                continue;
            };
            let (Some(fa), Some(fb)) = (intelligence.finding(a), intelligence.finding(b)) else {
                continue;
            };
            if a == b
                || fa.category != fb.category
                || intelligence.contradictions.iter().any(|c| c.involves(a, b))
            {
                continue;
            }
            let contradiction = Contradiction {
                category: fa.category,
                finding_a: a,
                finding_b: b,
                kind: ContradictionKind::Interpretive,
                annotation: raw.annotation,
                detected_in_cycle: request.cycle,
            };
            intelligence.contradictions.push(contradiction.clone());
            new_contradictions.push(contradiction);
        }

        let contradicted = contradicted_categories(&new_contradictions);
        let baseline =
            heuristic_assessment(&intelligence, request.prior_assessment, &contradicted);
        let mut assessment = ConfidenceAssessment::new();
        for category in FindingCategory::ALL {
            let stated = reply
                .categories
                .get(category.as_str())
                .and_then(|c| c.confidence.as_deref())
                .and_then(ConfidenceLevel::parse_loose);
            let level = match stated {
                Some(level) if contradicted.contains(&category) => level,
                Some(level) => level.max(request.prior_assessment.get(category)),
                None => baseline.get(category),
            };
            assessment.set(category, level);
        }

        for (name, stated) in &reply.categories {
            let Some(category) = FindingCategory::parse_loose(name) else {
                warn!(category = %name, "Merger returned an unknown category");
                continue;
            };
            let mut summary = stated.summary.trim().to_string();
            for insight in stated.insights.iter().filter(|i| !i.trim().is_empty()) {
                summary.push_str(&format!("\n- {}", insight.trim()));
            }
            if !summary.is_empty() {
                intelligence.summaries.insert(category, summary);
            }
        }

        let mut gaps = identify_gaps(&assessment, request.unfilled);
        gaps.extend(reply.gaps.into_iter().map(|g| Gap {
            category: g.category.as_deref().and_then(FindingCategory::parse_loose),
            description: g.description,
        }));
        intelligence.gaps = gaps.clone();

        let mut proposed = request.proposed.to_vec();
        proposed.extend(
            reply
                .tangential_initiatives
                .into_iter()
                .map(|i| DiscoveredInitiative {
                    name: i.name,
                    description: i.description,
                    evidence: i.evidence,
                    discovered_in_cycle: request.cycle,
                }),
        );
        let discovered = discover_initiatives(
            &mut intelligence,
            &proposed,
            request.results,
            request.cycle,
            request.initiative_limit,
        );

        Ok(MergeOutcome {
            intelligence,
            assessment,
            gaps,
            discovered,
            new_findings,
            new_contradictions: new_contradictions.len(),
            unsynthesized: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::LlmConfig;
    use crate::error::LlmError;
    use crate::research::model::PathId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn input() -> ResearchInput {
        ResearchInput::new("Acme Corp", "Manufacturing", "cloud migration")
    }

    fn finding(category: FindingCategory, summary: &str, source: &str, confidence: f64) -> Finding {
        Finding::new(category, summary, PathId::new(1, "path_1"), 1)
            .with_source(source)
            .with_confidence(confidence)
    }

    fn result(findings: Vec<Finding>) -> WorkerResult {
        WorkerResult::completed(PathId::new(1, "path_1"), findings)
    }

    fn request<'a>(
        results: &'a [WorkerResult],
        prior: &'a Intelligence,
        prior_assessment: &'a ConfidenceAssessment,
        input: &'a ResearchInput,
    ) -> MergeRequest<'a> {
        MergeRequest {
            cycle: 2,
            input,
            results,
            unfilled: &[],
            proposed: &[],
            prior,
            prior_assessment,
            initiative_limit: 5,
        }
    }

    #[tokio::test]
    async fn test_dedup_keeps_higher_confidence() {
        let input = input();
        let old = finding(
            FindingCategory::Technology,
            "Acme runs SAP on premises",
            "https://acme.com/it",
            0.4,
        );
        let prior = Intelligence {
            findings: vec![old.clone()],
            ..Default::default()
        };
        let better = finding(
            FindingCategory::Technology,
            "Acme runs SAP ECC on premises in two data centers",
            "http://www.acme.com/it/",
            0.9,
        );
        let results = vec![result(vec![better.clone()])];
        let assessment = ConfidenceAssessment::new();

        let outcome = HeuristicMerger::new()
            .merge(request(&results, &prior, &assessment, &input))
            .await
            .unwrap();

        assert_eq!(outcome.intelligence.findings.len(), 2);
        assert_eq!(outcome.new_findings, 0);
        let old_now = outcome.intelligence.finding(old.id).unwrap();
        assert_eq!(old_now.status, FindingStatus::Superseded { by: better.id });
        assert!(outcome.intelligence.finding(better.id).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_equal_confidence_marks_later_duplicate() {
        let input = input();
        let first = finding(FindingCategory::People, "CIO is Jane Doe", "https://a.com", 0.5);
        let second = finding(FindingCategory::People, "Jane Doe is CIO", "https://a.com", 0.5);
        let results = vec![result(vec![first.clone(), second.clone()])];
        let prior = Intelligence::default();
        let assessment = ConfidenceAssessment::new();

        let outcome = HeuristicMerger::new()
            .merge(request(&results, &prior, &assessment, &input))
            .await
            .unwrap();
        assert_eq!(outcome.new_findings, 1);
        assert_eq!(
            outcome.intelligence.finding(second.id).unwrap().status,
            FindingStatus::Duplicate { of: first.id }
        );
    }

    #[tokio::test]
    async fn test_same_source_different_category_is_kept() {
        let input = input();
        let results = vec![result(vec![
            finding(FindingCategory::People, "New CTO hired", "https://a.com/pr", 0.5),
            finding(FindingCategory::Financial, "Capex up 20%", "https://a.com/pr", 0.5),
        ])];
        let prior = Intelligence::default();
        let assessment = ConfidenceAssessment::new();
        let outcome = HeuristicMerger::new()
            .merge(request(&results, &prior, &assessment, &input))
            .await
            .unwrap();
        assert_eq!(outcome.new_findings, 2);
        assert_eq!(outcome.intelligence.active_count(), 2);
    }

    #[tokio::test]
    async fn test_assessment_from_counts_and_gaps() {
        let input = input();
        let results = vec![result(vec![
            finding(FindingCategory::Technology, "Uses AWS", "https://a.com", 0.5),
            finding(FindingCategory::Technology, "Hiring Kubernetes engineers", "https://b.com", 0.5),
            finding(FindingCategory::People, "CIO named", "https://c.com", 0.5),
        ])];
        let prior = Intelligence::default();
        let assessment = ConfidenceAssessment::new();
        let unfilled = vec![Assignment::new("path_9", "Budget owner").with_category(FindingCategory::Financial)];
        let mut req = request(&results, &prior, &assessment, &input);
        req.unfilled = &unfilled;

        let outcome = HeuristicMerger::new().merge(req).await.unwrap();
        assert_eq!(
            outcome.assessment.get(FindingCategory::Technology),
            ConfidenceLevel::Medium
        );
        assert_eq!(
            outcome.assessment.get(FindingCategory::People),
            ConfidenceLevel::Low
        );
        assert!(outcome.assessment.any_above_none());
        assert!(
            outcome
                .gaps
                .iter()
                .any(|g| g.category == Some(FindingCategory::People))
        );
        assert!(outcome.gaps.iter().any(|g| g.description == "Unanswered: Budget owner"));
        assert!(
            !outcome
                .gaps
                .iter()
                .any(|g| g.category == Some(FindingCategory::Technology))
        );
        assert_eq!(outcome.intelligence.gaps, outcome.gaps);
    }

    #[tokio::test]
    async fn test_assessment_never_drops_without_contradiction() {
        let input = input();
        let prior = Intelligence::default();
        let prior_assessment =
            ConfidenceAssessment::new().with(FindingCategory::Market, ConfidenceLevel::High);
        let results: Vec<WorkerResult> = Vec::new();
        let outcome = HeuristicMerger::new()
            .merge(request(&results, &prior, &prior_assessment, &input))
            .await
            .unwrap();
        assert_eq!(
            outcome.assessment.get(FindingCategory::Market),
            ConfidenceLevel::High
        );
    }

    #[tokio::test]
    async fn test_new_contradiction_lowers_level() {
        let input = input();
        let old = finding(
            FindingCategory::Technology,
            "Acme selected AWS as primary cloud provider",
            "https://acme.com/press",
            0.8,
        );
        let prior = Intelligence {
            findings: vec![old],
            ..Default::default()
        };
        let prior_assessment =
            ConfidenceAssessment::new().with(FindingCategory::Technology, ConfidenceLevel::Medium);
        let results = vec![result(vec![finding(
            FindingCategory::Technology,
            "Acme has not selected AWS as primary cloud provider",
            "https://news.example.com/acme",
            0.6,
        )])];

        let outcome = HeuristicMerger::new()
            .merge(request(&results, &prior, &prior_assessment, &input))
            .await
            .unwrap();
        assert_eq!(outcome.new_contradictions, 1);
        assert_eq!(outcome.intelligence.contradictions.len(), 1);
        assert_eq!(outcome.intelligence.active_count(), 2);
        assert_eq!(
            outcome.assessment.get(FindingCategory::Technology),
            ConfidenceLevel::Low
        );
    }

    #[tokio::test]
    async fn test_initiatives_from_signals_capped_and_deduped() {
        let input = input();
        let mut r = result(Vec::new());
        r.tangential_signals = vec![
            "short".into(),
            "Acme is consolidating its ERP systems across plants".into(),
            "Acme is consolidating its ERP systems across plants".into(),
        ];
        let results = vec![r];
        let prior = Intelligence {
            initiatives: (0..4)
                .map(|i| DiscoveredInitiative {
                    name: format!("existing {i}"),
                    description: String::new(),
                    evidence: Vec::new(),
                    discovered_in_cycle: 1,
                })
                .collect(),
            ..Default::default()
        };
        let mut r2 = result(Vec::new());
        r2.tangential_signals = vec!["A second long enough signal about data centers".into()];
        let results = [results, vec![r2]].concat();
        let assessment = ConfidenceAssessment::new();

        let outcome = HeuristicMerger::new()
            .merge(request(&results, &prior, &assessment, &input))
            .await
            .unwrap();
        assert_eq!(outcome.discovered.len(), 1);
        assert_eq!(outcome.intelligence.initiatives.len(), 5);
        assert_eq!(
            outcome.discovered[0].name,
            "Acme is consolidating its ERP systems across plants"
        );
    }

    #[test]
    fn test_fallback_keeps_prior_assessment() {
        let input = input();
        let results = vec![result(vec![
            finding(FindingCategory::Market, "Market grows 8%", "https://a.com/r", 0.5),
            finding(FindingCategory::Market, "Market grows 8% a year", "https://a.com/r/", 0.5),
        ])];
        let prior = Intelligence::default();
        let prior_assessment =
            ConfidenceAssessment::new().with(FindingCategory::Market, ConfidenceLevel::Low);

        let outcome = fallback_merge(request(&results, &prior, &prior_assessment, &input));
        assert!(outcome.unsynthesized);
        assert_eq!(outcome.assessment, prior_assessment);
        assert_eq!(outcome.new_findings, 1);
        assert_eq!(outcome.intelligence.findings.len(), 2);
        assert_eq!(outcome.intelligence.unsynthesized_cycles, vec![2]);
    }

    fn brain(provider: Arc<MockLlmProvider>) -> Arc<Brain> {
        Arc::new(Brain::new(provider, LlmConfig::default()))
    }

    #[tokio::test]
    async fn test_llm_merger_applies_reply() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::json_response(&json!({
            "categories": {
                "technology": {
                    "summary": "Acme is moving workloads to AWS.",
                    "insights": ["Migration starts with ERP"],
                    "confidence": "high"
                }
            },
            "contradictions": [{"findings": ["F1", "F2"], "annotation": "Dates differ; the press release is newer."}],
            "gaps": [{"category": "financial", "description": "Budget unknown"}],
            "tangential_initiatives": [{"name": "Plant IoT rollout", "description": "Sensors in all plants"}]
        })));
        let merger = LlmMerger::new(brain(provider.clone()), RetryPolicy::none());

        let input = input();
        let results = vec![result(vec![
            finding(FindingCategory::Technology, "Migration begins in Q1", "https://a.com", 0.6),
            finding(FindingCategory::Technology, "Workloads move to AWS", "https://b.com", 0.7),
        ])];
        let prior = Intelligence::default();
        let assessment = ConfidenceAssessment::new();
        let outcome = merger
            .merge(request(&results, &prior, &assessment, &input))
            .await
            .unwrap();

        assert_eq!(
            outcome.assessment.get(FindingCategory::Technology),
            ConfidenceLevel::High
        );
        assert_eq!(
            outcome.assessment.get(FindingCategory::People),
            ConfidenceLevel::None
        );
        assert_eq!(outcome.intelligence.contradictions.len(), 1);
        assert_eq!(
            outcome.intelligence.contradictions[0].kind,
            ContradictionKind::Interpretive
        );
        assert!(
            outcome.intelligence.summaries[&FindingCategory::Technology]
                .contains("Migration starts with ERP")
        );
        assert!(outcome.gaps.iter().any(|g| g.description == "Budget unknown"));
        assert_eq!(outcome.discovered[0].name, "Plant IoT rollout");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_merger_failure_surfaces_role_error() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_error(LlmError::Connection {
            message: "refused".into(),
        });
        let merger = LlmMerger::new(brain(provider), RetryPolicy::none());
        let input = input();
        let prior = Intelligence::default();
        let assessment = ConfidenceAssessment::new();
        let err = merger
            .merge(request(&[], &prior, &assessment, &input))
            .await
            .unwrap_err();
        assert_eq!(err.role(), "merger");
    }

    #[test]
    fn test_resolve_ref() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        assert_eq!(resolve_ref("F2", &ids), Some(ids[1]));
        assert_eq!(resolve_ref("F0", &ids), None);
        assert_eq!(resolve_ref("F3", &ids), None);
        assert_eq!(resolve_ref("x", &ids), None);
    }
}

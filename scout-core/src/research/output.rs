//! Formatter role: renders accumulated intelligence into a dashboard.
//!
//! Formatting is a pure function of its inputs. It never feeds back into
//! the assessment or the stop decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::model::{
    ConfidenceAssessment, ConfidenceLevel, Finding, FindingCategory, Intelligence, Portfolio,
    PortfolioItem, ResearchInput,
};
use crate::error::RoleError;

/// Findings shown per category section.
const MAX_FINDINGS_PER_SECTION: usize = 10;

/// Supporting findings quoted per recommendation.
const MAX_SUPPORTING_FINDINGS: usize = 3;

/// One finding as displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingLine {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub confidence: f64,
}

/// Everything shown for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySection {
    pub category: FindingCategory,
    pub confidence: ConfidenceLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub findings: Vec<FindingLine>,
    /// Contradiction annotations.
    #[serde(default)]
    pub contradictions: Vec<String>,
}

/// A portfolio vendor that fits what the research found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRecommendation {
    pub vendor: String,
    #[serde(default)]
    pub partnership_level: String,
    pub capability: String,
    pub relevance: String,
    pub supporting_findings: Vec<String>,
}

/// The presentation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub company: String,
    pub initiative: String,
    pub sections: Vec<CategorySection>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub initiatives: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<PortfolioRecommendation>,
    /// Some cycle fell back to raw concatenation.
    #[serde(default)]
    pub unsynthesized: bool,
    pub generated_at: DateTime<Utc>,
}

impl Dashboard {
    pub fn section(&self, category: FindingCategory) -> Option<&CategorySection> {
        self.sections.iter().find(|s| s.category == category)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}: {}\n\n", self.company, self.initiative);
        if self.unsynthesized {
            out.push_str("_Some cycles could not be synthesized; raw findings are shown._\n\n");
        }

        out.push_str("| Category | Confidence | Findings |\n|---|---|---|\n");
        for section in &self.sections {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                section.category.title(),
                section.confidence,
                section.findings.len()
            ));
        }

        for section in &self.sections {
            out.push_str(&format!(
                "\n## {} ({})\n\n",
                section.category.title(),
                section.confidence
            ));
            if let Some(summary) = &section.summary {
                out.push_str(summary);
                out.push_str("\n\n");
            }
            if section.findings.is_empty() {
                out.push_str("Nothing found yet.\n");
            }
            for line in &section.findings {
                match &line.source {
                    Some(source) => out.push_str(&format!("- {} ([source]({source}))\n", line.summary)),
                    None => out.push_str(&format!("- {}\n", line.summary)),
                }
            }
            if !section.contradictions.is_empty() {
                out.push_str("\n**Conflicting reports**\n\n");
                for note in &section.contradictions {
                    out.push_str(&format!("- {note}\n"));
                }
            }
        }

        if !self.gaps.is_empty() {
            out.push_str("\n## Open Questions\n\n");
            for gap in &self.gaps {
                out.push_str(&format!("- {gap}\n"));
            }
        }
        if !self.initiatives.is_empty() {
            out.push_str("\n## Related Initiatives\n\n");
            for name in &self.initiatives {
                out.push_str(&format!("- {name}\n"));
            }
        }
        if !self.recommendations.is_empty() {
            out.push_str("\n## Recommended Partners\n\n");
            for rec in &self.recommendations {
                out.push_str(&format!(
                    "- **{}** ({}): {}. {}\n",
                    rec.vendor, rec.partnership_level, rec.capability, rec.relevance
                ));
            }
        }
        out
    }
}

/// Formatter role contract.
#[async_trait]
pub trait Formatter: Send + Sync {
    async fn format(
        &self,
        input: &ResearchInput,
        intelligence: &Intelligence,
        assessment: &ConfidenceAssessment,
        portfolio: Option<&Portfolio>,
    ) -> Result<Dashboard, RoleError>;
}

/// Builds the dashboard directly from the intelligence.
#[derive(Debug, Default)]
pub struct DashboardFormatter;

impl DashboardFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        input: &ResearchInput,
        intelligence: &Intelligence,
        assessment: &ConfidenceAssessment,
        portfolio: Option<&Portfolio>,
    ) -> Dashboard {
        let sections = FindingCategory::ALL
            .into_iter()
            .map(|category| section(category, intelligence, assessment))
            .collect();

        Dashboard {
            company: input.company.clone(),
            initiative: input.initiative.clone(),
            sections,
            gaps: intelligence
                .gaps
                .iter()
                .map(|g| g.description.clone())
                .collect(),
            initiatives: intelligence
                .initiatives
                .iter()
                .map(|i| i.name.clone())
                .collect(),
            recommendations: portfolio
                .map(|p| recommend(p, intelligence))
                .unwrap_or_default(),
            unsynthesized: !intelligence.unsynthesized_cycles.is_empty(),
            generated_at: Utc::now(),
        }
    }
}

#[async_trait]
impl Formatter for DashboardFormatter {
    async fn format(
        &self,
        input: &ResearchInput,
        intelligence: &Intelligence,
        assessment: &ConfidenceAssessment,
        portfolio: Option<&Portfolio>,
    ) -> Result<Dashboard, RoleError> {
        Ok(self.render(input, intelligence, assessment, portfolio))
    }
}

fn section(
    category: FindingCategory,
    intelligence: &Intelligence,
    assessment: &ConfidenceAssessment,
) -> CategorySection {
    let mut findings: Vec<&Finding> = intelligence.active_in(category).collect();
    findings.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    CategorySection {
        category,
        confidence: assessment.get(category),
        summary: intelligence.summaries.get(&category).cloned(),
        findings: findings
            .into_iter()
            .take(MAX_FINDINGS_PER_SECTION)
            .map(|f| FindingLine {
                summary: f.summary.clone(),
                source: f.source.clone(),
                confidence: f.confidence,
            })
            .collect(),
        contradictions: intelligence
            .contradictions_in(category)
            .map(|c| c.annotation.clone())
            .collect(),
    }
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(String::from)
        .collect()
}

/// A capability matches a finding when every significant word of the
/// capability appears in the finding's text.
fn supports(capability: &HashSet<String>, finding: &HashSet<String>) -> bool {
    !capability.is_empty() && capability.is_subset(finding)
}

fn recommend(portfolio: &Portfolio, intelligence: &Intelligence) -> Vec<PortfolioRecommendation> {
    let texts: Vec<(&Finding, HashSet<String>)> = intelligence
        .active()
        .map(|f| (f, words(&f.text())))
        .collect();

    let mut recommendations: Vec<(usize, PortfolioRecommendation)> = portfolio
        .vendors
        .iter()
        .filter_map(|vendor| best_match(vendor, &texts))
        .collect();
    recommendations.sort_by(|a, b| b.0.cmp(&a.0));
    recommendations.into_iter().map(|(_, r)| r).collect()
}

fn best_match(
    vendor: &PortfolioItem,
    texts: &[(&Finding, HashSet<String>)],
) -> Option<(usize, PortfolioRecommendation)> {
    vendor
        .capabilities
        .iter()
        .map(|capability| {
            let wanted = words(capability);
            let support: Vec<&Finding> = texts
                .iter()
                .filter(|(_, text)| supports(&wanted, text))
                .map(|(f, _)| *f)
                .collect();
            (capability, support)
        })
        .filter(|(_, support)| !support.is_empty())
        .max_by_key(|(_, support)| support.len())
        .map(|(capability, support)| {
            let count = support.len();
            let recommendation = PortfolioRecommendation {
                vendor: vendor.vendor_name.clone(),
                partnership_level: vendor.partnership_level.clone(),
                capability: capability.clone(),
                relevance: format!(
                    "{count} finding{} point to a need for {capability}",
                    if count == 1 { "" } else { "s" }
                ),
                supporting_findings: support
                    .iter()
                    .take(MAX_SUPPORTING_FINDINGS)
                    .map(|f| f.summary.clone())
                    .collect(),
            };
            (count, recommendation)
        })
}

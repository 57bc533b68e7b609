//! SEC EDGAR full-text filing search. No key needed, but EDGAR requires a
//! user agent with contact details.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Client;
use scout_core::actions::ActionCapability;
use scout_core::error::ActionError;
use serde_json::{Value, json};
use tracing::info;

use crate::http::{
    build_client, check_status, decode_json, optional_str, required_str, send_error,
    truncate_chars,
};

const EDGAR_SEARCH_URL: &str = "https://efts.sec.gov/LATEST/search-index";
const EDGAR_ARCHIVE_URL: &str = "https://www.sec.gov/Archives/edgar/data";

const FILING_TYPES: [&str; 3] = ["10-K", "10-Q", "8-K"];

/// Filings older than this many years are not searched.
const LOOKBACK_YEARS: i32 = 5;

const MAX_FILINGS: usize = 10;
const MAX_EXCERPT_CHARS: usize = 500;

pub struct SecFilingsAction {
    client: Client,
    search_url: String,
}

impl SecFilingsAction {
    pub fn new(user_agent: &str) -> Result<Self, ActionError> {
        Ok(Self {
            client: build_client("sec_filings", user_agent)?,
            search_url: EDGAR_SEARCH_URL.to_string(),
        })
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    pub(crate) fn url(
        &self,
        company: &str,
        filing_type: Option<&str>,
        keywords: Option<&str>,
        today: NaiveDate,
    ) -> String {
        let mut terms = vec![format!("\"{company}\"")];
        if let Some(keywords) = keywords {
            terms.push(format!("\"{keywords}\""));
        }
        let start = today
            .with_year(today.year() - LOOKBACK_YEARS)
            .unwrap_or(today);

        let mut params = vec![
            ("q", terms.join(" ")),
            ("dateRange", "custom".to_string()),
            ("startdt", start.format("%Y-%m-%d").to_string()),
            ("enddt", today.format("%Y-%m-%d").to_string()),
            ("from", "0".to_string()),
        ];
        if let Some(form) = filing_type {
            params.push(("forms", form.to_string()));
        }
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.search_url)
    }
}

/// Turn EDGAR search hits into filing rows.
pub(crate) fn parse_filings(body: &Value, company: &str) -> (Vec<Value>, u64) {
    let total = body
        .pointer("/hits/total/value")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let filings = body
        .pointer("/hits/hits")
        .and_then(|v| v.as_array())
        .map(|hits| {
            hits.iter()
                .take(MAX_FILINGS)
                .map(|hit| filing_row(hit, company))
                .collect()
        })
        .unwrap_or_default();
    (filings, total)
}

fn filing_row(hit: &Value, company: &str) -> Value {
    let source = hit.get("_source").cloned().unwrap_or(Value::Null);
    let text = |key: &str| {
        source
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let first = |key: &str| {
        source
            .get(key)
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let accession = text("adsh").replace('-', "");
    // `_id` is "<accession>:<file name>".
    let file_name = hit
        .get("_id")
        .and_then(|v| v.as_str())
        .and_then(|id| id.split_once(':'))
        .map(|(_, file)| file.to_string())
        .unwrap_or_default();
    let url = match first("ciks") {
        Some(cik) if !accession.is_empty() => {
            let cik = cik.trim_start_matches('0');
            format!("{EDGAR_ARCHIVE_URL}/{cik}/{accession}/{file_name}")
        }
        _ => String::new(),
    };

    let excerpt = hit
        .get("highlight")
        .and_then(|h| h.as_object())
        .and_then(|h| h.values().find_map(|v| v.as_array()?.first()?.as_str()))
        .map(|s| truncate_chars(s, MAX_EXCERPT_CHARS).0);

    json!({
        "filing_type": first("root_forms").unwrap_or_else(|| text("form")),
        "filed_date": text("file_date"),
        "company": first("display_names").unwrap_or_else(|| company.to_string()),
        "description": text("file_description"),
        "url": url,
        "excerpt": excerpt,
    })
}

#[async_trait]
impl ActionCapability for SecFilingsAction {
    fn name(&self) -> &str {
        "sec_filings"
    }

    fn description(&self) -> &str {
        "Search SEC EDGAR filings of public companies: 10-K annual reports, 10-Q quarterly \
         reports, 8-K current events. Useful for financials, strategic priorities, executive \
         commentary and material events."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "company_name": {
                    "type": "string",
                    "description": "Company to search for, e.g. 'Acme Corp'"
                },
                "filing_type": {
                    "type": "string",
                    "description": "Optional form filter",
                    "enum": ["10-K", "10-Q", "8-K", ""]
                },
                "keywords": {
                    "type": "string",
                    "description": "Optional phrase to search within filings, e.g. 'cloud migration'"
                }
            },
            "required": ["company_name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ActionError> {
        let company = required_str(&args, self.name(), "company_name")?;
        let filing_type = optional_str(&args, "filing_type").map(str::to_uppercase);
        if let Some(form) = &filing_type
            && !FILING_TYPES.contains(&form.as_str())
        {
            return Err(ActionError::InvalidArguments {
                name: self.name().to_string(),
                reason: format!("Unsupported filing type '{form}'"),
            });
        }
        let keywords = optional_str(&args, "keywords");

        let url = self.url(
            company,
            filing_type.as_deref(),
            keywords,
            Utc::now().date_naive(),
        );
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| send_error(self.name(), e))?;
        check_status(self.name(), response.status())?;
        let body = response
            .text()
            .await
            .map_err(|e| send_error(self.name(), e))?;
        let (filings, total) = parse_filings(&decode_json(self.name(), &body)?, company);
        info!(
            company,
            filing_type = filing_type.as_deref().unwrap_or("all"),
            results = filings.len(),
            "SEC filings search completed"
        );

        Ok(json!({
            "company_name": company,
            "filings": filings,
            "total_found": total,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_url_has_date_window_and_form() {
        let action = SecFilingsAction::new("Scout test@example.com").unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let url = action.url("Acme Corp", Some("10-K"), Some("cloud migration"), today);
        assert_eq!(
            url,
            "https://efts.sec.gov/LATEST/search-index?q=%22Acme%20Corp%22%20%22cloud%20migration%22&dateRange=custom&startdt=2020-03-14&enddt=2025-03-14&from=0&forms=10-K"
        );
    }

    #[test]
    fn test_parse_filings() {
        let body = json!({"hits": {
            "total": {"value": 42},
            "hits": [{
                "_id": "0000950170-24-012345:acme-10k.htm",
                "_source": {
                    "adsh": "0000950170-24-012345",
                    "ciks": ["0000012345"],
                    "root_forms": ["10-K"],
                    "file_date": "2024-02-28",
                    "display_names": ["ACME CORP  (CIK 0000012345)"],
                    "file_description": "Annual report"
                },
                "highlight": {"text": ["we are migrating our plants to the cloud"]}
            }]
        }});
        let (filings, total) = parse_filings(&body, "Acme Corp");
        assert_eq!(total, 42);
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0]["filing_type"], "10-K");
        assert_eq!(
            filings[0]["url"],
            "https://www.sec.gov/Archives/edgar/data/12345/000095017024012345/acme-10k.htm"
        );
        assert_eq!(filings[0]["excerpt"], "we are migrating our plants to the cloud");
    }

    #[test]
    fn test_parse_empty_response() {
        let (filings, total) = parse_filings(&json!({}), "Acme Corp");
        assert!(filings.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_unsupported_form_rejected() {
        let action = SecFilingsAction::new("Scout test@example.com").unwrap();
        let err = action
            .execute(json!({"company_name": "Acme Corp", "filing_type": "S-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments { .. }));
    }
}

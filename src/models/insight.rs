//! AI market commentary.
//!
//! The gateway has served two shapes over time: a legacy free-text form with a
//! single `content` field, and a structured form split into four sections.
//! Both decode into [`InsightPayload`]; [`Insight::from_payload`] resolves the
//! shape once, and everything downstream matches on the [`Insight`] variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::snapshot::optional_timestamp;

/// Section headers used when rendering a structured insight, in display order.
pub const SECTION_HEADERS: [&str; 4] = [
    "Market Analysis",
    "Trend Prediction",
    "Investment Advice",
    "Risk Warning",
];

// ---------------------------------------------------------------------------
// InsightPayload — Wire shape, every field optional
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InsightPayload {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub market_analysis: Option<String>,
    #[serde(default)]
    pub trend_prediction: Option<String>,
    #[serde(default)]
    pub investment_advice: Option<String>,
    #[serde(default)]
    pub risk_warning: Option<String>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub analysis_type: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Insight — Resolved tagged union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyInsight {
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuredInsight {
    pub market_analysis: String,
    pub trend_prediction: String,
    pub investment_advice: String,
    pub risk_warning: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub analysis_type: Option<String>,
    pub model_name: Option<String>,
    pub confidence_score: Option<f64>,
}

impl StructuredInsight {
    fn sections(&self) -> [&str; 4] {
        [
            &self.market_analysis,
            &self.trend_prediction,
            &self.investment_advice,
            &self.risk_warning,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insight {
    Legacy(LegacyInsight),
    Structured(StructuredInsight),
}

impl Insight {
    /// Resolve the wire payload into one variant.
    ///
    /// Non-blank legacy `content` wins. Otherwise the payload is structured if
    /// at least one section is non-blank. Returns `None` for an empty payload.
    pub fn from_payload(payload: InsightPayload) -> Option<Insight> {
        if let Some(content) = non_blank(payload.content) {
            return Some(Insight::Legacy(LegacyInsight {
                content,
                timestamp: payload.timestamp,
            }));
        }

        let structured = StructuredInsight {
            market_analysis: non_blank(payload.market_analysis).unwrap_or_default(),
            trend_prediction: non_blank(payload.trend_prediction).unwrap_or_default(),
            investment_advice: non_blank(payload.investment_advice).unwrap_or_default(),
            risk_warning: non_blank(payload.risk_warning).unwrap_or_default(),
            timestamp: payload.timestamp,
            analysis_type: payload.analysis_type,
            model_name: payload.model_name,
            confidence_score: payload.confidence_score,
        };

        if structured.sections().iter().all(|s| s.is_empty()) {
            None
        } else {
            Some(Insight::Structured(structured))
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Insight::Legacy(l) => l.timestamp,
            Insight::Structured(s) => s.timestamp,
        }
    }

    /// Render as display text.
    ///
    /// Legacy text is returned as-is. Structured sections are concatenated
    /// under `## <header>` lines, skipping empty sections.
    pub fn render(&self) -> String {
        match self {
            Insight::Legacy(l) => l.content.clone(),
            Insight::Structured(s) => SECTION_HEADERS
                .iter()
                .zip(s.sections())
                .filter(|(_, body)| !body.is_empty())
                .map(|(header, body)| format!("## {}\n{}", header, body))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

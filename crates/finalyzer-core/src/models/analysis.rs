//! Analysis result snapshots polled for a document

use serde::{Deserialize, Serialize};

/// Quick local summary computed before the full analysis finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSummary {
    pub summary: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Remote analysis record keyed by document id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub local_summary: Option<LocalSummary>,
    /// Structured payload from the external analysis crew, kept verbatim.
    #[serde(default)]
    pub crew_result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_and_complete_results() {
        let payload = r#"[
            {"_id": "a1", "status": "processing"},
            {
                "_id": "a2",
                "status": "done",
                "local_summary": {"summary": "Revenue up 12%", "confidence": 0.82},
                "crew_result": {"verdict": "hold"}
            },
            {"_id": "a3", "status": "error", "error": "parser crashed"}
        ]"#;
        let results: Vec<AnalysisResult> = serde_json::from_str(payload).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].local_summary.is_none());
        assert_eq!(
            results[1].local_summary.as_ref().unwrap().summary,
            "Revenue up 12%"
        );
        assert_eq!(
            results[1].crew_result.as_ref().unwrap()["verdict"],
            serde_json::json!("hold")
        );
        assert_eq!(results[2].error.as_deref(), Some("parser crashed"));
    }
}

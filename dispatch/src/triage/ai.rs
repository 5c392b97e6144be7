//! AI-assisted triage with a deterministic fallback.
//!
//! When an external classifier is configured it gets first say on a
//! case's acuity. Its output is validated fail-closed: a missing
//! required field, an out-of-range acuity, an unknown severity label,
//! or a label that contradicts the numeric level rejects the whole
//! result, and the rule cascade takes over. A classifier problem is
//! therefore never visible to dispatchers as anything worse than a
//! warning on an otherwise classified case.

use std::time::Duration;

use async_trait::async_trait;
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::policy::AiTriageConfig;
use crate::triage::rules::{TriageAssessment, TriageLevel, TriageOutcome, TriageRuleEngine};
use crate::triage::vitals::VitalSigns;

/// Which component produced the accepted assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageSource {
    Ai,
    RuleEngine,
}

impl std::fmt::Display for TriageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ai => write!(f, "ai"),
            Self::RuleEngine => write!(f, "rule_engine"),
        }
    }
}

/// Errors from the classifier path. All of them are recoverable: the
/// caller falls back to [`TriageRuleEngine`].
#[derive(Debug, thiserror::Error)]
pub enum AiTriageError {
    #[error("classifier request failed: {0}")]
    Http(String),

    #[error("classifier timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("classifier result failed validation: {}", .violations.join("; "))]
    MalformedResult { violations: Vec<String> },
}

/// Raw classifier response, before validation.
///
/// The schema is sent along with each request so the endpoint knows
/// the shape we accept. Fields are optional at the serde layer so a
/// partial response still deserializes and every gap shows up as a
/// named violation instead of a parse error.
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
pub struct AiAssessment {
    /// Numeric acuity, 1 (most urgent) through 5.
    pub acuity_level: Option<i64>,
    /// Severity label matching the acuity level, e.g. `"critical"`.
    pub severity_label: Option<String>,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Findings that drove the classification.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Free-text rationale. Logged, never stored on the case.
    #[serde(default)]
    pub rationale: Option<String>,
}

impl AiAssessment {
    /// Check the response against the contract and convert it.
    ///
    /// Collects every violation rather than stopping at the first, so
    /// one log line shows everything wrong with a bad response.
    pub fn validate(&self) -> Result<TriageAssessment, AiTriageError> {
        let mut violations = Vec::new();

        let level = match self.acuity_level {
            None => {
                violations.push("acuity_level is missing".to_string());
                None
            }
            Some(raw) => {
                let parsed = u8::try_from(raw).ok().and_then(TriageLevel::from_acuity);
                if parsed.is_none() {
                    violations.push(format!("acuity_level {raw} outside 1..=5"));
                }
                parsed
            }
        };

        match self.severity_label.as_deref() {
            None => violations.push("severity_label is missing".to_string()),
            Some(label) => match TriageLevel::from_label(label) {
                None => violations.push(format!("unknown severity_label {label:?}")),
                Some(from_label) => {
                    if let Some(level) = level {
                        if from_label != level {
                            violations.push(format!(
                                "severity_label {from_label:?} contradicts acuity_level {}",
                                level.acuity()
                            ));
                        }
                    }
                }
            },
        }

        let confidence = match self.confidence {
            None => {
                violations.push("confidence is missing".to_string());
                None
            }
            Some(c) if !(0.0..=1.0).contains(&c) => {
                violations.push(format!("confidence {c} outside [0, 1]"));
                None
            }
            Some(c) => Some(c),
        };

        match (level, confidence, violations.is_empty()) {
            (Some(level), Some(confidence), true) => Ok(TriageAssessment {
                level,
                confidence,
                flags: self.flags.clone(),
            }),
            _ => Err(AiTriageError::MalformedResult { violations }),
        }
    }
}

/// Upstream acuity classifier, typically a remote model endpoint.
#[async_trait]
pub trait TriageClassifier: Send + Sync {
    /// Classify one vitals snapshot.
    async fn classify(&self, vitals: &VitalSigns) -> Result<TriageAssessment, AiTriageError>;
}

/// HTTP-backed classifier.
pub struct HttpTriageClassifier {
    url: String,
    model: String,
    timeout_seconds: u64,
    client: reqwest::Client,
}

impl HttpTriageClassifier {
    /// Build a classifier when the config names an endpoint.
    ///
    /// A client that cannot even be constructed is treated like any
    /// other classifier problem: the pipeline runs on the rule cascade.
    pub fn from_config(config: &AiTriageConfig) -> Option<Self> {
        let url = config.url.clone()?;
        match Self::new(url, config.model.clone(), config.timeout_seconds) {
            Ok(classifier) => Some(classifier),
            Err(e) => {
                warn!(error = %e, "classifier disabled, triage runs on rules only");
                None
            }
        }
    }

    pub fn new(url: String, model: String, timeout_seconds: u64) -> Result<Self, AiTriageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AiTriageError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url,
            model,
            timeout_seconds,
            client,
        })
    }
}

#[async_trait]
impl TriageClassifier for HttpTriageClassifier {
    async fn classify(&self, vitals: &VitalSigns) -> Result<TriageAssessment, AiTriageError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "vitals": vitals,
            "response_schema": schema_for!(AiAssessment),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiTriageError::Timeout {
                        seconds: self.timeout_seconds,
                    }
                } else {
                    AiTriageError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiTriageError::Http(format!(
                "classifier endpoint returned {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AiTriageError::Http(e.to_string()))?;

        let json_str = extract_json_block(&body).ok_or_else(|| AiTriageError::MalformedResult {
            violations: vec!["response contains no JSON object".to_string()],
        })?;

        let raw: AiAssessment =
            serde_json::from_str(json_str).map_err(|e| AiTriageError::MalformedResult {
                violations: vec![format!("response does not match the assessment schema: {e}")],
            })?;

        raw.validate()
    }
}

/// Pull one JSON object out of a response that may wrap it in markdown
/// fences or surrounding prose.
fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(fence) = text.find("```json") {
        let rest = &text[fence + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Outcome of the full triage pipeline, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResolution {
    pub outcome: TriageOutcome,
    pub source: TriageSource,
    /// True when a classifier was consulted but its answer was not used.
    pub degraded: bool,
    /// One entry per problem encountered on the way to the answer.
    pub warnings: Vec<String>,
}

impl TriageResolution {
    pub fn assessment(&self) -> Option<&TriageAssessment> {
        self.outcome.assessment()
    }
}

/// Run triage end to end: classifier first when one is configured,
/// rule cascade as the fallback and the baseline.
///
/// An empty snapshot never reaches the classifier; there is nothing to
/// classify, and the caller needs the insufficient-data outcome either
/// way.
pub async fn resolve_triage(
    classifier: Option<&dyn TriageClassifier>,
    engine: &TriageRuleEngine,
    vitals: &VitalSigns,
) -> TriageResolution {
    if vitals.is_empty() {
        return TriageResolution {
            outcome: engine.classify(vitals),
            source: TriageSource::RuleEngine,
            degraded: false,
            warnings: Vec::new(),
        };
    }

    if let Some(classifier) = classifier {
        match classifier.classify(vitals).await {
            Ok(assessment) => {
                debug!(
                    level = %assessment.level,
                    confidence = assessment.confidence,
                    "classifier assessment accepted"
                );
                return TriageResolution {
                    outcome: TriageOutcome::Classified(assessment),
                    source: TriageSource::Ai,
                    degraded: false,
                    warnings: Vec::new(),
                };
            }
            Err(e) => {
                warn!(error = %e, "classifier unusable, falling back to rule cascade");
                return TriageResolution {
                    outcome: engine.classify(vitals),
                    source: TriageSource::RuleEngine,
                    degraded: true,
                    warnings: vec![format!("classifier fallback: {e}")],
                };
            }
        }
    }

    TriageResolution {
        outcome: engine.classify(vitals),
        source: TriageSource::RuleEngine,
        degraded: false,
        warnings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Valid(TriageAssessment),
        HttpFailure,
        Malformed,
    }

    struct ScriptedClassifier {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TriageClassifier for ScriptedClassifier {
        async fn classify(&self, _vitals: &VitalSigns) -> Result<TriageAssessment, AiTriageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Valid(assessment) => Ok(assessment.clone()),
                Script::HttpFailure => Err(AiTriageError::Http("connection refused".to_string())),
                Script::Malformed => Err(AiTriageError::MalformedResult {
                    violations: vec!["acuity_level is missing".to_string()],
                }),
            }
        }
    }

    fn ai_response(acuity: i64, label: &str, confidence: f64) -> AiAssessment {
        AiAssessment {
            acuity_level: Some(acuity),
            severity_label: Some(label.to_string()),
            confidence: Some(confidence),
            flags: vec!["mechanism_of_injury".to_string()],
            rationale: None,
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_response() {
        let assessment = ai_response(2, "critical", 0.88).validate().unwrap();
        assert_eq!(assessment.level, TriageLevel::Critical);
        assert_eq!(assessment.confidence, 0.88);
        assert_eq!(assessment.flags, vec!["mechanism_of_injury".to_string()]);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let empty = AiAssessment {
            acuity_level: None,
            severity_label: None,
            confidence: None,
            flags: Vec::new(),
            rationale: None,
        };
        let err = empty.validate().unwrap_err();
        match err {
            AiTriageError::MalformedResult { violations } => {
                assert_eq!(violations.len(), 3);
                assert!(violations[0].contains("acuity_level"));
                assert!(violations[1].contains("severity_label"));
                assert!(violations[2].contains("confidence"));
            }
            other => panic!("expected MalformedResult, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_acuity() {
        for bad in [0, 6, -3, 300] {
            let err = ai_response(bad, "critical", 0.9).validate().unwrap_err();
            let message = err.to_string();
            assert!(message.contains("outside 1..=5"), "acuity {bad}: {message}");
        }
    }

    #[test]
    fn test_validate_rejects_unknown_label() {
        let err = ai_response(2, "catastrophic", 0.9).validate().unwrap_err();
        assert!(err.to_string().contains("unknown severity_label"));
    }

    #[test]
    fn test_validate_rejects_label_level_mismatch() {
        let err = ai_response(1, "delayed", 0.9).validate().unwrap_err();
        assert!(err.to_string().contains("contradicts acuity_level 1"));
    }

    #[test]
    fn test_validate_rejects_confidence_out_of_range() {
        for bad in [-0.1, 1.5] {
            let err = ai_response(3, "urgent", bad).validate().unwrap_err();
            assert!(err.to_string().contains("outside [0, 1]"));
        }
    }

    #[test]
    fn test_validate_tolerates_label_casing() {
        let assessment = ai_response(3, "Urgent", 0.7).validate().unwrap();
        assert_eq!(assessment.level, TriageLevel::Urgent);
    }

    #[tokio::test]
    async fn test_resolve_prefers_valid_classifier_answer() {
        let classifier = ScriptedClassifier::new(Script::Valid(TriageAssessment {
            level: TriageLevel::Critical,
            confidence: 0.88,
            flags: vec!["mechanism_of_injury".to_string()],
        }));
        let engine = TriageRuleEngine::default();
        let vitals = VitalSigns::default().with_heart_rate(72.0);

        let resolution = resolve_triage(Some(&classifier), &engine, &vitals).await;
        assert_eq!(resolution.source, TriageSource::Ai);
        assert!(!resolution.degraded);
        assert!(resolution.warnings.is_empty());
        // Rule cascade alone would have said delayed for HR 72.
        assert_eq!(resolution.assessment().unwrap().level, TriageLevel::Critical);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_http_failure() {
        let classifier = ScriptedClassifier::new(Script::HttpFailure);
        let engine = TriageRuleEngine::default();
        let vitals = VitalSigns::default().with_spo2(80.0);

        let resolution = resolve_triage(Some(&classifier), &engine, &vitals).await;
        assert_eq!(resolution.source, TriageSource::RuleEngine);
        assert!(resolution.degraded);
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.warnings[0].contains("connection refused"));

        let assessment = resolution.assessment().unwrap();
        assert_eq!(assessment.level, TriageLevel::Immediate);
        assert!(assessment.flags.contains(&"spo2_below_85".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_malformed_result() {
        let classifier = ScriptedClassifier::new(Script::Malformed);
        let engine = TriageRuleEngine::default();
        let vitals = VitalSigns::default().with_heart_rate(140.0);

        let resolution = resolve_triage(Some(&classifier), &engine, &vitals).await;
        assert_eq!(resolution.source, TriageSource::RuleEngine);
        assert!(resolution.degraded);
        assert_eq!(
            resolution.assessment().unwrap().level,
            TriageLevel::Critical
        );
    }

    #[tokio::test]
    async fn test_resolve_without_classifier_uses_rules_directly() {
        let engine = TriageRuleEngine::default();
        let vitals = VitalSigns::default().with_heart_rate(110.0);

        let resolution = resolve_triage(None, &engine, &vitals).await;
        assert_eq!(resolution.source, TriageSource::RuleEngine);
        assert!(!resolution.degraded);
        assert_eq!(resolution.assessment().unwrap().level, TriageLevel::Urgent);
    }

    #[tokio::test]
    async fn test_resolve_skips_classifier_for_empty_snapshot() {
        let classifier = ScriptedClassifier::new(Script::Valid(TriageAssessment {
            level: TriageLevel::Minor,
            confidence: 0.9,
            flags: Vec::new(),
        }));
        let engine = TriageRuleEngine::default();

        let resolution =
            resolve_triage(Some(&classifier), &engine, &VitalSigns::default()).await;
        assert!(resolution.outcome.is_insufficient());
        assert_eq!(resolution.source, TriageSource::RuleEngine);
        assert_eq!(classifier.call_count(), 0);
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let disabled = AiTriageConfig::default();
        assert!(HttpTriageClassifier::from_config(&disabled).is_none());

        let enabled = AiTriageConfig {
            url: Some("http://localhost:9090/triage".to_string()),
            ..AiTriageConfig::default()
        };
        let classifier = HttpTriageClassifier::from_config(&enabled).unwrap();
        assert_eq!(classifier.model, "triage-v1");
        assert_eq!(classifier.timeout_seconds, 10);
    }

    #[test]
    fn test_new_reports_client_errors_instead_of_panicking() {
        let classifier = HttpTriageClassifier::new(
            "http://localhost:9090/triage".to_string(),
            "triage-v1".to_string(),
            10,
        );
        assert!(classifier.is_ok());
    }

    #[test]
    fn test_assessment_schema_names_required_fields() {
        let schema = serde_json::to_value(schema_for!(AiAssessment)).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("acuity_level"));
        assert!(properties.contains_key("severity_label"));
        assert!(properties.contains_key("confidence"));
    }

    #[test]
    fn test_extract_json_block_handles_fences_and_prose() {
        let fenced = "Here is my assessment:\n```json\n{\"acuity_level\": 2}\n```\nDone.";
        assert_eq!(extract_json_block(fenced), Some("{\"acuity_level\": 2}"));

        let bare = "prefix {\"acuity_level\": 2} suffix";
        assert_eq!(extract_json_block(bare), Some("{\"acuity_level\": 2}"));

        assert_eq!(extract_json_block("no json at all"), None);
        assert_eq!(extract_json_block("} backwards {"), None);
    }
}

//! Aggregate view of a multi-persona evaluation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::json::conversation_record;
use crate::judge::{average_deductions, rank_criteria, Criterion, CriterionAverage};
use crate::optimizer::{Evaluation, PersonaFailure};

/// Current schema version of `aggregated-report-*.json`.
pub const SCHEMA_VERSION: u32 = 1;

/// Number of criteria listed in [`BatchSummary::worst_criteria`].
pub const WORST_CRITERIA: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub average_score: f64,
    pub scores_by_persona: BTreeMap<String, f64>,
    pub average_deductions_by_criterion: BTreeMap<Criterion, f64>,
    pub worst_criteria: Vec<CriterionAverage>,
    pub personas_evaluated: usize,
    pub personas_failed: usize,
}

impl BatchSummary {
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let averages = average_deductions(evaluation.judge_outputs());
        let mut worst_criteria = rank_criteria(&averages);
        worst_criteria.truncate(WORST_CRITERIA);

        Self {
            average_score: crate::judge::scoring::round2(evaluation.average_score),
            scores_by_persona: evaluation.scores_by_persona.clone(),
            average_deductions_by_criterion: averages,
            worst_criteria,
            personas_evaluated: evaluation.results.len(),
            personas_failed: evaluation.failures.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub summary: BatchSummary,
    pub conversations: Vec<Value>,
    pub failures: Vec<PersonaFailure>,
}

impl BatchReport {
    pub fn new(evaluation: &Evaluation) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            prompt: evaluation.prompt.clone(),
            summary: BatchSummary::from_evaluation(evaluation),
            conversations: evaluation.results.iter().map(conversation_record).collect(),
            failures: evaluation.failures.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::scoring::{score_ratings, RawEmployee, RawRating};
    use crate::judge::RawEvaluation;
    use crate::model::{CustomerIdentity, Persona, Transcript};
    use crate::optimizer::PersonaResult;

    fn result(id: &str, ratings: [u8; 8]) -> PersonaResult {
        let raw = RawEvaluation {
            employee: RawEmployee {
                justification: String::new(),
                behavior_ratings: Criterion::ALL
                    .iter()
                    .zip(ratings)
                    .map(|(c, r)| RawRating::new(*c, r))
                    .collect(),
            },
            comments: String::new(),
        };
        PersonaResult {
            persona: Persona::new(id, "d"),
            customer: CustomerIdentity {
                customer_id: format!("{id}-c"),
                conversation_id: format!("{id}-v"),
                display_name: None,
            },
            timestamp: Utc::now(),
            judge: score_ratings(&raw).unwrap(),
            transcript: Transcript::new(),
            exchanges: Vec::new(),
        }
    }

    #[test]
    fn summarizes_scores_and_deductions() {
        // a: 1 on every criterion -> 75; b: 4 on being too pushy -> 90
        let evaluation = Evaluation::from_results(
            None,
            vec![result("a", [1; 8]), result("b", [0, 0, 0, 4, 0, 0, 0, 0])],
            vec![PersonaFailure {
                persona_id: "c".to_string(),
                error: "backend returned HTTP 503: down".to_string(),
            }],
        )
        .unwrap();
        let report = BatchReport::new(&evaluation);
        let s = &report.summary;

        assert_eq!(s.average_score, 82.5);
        assert_eq!(s.scores_by_persona["a"], 75.0);
        assert_eq!(s.scores_by_persona["b"], 90.0);
        assert_eq!(s.personas_evaluated, 2);
        assert_eq!(s.personas_failed, 1);
        assert_eq!(s.average_deductions_by_criterion.len(), 8);
        // pushy: (2.5 + 10) / 2
        assert_eq!(s.average_deductions_by_criterion[&Criterion::BeingTooPushy], 6.25);
        assert_eq!(s.worst_criteria.len(), WORST_CRITERIA);
        assert_eq!(s.worst_criteria[0].criterion, Criterion::BeingTooPushy);
        assert_eq!(report.conversations.len(), 2);
    }

    #[test]
    fn report_serializes_with_camel_case_keys() {
        let evaluation =
            Evaluation::from_results(Some("p".to_string()), vec![result("a", [0; 8])], Vec::new()).unwrap();
        let v = serde_json::to_value(BatchReport::new(&evaluation)).unwrap();
        assert_eq!(v["schemaVersion"], 1);
        assert_eq!(v["prompt"], "p");
        assert_eq!(v["summary"]["averageScore"], 100.0);
        assert!(v["summary"]["worstCriteria"].as_array().unwrap().is_empty());
        assert_eq!(
            v["summary"]["averageDeductionsByCriterion"]["Being too pushy"],
            0.0
        );
    }
}

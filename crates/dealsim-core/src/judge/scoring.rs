//! Deterministic conversion of rubric ratings into a score.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rubric::{Criterion, FULL_SCORE, MAX_RATING};
use crate::error::RatingError;

/// Ratings as returned by the rating stage, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvaluation {
    pub employee: RawEmployee,
    #[serde(default)]
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEmployee {
    #[serde(default)]
    pub justification: String,
    #[serde(rename = "behaviorRatings")]
    pub behavior_ratings: Vec<RawRating>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRating {
    pub criterion: String,
    /// Kept untyped so non-integer ratings are reported rather than coerced.
    pub rating: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl RawRating {
    pub fn new(criterion: Criterion, rating: u8) -> Self {
        Self {
            criterion: criterion.name().to_string(),
            rating: Value::from(rating),
            explanation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscore {
    pub criterion: Criterion,
    pub points_deducted: f64,
    pub max_points: u32,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeOutput {
    pub overall_score: f64,
    /// One entry per criterion, in rubric order.
    pub subscores: Vec<Subscore>,
    pub justification: String,
    pub comments: String,
}

impl JudgeOutput {
    pub fn total_deducted(&self) -> f64 {
        self.subscores.iter().map(|s| s.points_deducted).sum()
    }

    pub fn subscore(&self, criterion: Criterion) -> Option<&Subscore> {
        self.subscores.iter().find(|s| s.criterion == criterion)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Points deducted for one rating: `rating / 4 * weight`, to two decimals.
pub fn deduction(criterion: Criterion, rating: u8) -> f64 {
    round2(f64::from(rating) / f64::from(MAX_RATING) * f64::from(criterion.max_deduction()))
}

/// Validate the eight ratings and compute the score.
///
/// Pure: identical input always yields an identical [`JudgeOutput`].
pub fn score_ratings(raw: &RawEvaluation) -> Result<JudgeOutput, RatingError> {
    let ratings = &raw.employee.behavior_ratings;
    if ratings.len() != Criterion::ALL.len() {
        return Err(RatingError::WrongCount {
            expected: Criterion::ALL.len(),
            actual: ratings.len(),
        });
    }

    let mut seen = HashSet::new();
    let mut subscores = Vec::with_capacity(ratings.len());
    for item in ratings {
        let criterion = Criterion::parse(&item.criterion)?;
        if !seen.insert(criterion) {
            return Err(RatingError::Duplicate(criterion));
        }
        let rating = validate_rating(criterion, &item.rating)?;
        subscores.push(Subscore {
            criterion,
            points_deducted: deduction(criterion, rating),
            max_points: criterion.max_deduction(),
            rating,
            explanation: item.explanation.clone().filter(|e| !e.trim().is_empty()),
        });
    }

    subscores.sort_by_key(|s| s.criterion);

    let total: f64 = subscores.iter().map(|s| s.points_deducted).sum();
    let overall_score = round2(FULL_SCORE - total).clamp(0.0, FULL_SCORE);

    Ok(JudgeOutput {
        overall_score,
        subscores,
        justification: raw.employee.justification.clone(),
        comments: raw.comments.clone(),
    })
}

/// Mean deduction per criterion over several outputs, in rubric order.
///
/// Every criterion is present; an empty input yields zeros.
pub fn average_deductions<'a>(
    outputs: impl IntoIterator<Item = &'a JudgeOutput>,
) -> BTreeMap<Criterion, f64> {
    let mut totals: BTreeMap<Criterion, f64> = Criterion::ALL.iter().map(|c| (*c, 0.0)).collect();
    let mut count = 0usize;
    for output in outputs {
        count += 1;
        for sub in &output.subscores {
            *totals.entry(sub.criterion).or_default() += sub.points_deducted;
        }
    }
    if count > 0 {
        for value in totals.values_mut() {
            *value = round2(*value / count as f64);
        }
    }
    totals
}

/// Mean deduction of one criterion over a set of conversations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionAverage {
    pub criterion: Criterion,
    pub average_deduction: f64,
    pub max_points: u32,
}

/// Criteria with a non-zero mean deduction, worst first. Ties keep rubric order.
pub fn rank_criteria(averages: &BTreeMap<Criterion, f64>) -> Vec<CriterionAverage> {
    let mut ranked: Vec<CriterionAverage> = averages
        .iter()
        .filter(|(_, avg)| **avg > 0.0)
        .map(|(criterion, avg)| CriterionAverage {
            criterion: *criterion,
            average_deduction: *avg,
            max_points: criterion.max_deduction(),
        })
        .collect();
    ranked.sort_by(|a, b| b.average_deduction.total_cmp(&a.average_deduction));
    ranked
}

fn validate_rating(criterion: Criterion, value: &Value) -> Result<u8, RatingError> {
    let not_integer = || RatingError::NotInteger {
        criterion,
        raw: value.to_string(),
    };

    let rating = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                let f = n.as_f64().ok_or_else(not_integer)?;
                if f.fract() != 0.0 || !f.is_finite() {
                    return Err(not_integer());
                }
                f as i64
            }
        }
        _ => return Err(not_integer()),
    };

    if !(0..=i64::from(MAX_RATING)).contains(&rating) {
        return Err(RatingError::OutOfRange { criterion, rating });
    }
    Ok(rating as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw_with(ratings: [u8; 8]) -> RawEvaluation {
        RawEvaluation {
            employee: RawEmployee {
                justification: "ok".to_string(),
                behavior_ratings: Criterion::ALL
                    .iter()
                    .zip(ratings)
                    .map(|(c, r)| RawRating::new(*c, r))
                    .collect(),
            },
            comments: String::new(),
        }
    }

    #[test]
    fn average_deductions_cover_every_criterion() {
        let a = score_ratings(&raw_with([2, 0, 0, 0, 0, 0, 0, 0])).unwrap();
        let b = score_ratings(&raw_with([0, 0, 0, 0, 0, 0, 0, 4])).unwrap();
        let avg = average_deductions([&a, &b]);
        assert_eq!(avg.len(), 8);
        assert_eq!(avg[&Criterion::RepeatedQuestions], 2.5);
        assert_eq!(avg[&Criterion::BadRecommendation], 7.5);
        assert_eq!(avg[&Criterion::BeingTooPushy], 0.0);
        assert!(average_deductions(std::iter::empty::<&JudgeOutput>()).values().all(|v| *v == 0.0));
    }

    #[test]
    fn all_zero_scores_full_marks() {
        let out = score_ratings(&raw_with([0; 8])).unwrap();
        assert_eq!(out.overall_score, 100.0);
        assert_eq!(out.total_deducted(), 0.0);
    }

    #[test]
    fn all_four_scores_zero() {
        let out = score_ratings(&raw_with([4; 8])).unwrap();
        assert_eq!(out.overall_score, 0.0);
        let max: u32 = out.subscores.iter().map(|s| s.max_points).sum();
        assert_eq!(max, 100);
    }

    #[test]
    fn all_ones_deduct_a_quarter() {
        let out = score_ratings(&raw_with([1; 8])).unwrap();
        assert_eq!(out.overall_score, 75.0);
        assert_eq!(out.total_deducted(), 25.0);
    }

    #[test]
    fn pushy_two_deducts_five() {
        assert_eq!(deduction(Criterion::BeingTooPushy, 2), 5.0);

        let mut ratings = [0; 8];
        ratings[3] = 2;
        let out = score_ratings(&raw_with(ratings)).unwrap();
        let pushy = out.subscore(Criterion::BeingTooPushy).unwrap();
        assert_eq!(pushy.points_deducted, 5.0);
        assert_eq!(pushy.max_points, 10);
        assert_eq!(out.overall_score, 95.0);
    }

    #[test]
    fn subscores_come_back_in_rubric_order() {
        let mut raw = raw_with([0, 1, 2, 3, 4, 0, 1, 2]);
        raw.employee.behavior_ratings.reverse();
        let out = score_ratings(&raw).unwrap();
        let order: Vec<_> = out.subscores.iter().map(|s| s.criterion).collect();
        assert_eq!(order, Criterion::ALL.to_vec());
        assert_eq!(out.subscores[4].rating, 4);
    }

    #[test]
    fn rejects_wrong_count() {
        let mut raw = raw_with([0; 8]);
        raw.employee.behavior_ratings.pop();
        assert_eq!(
            score_ratings(&raw),
            Err(RatingError::WrongCount {
                expected: 8,
                actual: 7
            })
        );
    }

    #[test]
    fn rejects_duplicate_and_unknown() {
        let mut raw = raw_with([0; 8]);
        raw.employee.behavior_ratings[1].criterion = "Repeated questions".to_string();
        assert_eq!(
            score_ratings(&raw),
            Err(RatingError::Duplicate(Criterion::RepeatedQuestions))
        );

        let mut raw = raw_with([0; 8]);
        raw.employee.behavior_ratings[7].criterion = "Talking about the weather".to_string();
        assert!(matches!(
            score_ratings(&raw),
            Err(RatingError::UnknownCriterion(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_and_fractional() {
        let mut raw = raw_with([0; 8]);
        raw.employee.behavior_ratings[2].rating = json!(5);
        assert_eq!(
            score_ratings(&raw),
            Err(RatingError::OutOfRange {
                criterion: Criterion::IgnoringConstraints,
                rating: 5
            })
        );

        raw.employee.behavior_ratings[2].rating = json!(-1);
        assert!(matches!(
            score_ratings(&raw),
            Err(RatingError::OutOfRange { rating: -1, .. })
        ));

        raw.employee.behavior_ratings[2].rating = json!(2.5);
        assert!(matches!(
            score_ratings(&raw),
            Err(RatingError::NotInteger { .. })
        ));

        raw.employee.behavior_ratings[2].rating = json!("2");
        assert!(matches!(
            score_ratings(&raw),
            Err(RatingError::NotInteger { .. })
        ));

        raw.employee.behavior_ratings[2].rating = json!(3.0);
        let out = score_ratings(&raw).unwrap();
        assert_eq!(out.subscore(Criterion::IgnoringConstraints).unwrap().rating, 3);
    }

    #[test]
    fn blank_explanations_are_dropped() {
        let mut raw = raw_with([1; 8]);
        raw.employee.behavior_ratings[0].explanation = Some("   ".to_string());
        raw.employee.behavior_ratings[1].explanation = Some("asked budget twice".to_string());
        let out = score_ratings(&raw).unwrap();
        assert_eq!(out.subscores[0].explanation, None);
        assert_eq!(out.subscores[1].explanation.as_deref(), Some("asked budget twice"));
    }

    #[test]
    fn output_serializes_camel_case() {
        let out = score_ratings(&raw_with([1; 8])).unwrap();
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["overallScore"], 75.0);
        assert_eq!(v["subscores"][0]["criterion"], "Repeated questions");
        assert_eq!(v["subscores"][0]["pointsDeducted"], 2.5);
        assert_eq!(v["subscores"][0]["maxPoints"], 10);
    }

    proptest! {
        #[test]
        fn score_is_bounded_and_exact(ratings in proptest::array::uniform8(0u8..=4)) {
            let out = score_ratings(&raw_with(ratings)).unwrap();
            prop_assert!((0.0..=100.0).contains(&out.overall_score));

            let expected: f64 = 100.0 - Criterion::ALL
                .iter()
                .zip(ratings)
                .map(|(c, r)| f64::from(r) / 4.0 * f64::from(c.max_deduction()))
                .sum::<f64>();
            prop_assert!((out.overall_score - expected).abs() <= 0.01);
        }

        #[test]
        fn scoring_is_idempotent(ratings in proptest::array::uniform8(0u8..=4)) {
            let raw = raw_with(ratings);
            let first = serde_json::to_vec(&score_ratings(&raw).unwrap()).unwrap();
            let second = serde_json::to_vec(&score_ratings(&raw).unwrap()).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}

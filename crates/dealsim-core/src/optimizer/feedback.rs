//! Feedback text handed to the prompt mutator.

use std::fmt::Write as _;

use super::evaluate::Evaluation;
use crate::config::OptimizerConfig;
use crate::judge::{average_deductions, rank_criteria, Criterion, CriterionAverage};

pub const PLACEHOLDER_RULE: &str = "CRITICAL: the prompt contains template placeholders written as \
{{PLACEHOLDER_NAME}} (for example {{PERSONALITY_SECTION}} or {{GOALS_SECTION}}). Keep every \
placeholder exactly as written: do not remove, rename or reformat any of them. Only rewrite the \
text between placeholders.";

/// Criteria that cost points in `evaluation`, worst first.
pub fn rank_weaknesses(evaluation: &Evaluation) -> Vec<CriterionAverage> {
    rank_criteria(&average_deductions(evaluation.judge_outputs()))
}

fn score_band(score: f64) -> &'static str {
    if score < 70.0 {
        "The prompt needs significant improvement. Focus on being more helpful and responsive to customer needs."
    } else if score < 85.0 {
        "The prompt is decent but could be more effective. Improve clarity and customer engagement."
    } else {
        "The prompt is performing well. Fine-tune for consistency across different customer types."
    }
}

/// Build the feedback for the next mutation from the previous evaluation.
pub fn build_feedback(evaluation: &Evaluation, cfg: &OptimizerConfig) -> String {
    let mut out = String::new();
    out.push_str(PLACEHOLDER_RULE);
    out.push_str("\n\n");
    let _ = writeln!(
        out,
        "Average score: {:.2}/100. {}",
        evaluation.average_score,
        score_band(evaluation.average_score)
    );

    let weaknesses = rank_weaknesses(evaluation);
    if !weaknesses.is_empty() && cfg.top_criteria > 0 {
        out.push_str("\nWeakest behaviors (average points lost per conversation):\n");
        for w in weaknesses.iter().take(cfg.top_criteria) {
            let _ = writeln!(
                out,
                "- {}: {:.2} of {} points. {}",
                w.criterion,
                w.average_deduction,
                w.max_points,
                w.criterion.remediation()
            );
        }
    }

    let mut examples: Vec<(&str, Criterion, u8, &str)> = evaluation
        .results
        .iter()
        .flat_map(|r| {
            r.judge.subscores.iter().filter_map(move |s| {
                let explanation = s.explanation.as_deref()?;
                (s.rating > 0).then_some((r.persona.name(), s.criterion, s.rating, explanation))
            })
        })
        .collect();
    // Highest rating first, then the heavier criterion.
    examples.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then(b.1.max_deduction().cmp(&a.1.max_deduction()))
    });
    if !examples.is_empty() && cfg.worst_examples > 0 {
        out.push_str("\nJudge notes on the worst moments:\n");
        for (persona, criterion, rating, explanation) in examples.iter().take(cfg.worst_examples) {
            let _ = writeln!(out, "- [{persona}] {criterion} (rated {rating}/4): \"{explanation}\"");
        }
    }

    let mut by_score: Vec<_> = evaluation.results.iter().collect();
    by_score.sort_by(|a, b| a.score().total_cmp(&b.score()));
    if cfg.worst_personas > 0 && !by_score.is_empty() {
        out.push_str("\nLowest-scoring customers:\n");
        for r in by_score.iter().take(cfg.worst_personas) {
            let justification = r.judge.justification.trim();
            if justification.is_empty() {
                let _ = writeln!(out, "- {} ({:.1}/100)", r.persona.name(), r.score());
            } else {
                let _ = writeln!(
                    out,
                    "- {} ({:.1}/100): {}",
                    r.persona.name(),
                    r.score(),
                    justification
                );
            }
        }
    }

    let low: Vec<String> = evaluation
        .results
        .iter()
        .filter(|r| r.score() < cfg.low_score_threshold)
        .map(|r| format!("{} ({:.1}/100)", r.persona.name(), r.score()))
        .collect();
    if !low.is_empty() {
        let _ = writeln!(
            out,
            "\nLower scores observed for: {}. Consider adapting the prompt for these customer types.",
            low.join(", ")
        );
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::scoring::{score_ratings, RawEmployee, RawRating};
    use crate::judge::RawEvaluation;
    use crate::model::{CustomerIdentity, Persona, Transcript};
    use crate::optimizer::evaluate::PersonaResult;
    use chrono::Utc;

    fn result(id: &str, ratings: [u8; 8], explain: bool) -> PersonaResult {
        let raw = RawEvaluation {
            employee: RawEmployee {
                justification: format!("{id} justification"),
                behavior_ratings: Criterion::ALL
                    .iter()
                    .zip(ratings)
                    .map(|(c, r)| {
                        let mut rating = RawRating::new(*c, r);
                        if explain && r > 0 {
                            rating.explanation = Some(format!("{id} {c}"));
                        }
                        rating
                    })
                    .collect(),
            },
            comments: String::new(),
        };
        PersonaResult {
            persona: Persona::new(id, "d"),
            customer: CustomerIdentity {
                customer_id: "c".to_string(),
                conversation_id: "v".to_string(),
                display_name: None,
            },
            timestamp: Utc::now(),
            judge: score_ratings(&raw).unwrap(),
            transcript: Transcript::new(),
            exchanges: Vec::new(),
        }
    }

    fn evaluation(results: Vec<PersonaResult>) -> Evaluation {
        Evaluation::from_results(Some("p".to_string()), results, Vec::new()).unwrap()
    }

    #[test]
    fn always_starts_with_placeholder_rule() {
        let eval = evaluation(vec![result("calm", [0; 8], false)]);
        let text = build_feedback(&eval, &OptimizerConfig::default());
        assert!(text.starts_with("CRITICAL:"));
        assert!(text.contains("{{PLACEHOLDER_NAME}}"));
        assert!(text.contains("performing well"));
        assert!(!text.contains("Weakest behaviors"));
        assert!(!text.contains("Lower scores observed"));
    }

    #[test]
    fn ranks_criteria_by_average_deduction() {
        // pushy: 4/4*10 = 10 for one persona -> avg 5
        // bad recommendation: 2/4*15 = 7.5 for both -> avg 7.5
        // repeated questions: 1/4*10 = 2.5 for one -> avg 1.25
        let eval = evaluation(vec![
            result("a", [1, 0, 0, 4, 0, 0, 0, 2], true),
            result("b", [0, 0, 0, 0, 0, 0, 0, 2], true),
        ]);
        let ranked = rank_weaknesses(&eval);
        let order: Vec<_> = ranked.iter().map(|w| w.criterion).collect();
        assert_eq!(
            order,
            [
                Criterion::BadRecommendation,
                Criterion::BeingTooPushy,
                Criterion::RepeatedQuestions
            ]
        );
        assert_eq!(ranked[0].average_deduction, 7.5);

        let cfg = OptimizerConfig {
            top_criteria: 2,
            ..OptimizerConfig::default()
        };
        let text = build_feedback(&eval, &cfg);
        assert!(text.contains(&format!("- {}: 7.50 of 15 points.", Criterion::BadRecommendation)));
        assert!(text.contains(&format!("- {}: 5.00 of 10 points.", Criterion::BeingTooPushy)));
        assert!(!text.contains(&format!("- {}: 1.25", Criterion::RepeatedQuestions)));
    }

    #[test]
    fn quotes_worst_examples_and_personas() {
        let eval = evaluation(vec![
            result("a", [0, 0, 0, 4, 0, 0, 0, 0], true),
            result("b", [0, 0, 0, 0, 0, 0, 0, 1], true),
        ]);
        let cfg = OptimizerConfig {
            worst_examples: 1,
            worst_personas: 1,
            ..OptimizerConfig::default()
        };
        let text = build_feedback(&eval, &cfg);
        assert!(text.contains(&format!(
            "- [a] {} (rated 4/4): \"a {}\"",
            Criterion::BeingTooPushy,
            Criterion::BeingTooPushy
        )));
        assert!(!text.contains("[b]"));
        assert!(text.contains("Lowest-scoring customers:\n- a (90.0/100): a justification"));
    }

    #[test]
    fn score_bands_and_low_personas() {
        let eval = evaluation(vec![
            result("weak", [4, 4, 4, 0, 0, 0, 0, 0], false),
            result("fine", [0; 8], false),
        ]);
        // weak = 60, fine = 100, average 80
        let text = build_feedback(&eval, &OptimizerConfig::default());
        assert!(text.contains("Average score: 80.00/100. The prompt is decent"));
        assert!(text.contains(
            "Lower scores observed for: weak (60.0/100). Consider adapting the prompt for these customer types."
        ));

        let poor = evaluation(vec![result("weak", [4, 4, 4, 0, 0, 0, 0, 0], false)]);
        assert!(build_feedback(&poor, &OptimizerConfig::default()).contains("significant improvement"));
    }
}

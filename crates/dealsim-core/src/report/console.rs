//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use super::summary::BatchReport;
use crate::judge::JudgeOutput;
use crate::model::Transcript;
use crate::optimizer::OptimizationRun;

pub fn render_transcript(transcript: &Transcript) -> String {
    let mut out = String::new();
    for (i, turn) in transcript.turns().iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {:<8} {}", i + 1, turn.speaker.label(), turn.text);
    }
    let status = match transcript.termination_reason {
        Some(reason) if transcript.completed => format!("completed ({reason:?})"),
        Some(reason) => format!("stopped ({reason:?})"),
        None => "in progress".to_string(),
    };
    let _ = writeln!(out, "     {} turns, {}", transcript.len(), status);
    out
}

pub fn render_judge(output: &JudgeOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Score: {:.2}/100", output.overall_score);
    for sub in &output.subscores {
        let _ = writeln!(
            out,
            "  {:<42} {}/4  -{:>5.2} of {:>2}",
            sub.criterion.name(),
            sub.rating,
            sub.points_deducted,
            sub.max_points
        );
    }
    if !output.justification.trim().is_empty() {
        let _ = writeln!(out, "Justification: {}", output.justification.trim());
    }
    out
}

pub fn render_batch(report: &BatchReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Average score: {:.2}/100 ({} evaluated, {} failed)",
        s.average_score, s.personas_evaluated, s.personas_failed
    );
    for (persona, score) in &s.scores_by_persona {
        let _ = writeln!(out, "  {persona:<24} {score:>6.2}");
    }
    for failure in &report.failures {
        let _ = writeln!(out, "  {:<24} FAILED: {}", failure.persona_id, failure.error);
    }
    if !s.worst_criteria.is_empty() {
        out.push_str("Weakest criteria:\n");
        for w in &s.worst_criteria {
            let _ = writeln!(
                out,
                "  {:<42} -{:.2} of {}",
                w.criterion.name(),
                w.average_deduction,
                w.max_points
            );
        }
    }
    out
}

pub fn render_optimization(run: &OptimizationRun) -> String {
    let mut out = String::new();
    for it in &run.iterations {
        let marker = if it.is_best { "*" } else { " " };
        let _ = writeln!(
            out,
            "{marker} iteration {:>2}: {:>6.2}  (best so far {:.2})",
            it.iteration, it.average_score, it.best_score_so_far
        );
    }
    let _ = writeln!(
        out,
        "Best score {:.2} at iteration {} ({:+.2} over initial), stopped: {:?}",
        run.best_score, run.best_iteration, run.improvement, run.stop_reason
    );
    let _ = writeln!(out, "Evaluations: {}", run.total_evaluations);
    let _ = writeln!(out, "\nBest prompt:\n{}", run.best_prompt);
    out
}

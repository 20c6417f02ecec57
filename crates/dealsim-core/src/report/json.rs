use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::summary::BatchReport;
use crate::optimizer::{OptimizationRun, PersonaResult};

/// Filesystem-safe UTC timestamp, e.g. `2025-01-01T09-30-00-123Z`.
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}

/// Persisted form of one scored conversation.
pub fn conversation_record(result: &PersonaResult) -> Value {
    let transcript: Vec<Value> = result
        .transcript
        .turns()
        .iter()
        .map(|t| {
            let mut turn = json!({ "speaker": t.speaker, "text": t.text });
            if let Some(ts) = &t.timestamp {
                turn["timestamp"] = json!(ts);
            }
            turn
        })
        .collect();

    json!({
        "persona": {
            "id": result.persona.id,
            "name": result.persona.name(),
            "description": result.persona.description,
        },
        "customer": {
            "customerId": result.customer.customer_id,
            "conversationId": result.customer.conversation_id,
            "displayName": result.customer.display_name,
        },
        "timestamp": result.timestamp.to_rfc3339(),
        "judge": result.judge,
        "conversation": {
            "messageCount": result.transcript.len(),
            "completed": result.transcript.completed,
            "terminationReason": result.transcript.termination_reason,
            "transcript": transcript,
            "exchanges": result.exchanges,
        },
    })
}

/// Writes run artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    root: PathBuf,
}

impl ReportWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `conversations/conversation-{persona}-{conversation}-{timestamp}.json`
    ///
    /// Never replaces an existing record: a colliding name gets a `-{n}` suffix.
    pub fn write_conversation(&self, result: &PersonaResult) -> anyhow::Result<PathBuf> {
        let stem = format!(
            "conversation-{}-{}-{}",
            sanitize(&result.persona.id),
            sanitize(&result.customer.conversation_id),
            file_timestamp(result.timestamp)
        );
        write_unique(&self.root.join("conversations"), &stem, &conversation_record(result))
    }

    /// `aggregated-report-{timestamp}.json`
    pub fn write_batch(&self, report: &BatchReport) -> anyhow::Result<PathBuf> {
        let path = self
            .root
            .join(format!("aggregated-report-{}.json", file_timestamp(report.generated_at)));
        write_pretty(&path, report)?;
        Ok(path)
    }

    /// `optimization-{timestamp}.json`
    pub fn write_optimization(&self, run: &OptimizationRun) -> anyhow::Result<PathBuf> {
        let path = self
            .root
            .join(format!("optimization-{}.json", file_timestamp(run.finished_at)));
        write_pretty(&path, run)?;
        Ok(path)
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_unique<T: Serialize + ?Sized>(
    dir: &Path,
    stem: &str,
    value: &T,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let body = serde_json::to_string_pretty(value)?;

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}-{attempt}.json")
        };
        let path = dir.join(name);
        match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", path.display()))
            }
        }
    }
}

//! Rendering of catalog results.

use std::io::Write;

use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReportError, ReportResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { data: Value },
    Failed { error: String, unavailable: bool },
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok { .. })
    }

    pub fn from_error(err: &ReportError) -> Self {
        Outcome::Failed {
            error: err.to_string(),
            unavailable: err.is_unavailable(),
        }
    }
}

/// One executed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub section: String,
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Consumer of catalog output.
pub trait ReportSink {
    fn section(&mut self, title: &str) -> ReportResult<()>;
    fn entry(&mut self, entry: &ReportEntry) -> ReportResult<()>;
}

/// Section banners followed by pretty-printed JSON per report.
pub struct TextSink<W> {
    out: W,
    color: bool,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn section(&mut self, title: &str) -> ReportResult<()> {
        let banner = format!("=== {} ===", title);
        if self.color {
            writeln!(self.out, "\n{}", banner.bold().cyan())?;
        } else {
            writeln!(self.out, "\n{}", banner)?;
        }
        Ok(())
    }

    fn entry(&mut self, entry: &ReportEntry) -> ReportResult<()> {
        let header = format!("-- {} --", entry.name);
        if self.color {
            writeln!(self.out, "\n{}", header.bold())?;
        } else {
            writeln!(self.out, "\n{}", header)?;
        }
        match &entry.outcome {
            Outcome::Ok { data } => {
                writeln!(self.out, "{}", serde_json::to_string_pretty(data)?)?;
            }
            Outcome::Failed { error, .. } => {
                let line = format!("error: {}", error);
                if self.color {
                    writeln!(self.out, "{}", line.red())?;
                } else {
                    writeln!(self.out, "{}", line)?;
                }
            }
        }
        Ok(())
    }
}

/// Newline-delimited JSON, one object per report.
pub struct JsonSink<W> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn section(&mut self, _title: &str) -> ReportResult<()> {
        Ok(())
    }

    fn entry(&mut self, entry: &ReportEntry) -> ReportResult<()> {
        serde_json::to_writer(&mut self.out, entry)?;
        writeln!(self.out)?;
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub sections: Vec<String>,
    pub entries: Vec<ReportEntry>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl ReportSink for CollectingSink {
    fn section(&mut self, title: &str) -> ReportResult<()> {
        self.sections.push(title.to_string());
        Ok(())
    }

    fn entry(&mut self, entry: &ReportEntry) -> ReportResult<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

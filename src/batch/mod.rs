//! Batch orchestration.
//!
//! Discovers the input files, drives the per-paper pipeline over them in a
//! stable order, and runs the aggregate stages (newsletter, portfolio, email,
//! cost report) over the accumulated outputs once the loop is done. A paper
//! failing any stage never stops the batch; only configuration validation can
//! abort a run, and it does so before the first file is touched.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::extract::{LopdfTextSource, TextSource};
use crate::gateway::{GenerationRequest, ModelClient, ModelGateway};
use crate::notify::Notifier;
use crate::pipeline::{
    language_suffix, CostTotals, FileOutcome, PaperProcessor, RunAccumulator,
};
use crate::portfolio::{build_portfolio, PortfolioEntry};
use crate::publish::DatabasePublisher;
use crate::settings::Settings;

/// Separator between summaries in the newsletter prompt.
const NEWSLETTER_SEPARATOR: &str = "\n\n---\n\n";

const NEWSLETTER_INSTRUCTION: &str = "You are the editor of a research newsletter. Combine the \
    following paper summaries into one coherent newsletter text. Keep the key findings of every \
    paper, group related topics, and maintain a professional tone.";

pub struct BatchOrchestrator<'a> {
    settings: &'a Settings,
    gateway: ModelGateway<'a>,
    text_source: Box<dyn TextSource>,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(settings: &'a Settings, client: Arc<dyn ModelClient>) -> Self {
        Self {
            settings,
            gateway: ModelGateway::new(settings, client),
            text_source: Box::new(LopdfTextSource),
        }
    }

    /// Replaces the PDF reader, used by tests to feed fixture text.
    pub fn with_text_source(mut self, text_source: Box<dyn TextSource>) -> Self {
        self.text_source = text_source;
        self
    }

    /// Processes every PDF in `input_dir` and runs the aggregate stages.
    pub fn run(&self, input_dir: &Path) -> Result<RunReport> {
        self.settings.validate()?;

        let files = discover_pdfs(input_dir)?;
        fs::create_dir_all(&self.settings.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {:?}",
                self.settings.output_dir
            )
        })?;

        let mut accumulator = RunAccumulator::new();
        info!(
            run_id = %accumulator.run_id(),
            files = files.len(),
            input = %input_dir.display(),
            "starting batch run"
        );

        let publisher = self
            .settings
            .publish_to_database
            .then(|| DatabasePublisher::new(self.settings, &self.gateway));
        if let Some(publisher) = &publisher {
            publisher.ensure_schema();
        }

        let processor = PaperProcessor::new(
            self.settings,
            &self.gateway,
            self.text_source.as_ref(),
            publisher.as_ref(),
        );

        let mut outcomes = Vec::with_capacity(files.len());
        for path in &files {
            let outcome = processor.process(path, &mut accumulator);
            if self.settings.delete_after_processing {
                match fs::remove_file(path) {
                    Ok(()) => info!(file = %path.display(), "source file removed"),
                    Err(err) => {
                        warn!(file = %path.display(), error = %err, "failed to remove source")
                    }
                }
            }
            outcomes.push(outcome);
        }

        let email_body = self.newsletter_stage(&mut accumulator);
        let snapshot = accumulator.freeze();

        let mut attachments = snapshot.attachments.clone();
        if self.settings.build_portfolio && !snapshot.summaries.is_empty() {
            let entries = portfolio_entries(&outcomes);
            match build_portfolio(&entries, &self.settings.output_dir) {
                Ok(path) => {
                    info!(file = %path.display(), "portfolio compiled");
                    attachments.push(path);
                }
                Err(err) => error!(error = %err, "portfolio compilation failed"),
            }
        }

        if self.settings.send_email {
            let notifier = Notifier::new(self.settings);
            if let Err(err) = notifier.send(&email_body, &snapshot.summaries, &attachments) {
                error!(error = %err, "email dispatch failed");
            }
        }

        let report = RunReport::new(outcomes, snapshot.costs);
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            input_cost = report.costs.input_cost,
            output_cost = report.costs.output_cost,
            "batch run finished"
        );
        Ok(report)
    }

    /// Generates the newsletter body from all accumulated summaries.
    ///
    /// Skipped entirely (no model call) when nothing was summarized, even if
    /// the toggle is on; the configured body is used in that case.
    fn newsletter_stage(&self, accumulator: &mut RunAccumulator) -> String {
        if !self.settings.build_newsletter || accumulator.summaries().is_empty() {
            return self.settings.email_body.clone();
        }

        let prompt = format!(
            "{}{}",
            accumulator.summaries().join(NEWSLETTER_SEPARATOR),
            language_suffix(&self.settings.text_language)
        );
        let result = self.gateway.generate(
            &GenerationRequest {
                instruction: NEWSLETTER_INSTRUCTION.to_string(),
                prompt,
                model: self.settings.newsletter_model.clone(),
                ..GenerationRequest::default()
            },
            accumulator,
        );
        match result.text {
            Some(newsletter) => newsletter,
            None => {
                warn!("newsletter generation failed, keeping the configured email body");
                self.settings.email_body.clone()
            }
        }
    }
}

/// PDFs directly inside `dir` (no recursion), in sorted order.
fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        anyhow::bail!("Input directory {:?} does not exist", dir);
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn portfolio_entries(outcomes: &[FileOutcome]) -> Vec<PortfolioEntry> {
    outcomes
        .iter()
        .filter_map(|outcome| {
            let summary = outcome.record.summary.as_ref()?;
            let title = outcome
                .record
                .metadata
                .as_ref()
                .map(|m| m.title.clone())
                .unwrap_or_else(|| outcome.record.base_name.clone());
            Some(PortfolioEntry {
                title,
                body: summary.clone(),
            })
        })
        .collect()
}

/// Final run summary, derived from per-file outcomes and the frozen costs.
#[derive(Debug)]
pub struct RunReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub summaries_created: usize,
    pub outcomes: Vec<FileOutcome>,
    pub costs: CostTotals,
}

impl RunReport {
    fn new(outcomes: Vec<FileOutcome>, costs: CostTotals) -> Self {
        let processed = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.clean()).count();
        let failed = outcomes.iter().filter(|o| o.failed()).count();
        let summaries_created = outcomes
            .iter()
            .filter(|o| o.record.summary.is_some())
            .count();
        Self {
            processed,
            succeeded,
            failed,
            summaries_created,
            outcomes,
            costs,
        }
    }

    pub fn describe(&self) -> String {
        let mut line = format!(
            "Processed {} file(s): {} clean, {} failed, {} summarized. Estimated cost ${:.4} \
             (input ${:.4}, output ${:.4}).",
            self.processed,
            self.succeeded,
            self.failed,
            self.summaries_created,
            self.costs.total(),
            self.costs.input_cost,
            self.costs.output_cost
        );
        for outcome in self.outcomes.iter().filter(|o| !o.clean()) {
            for issue in &outcome.issues {
                line.push_str(&format!(
                    "\n  {}: {} failed ({})",
                    outcome.record.source_path.display(),
                    issue.stage.label(),
                    issue.message
                ));
            }
        }
        line
    }
}

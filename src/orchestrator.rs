use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::agent::{AgentRunner, Role};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::validate_source_text;
use crate::prompts::PromptEngine;
use crate::review::{Verdict, parse_review_output};

// ---------------------------------------------------------------------------
// Run outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Approved,
    MaxIterationsReached,
    ReviewerFailed,
    FixerFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Approved => "approved",
            RunStatus::MaxIterationsReached => "max_iterations_reached",
            RunStatus::ReviewerFailed => "reviewer_failed",
            RunStatus::FixerFailed => "fixer_failed",
        }
    }

    /// Both failure statuses mean an upstream call died mid-run and the
    /// result carries partial work. Running out of iterations is not a
    /// failure; the last chart is still the deliverable.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::ReviewerFailed | RunStatus::FixerFailed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed review pass. `issues` is the reviewer's findings joined
/// with newlines, empty on approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub chart: String,
    pub issues: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub final_chart: String,
    pub iterations: u32,
    pub history: Vec<IterationRecord>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn finish(
    final_chart: String,
    history: Vec<IterationRecord>,
    status: RunStatus,
    error: Option<String>,
) -> RunResult {
    RunResult {
        final_chart,
        iterations: history.len() as u32,
        history,
        status,
        error,
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    Generating,
    Reviewing,
    Fixing,
}

impl RunStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStep::Generating => "generating",
            RunStep::Reviewing => "reviewing",
            RunStep::Fixing => "fixing",
        }
    }
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer for pipeline progress. Fired at the start of each stage;
/// `iteration` is 0 while the initial chart is being generated.
pub trait ProgressReporter: Send + Sync {
    fn step(&self, step: RunStep, iteration: u32, max_iterations: u32, message: &str);
}

/// Default reporter that prints to stderr.
pub struct StderrReporter;

impl ProgressReporter for StderrReporter {
    fn step(&self, _step: RunStep, _iteration: u32, _max_iterations: u32, message: &str) {
        eprintln!("[claimchart] {message}");
    }
}

/// Reporter for callers that do not want progress output.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn step(&self, _step: RunStep, _iteration: u32, _max_iterations: u32, _message: &str) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<R, P = StderrReporter> {
    runner: R,
    prompt_engine: PromptEngine,
    config: Config,
    reporter: P,
}

impl<R: AgentRunner> Orchestrator<R> {
    pub fn new(runner: R, prompt_engine: PromptEngine, config: Config) -> Self {
        Self {
            runner,
            prompt_engine,
            config,
            reporter: StderrReporter,
        }
    }
}

impl<R: AgentRunner, P: ProgressReporter> Orchestrator<R, P> {
    pub fn with_reporter(
        runner: R,
        prompt_engine: PromptEngine,
        config: Config,
        reporter: P,
    ) -> Self {
        Self {
            runner,
            prompt_engine,
            config,
            reporter,
        }
    }

    /// Run the generate → review → fix pipeline over one complaint text.
    ///
    /// Returns `Err` only when no chart exists yet: the input fails
    /// validation or the generator call dies. Once a chart has been
    /// generated, reviewer and fixer faults produce an `Ok` result with a
    /// failure status and the history accumulated so far.
    pub async fn run(&self, source_text: &str) -> Result<RunResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("chart_run", run_id = %run_id);
        self.run_inner(source_text).instrument(span).await
    }

    async fn run_inner(&self, source_text: &str) -> Result<RunResult> {
        validate_source_text(source_text, self.config.max_source_chars)?;

        let max = self.config.max_iterations;
        info!(
            source_chars = source_text.len(),
            max_iterations = max,
            "starting chart run"
        );

        self.reporter.step(
            RunStep::Generating,
            0,
            max,
            "generating initial falsity chart",
        );
        let mut chart = self.call_generator(source_text).await?;

        let mut history: Vec<IterationRecord> = Vec::new();

        for iteration in 1..=max {
            self.reporter.step(
                RunStep::Reviewing,
                iteration,
                max,
                &format!("reviewing chart (iteration {iteration}/{max})"),
            );
            let verdict = match self.call_reviewer(source_text, &chart, iteration).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(iteration, error = %e, "reviewer failed, returning partial result");
                    return Ok(finish(
                        chart,
                        history,
                        RunStatus::ReviewerFailed,
                        Some(e.to_string()),
                    ));
                }
            };

            match verdict {
                Verdict::Approved => {
                    history.push(IterationRecord {
                        iteration,
                        chart: chart.clone(),
                        issues: String::new(),
                    });
                    info!(iteration, "chart approved");
                    return Ok(finish(chart, history, RunStatus::Approved, None));
                }
                Verdict::Issues(issues) => {
                    let issues_text = issues.join("\n");
                    history.push(IterationRecord {
                        iteration,
                        chart: chart.clone(),
                        issues: issues_text.clone(),
                    });
                    info!(iteration, issue_count = issues.len(), "reviewer found issues");

                    if iteration == max {
                        info!(max_iterations = max, "iteration budget exhausted");
                        return Ok(finish(
                            chart,
                            history,
                            RunStatus::MaxIterationsReached,
                            None,
                        ));
                    }

                    self.reporter.step(
                        RunStep::Fixing,
                        iteration,
                        max,
                        &format!(
                            "fixing {} issue(s) (iteration {iteration}/{max})",
                            issues.len()
                        ),
                    );
                    chart = match self.call_fixer(source_text, &chart, &issues_text, iteration).await
                    {
                        Ok(fixed) => fixed,
                        Err(e) => {
                            warn!(iteration, error = %e, "fixer failed, returning partial result");
                            return Ok(finish(
                                chart,
                                history,
                                RunStatus::FixerFailed,
                                Some(e.to_string()),
                            ));
                        }
                    };
                }
            }
        }

        unreachable!("final review iteration always returns")
    }

    async fn call_generator(&self, source_text: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("source_text".to_string(), source_text.to_string());
        let prompt = self
            .prompt_engine
            .render_role(Role::Generator.as_str(), &vars)?;

        let started = Instant::now();
        let output = self.runner.run(Role::Generator, &prompt).await?;
        info!(
            elapsed_secs = started.elapsed().as_secs(),
            "generator complete"
        );

        let chart = output.trim().to_string();
        if chart.is_empty() {
            return Err(Error::Upstream(
                "generator returned an empty chart".to_string(),
            ));
        }
        Ok(chart)
    }

    async fn call_reviewer(
        &self,
        source_text: &str,
        chart: &str,
        iteration: u32,
    ) -> Result<Verdict> {
        let mut vars = HashMap::new();
        vars.insert("source_text".to_string(), source_text.to_string());
        vars.insert("chart".to_string(), chart.to_string());
        let prompt = self
            .prompt_engine
            .render_role(Role::Reviewer.as_str(), &vars)?;

        let started = Instant::now();
        let output = self.runner.run(Role::Reviewer, &prompt).await?;
        info!(
            iteration,
            elapsed_secs = started.elapsed().as_secs(),
            "reviewer complete"
        );

        parse_review_output(&output)
    }

    async fn call_fixer(
        &self,
        source_text: &str,
        chart: &str,
        issues: &str,
        iteration: u32,
    ) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("source_text".to_string(), source_text.to_string());
        vars.insert("chart".to_string(), chart.to_string());
        vars.insert("issues".to_string(), issues.to_string());
        let prompt = self.prompt_engine.render_role(Role::Fixer.as_str(), &vars)?;

        let started = Instant::now();
        let output = self.runner.run(Role::Fixer, &prompt).await?;
        info!(
            iteration,
            elapsed_secs = started.elapsed().as_secs(),
            "fixer complete"
        );

        let fixed = output.trim().to_string();
        if fixed.is_empty() {
            return Err(Error::Upstream(
                "fixer returned an empty chart".to_string(),
            ));
        }
        Ok(fixed)
    }
}

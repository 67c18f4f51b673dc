//! Parallel race of retrieval strategies
//!
//! Every viable strategy runs as its own task under its own deadline. The
//! first non-error result resolves the race and the remaining tasks are
//! aborted; errors only end the race once every task has reported one.
//!
//! ```text
//! Pending -> Racing -> Resolved
//!                   \-> AllFailed
//! ```

use crate::error::{FlowscopeError, Result};
use crate::patterns::{CannedAnswer, PatternTable};
use crate::retrieval::{Document, Query, Retriever};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a strategy produced
#[derive(Debug, Clone)]
pub enum StrategyOutput {
    Canned(CannedAnswer),
    Documents(Vec<Document>),
}

/// One racer
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn deadline(&self) -> Duration;

    /// Vector collections touched when this strategy wins
    fn collections(&self) -> Vec<String> {
        Vec::new()
    }

    async fn execute(&self, query: &Query) -> Result<StrategyOutput>;
}

/// Wraps a retrieval adapter
pub struct RetrievalStrategy {
    retriever: Arc<dyn Retriever>,
    deadline: Duration,
}

impl RetrievalStrategy {
    pub fn new(retriever: Arc<dyn Retriever>, deadline: Duration) -> Self {
        Self {
            retriever,
            deadline,
        }
    }
}

#[async_trait]
impl Strategy for RetrievalStrategy {
    fn name(&self) -> &str {
        self.retriever.name()
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    fn collections(&self) -> Vec<String> {
        self.retriever.collections()
    }

    async fn execute(&self, query: &Query) -> Result<StrategyOutput> {
        self.retriever
            .retrieve(query)
            .await
            .map(StrategyOutput::Documents)
    }
}

/// Zero-latency lookup in the canned answer table
pub struct PatternStrategy {
    table: Arc<PatternTable>,
    deadline: Duration,
}

impl PatternStrategy {
    pub fn new(table: Arc<PatternTable>, deadline: Duration) -> Self {
        Self { table, deadline }
    }
}

#[async_trait]
impl Strategy for PatternStrategy {
    fn name(&self) -> &str {
        "pattern"
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn execute(&self, query: &Query) -> Result<StrategyOutput> {
        self.table
            .match_query(&query.text)
            .map(StrategyOutput::Canned)
            .ok_or_else(|| FlowscopeError::backend("pattern", "no canned answer matches"))
    }
}

/// Lifecycle of one race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceState {
    Pending,
    Racing { remaining: usize },
    Resolved,
    AllFailed,
}

/// Result of a successful strategy
#[derive(Debug, Clone)]
pub struct Winner {
    pub strategy: String,
    pub collections: Vec<String>,
    pub output: StrategyOutput,
}

/// Resolved race
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub winners: Vec<Winner>,
    /// Failures reported before resolution
    pub failures: Vec<String>,
}

impl RaceOutcome {
    /// Apply the tie-break: a canned answer beats computed results
    pub fn resolve(winners: Vec<Winner>, failures: Vec<String>) -> Self {
        let canned = winners
            .iter()
            .position(|w| matches!(w.output, StrategyOutput::Canned(_)));

        let winners = match canned {
            Some(idx) => winners.into_iter().skip(idx).take(1).collect(),
            None => winners,
        };

        Self { winners, failures }
    }

    pub fn canned(&self) -> Option<&CannedAnswer> {
        self.winners.iter().find_map(|w| match &w.output {
            StrategyOutput::Canned(answer) => Some(answer),
            StrategyOutput::Documents(_) => None,
        })
    }

    /// Computed documents from every winner, in arrival order
    pub fn documents(&self) -> Vec<Document> {
        self.winners
            .iter()
            .filter_map(|w| match &w.output {
                StrategyOutput::Documents(docs) => Some(docs.iter().cloned()),
                StrategyOutput::Canned(_) => None,
            })
            .flatten()
            .collect()
    }

    pub fn adapters_used(&self) -> Vec<String> {
        self.winners.iter().map(|w| w.strategy.clone()).collect()
    }

    pub fn collections_used(&self) -> Vec<String> {
        let mut collections: Vec<String> = Vec::new();
        for name in self.winners.iter().flat_map(|w| w.collections.iter()) {
            if !collections.contains(name) {
                collections.push(name.clone());
            }
        }
        collections
    }
}

type TaskResult = (String, Vec<String>, Result<StrategyOutput>);

/// Runs strategies concurrently; first success wins
#[derive(Debug, Clone, Default)]
pub struct ParallelCoordinator;

impl ParallelCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Race `strategies` for `query`
    ///
    /// `prior_failures` are reasons already known before the race (for example
    /// an unavailable adapter) and are included if every strategy fails.
    pub async fn race(
        &self,
        query: Arc<Query>,
        strategies: Vec<Arc<dyn Strategy>>,
        prior_failures: Vec<String>,
    ) -> Result<RaceOutcome> {
        let mut pending = strategies;
        let mut failures = prior_failures;
        let mut winners = Vec::new();
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut state = RaceState::Pending;

        loop {
            state = match state {
                RaceState::Pending if pending.is_empty() => {
                    failures.push("no strategies to run".to_string());
                    RaceState::AllFailed
                }
                RaceState::Pending => {
                    for strategy in pending.drain(..) {
                        tasks.spawn(run_strategy(strategy, query.clone()));
                    }
                    RaceState::Racing {
                        remaining: tasks.len(),
                    }
                }
                RaceState::Racing { remaining: 0 } => RaceState::AllFailed,
                RaceState::Racing { .. } => match tasks.join_next().await {
                    Some(joined) => {
                        record(joined, &mut winners, &mut failures);
                        if winners.is_empty() {
                            RaceState::Racing {
                                remaining: tasks.len(),
                            }
                        } else {
                            // Collect anything that finished alongside the winner
                            while let Some(joined) = tasks.try_join_next() {
                                record(joined, &mut winners, &mut failures);
                            }
                            RaceState::Resolved
                        }
                    }
                    None => RaceState::AllFailed,
                },
                RaceState::Resolved => {
                    let cancelled = tasks.len();
                    tasks.abort_all();
                    // Drain so aborted tasks drop their leases before we return
                    while tasks.join_next().await.is_some() {}

                    let outcome = RaceOutcome::resolve(winners, failures);
                    info!(
                        winners = ?outcome.adapters_used(),
                        cancelled,
                        "Race resolved"
                    );
                    return Ok(outcome);
                }
                RaceState::AllFailed => {
                    warn!(failures = failures.len(), "Every strategy failed");
                    return Err(FlowscopeError::AllStrategiesFailed { reasons: failures });
                }
            };
            debug!(?state, "Race state");
        }
    }
}

async fn run_strategy(strategy: Arc<dyn Strategy>, query: Arc<Query>) -> TaskResult {
    let name = strategy.name().to_string();
    let collections = strategy.collections();
    let deadline = strategy.deadline();
    let result = match tokio::time::timeout(deadline, strategy.execute(&query)).await {
        Ok(result) => result,
        Err(_) => Err(FlowscopeError::BackendTimeout {
            strategy: name.clone(),
            after: deadline,
        }),
    };
    (name, collections, result)
}

fn record(
    joined: std::result::Result<TaskResult, tokio::task::JoinError>,
    winners: &mut Vec<Winner>,
    failures: &mut Vec<String>,
) {
    match joined {
        Ok((strategy, collections, Ok(output))) => {
            debug!(strategy = %strategy, "Strategy succeeded");
            winners.push(Winner {
                strategy,
                collections,
                output,
            });
        }
        Ok((strategy, _, Err(e))) => {
            warn!(strategy = %strategy, "Strategy failed: {}", e);
            failures.push(format!("{}: {}", strategy, e));
        }
        Err(e) => {
            warn!("Strategy task did not complete: {}", e);
            failures.push(format!("task: {}", e));
        }
    }
}

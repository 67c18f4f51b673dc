//! Request entry point
//!
//! [`Analyzer::analyze`] wires classification, routing, the strategy race,
//! caching and assembly together. Every outcome, including invalid input and
//! total failure, comes back as an [`AnalysisResponse`].

use crate::assembler::{AnalysisResponse, Assembly, ResultAssembler};
use crate::backends::{
    ChromaHttpStore, GraphConnector, LanguageModel, Neo4jHttpConnector, OpenAiCompatibleClient,
    PoolSettings, SessionPool, VectorStore,
};
use crate::cache::{CacheHierarchy, CacheLookup, CacheSettings, CacheTier, RequestKey};
use crate::classifier::{ClassificationLabel, QueryClassifier};
use crate::config::{Config, CoordinatorConfig, QueryConfig};
use crate::coordinator::{ParallelCoordinator, PatternStrategy, RetrievalStrategy, Strategy};
use crate::error::{FlowscopeError, Result};
use crate::patterns::PatternTable;
use crate::retrieval::{
    ConversationTurn, Document, GraphAdapter, HybridAdapter, Query, Retriever, VectorAdapter,
};
use crate::router::{self, AdapterSelection, Availability};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Conversation turns carried into prompts
pub const HISTORY_WINDOW: usize = 6;

/// Documents quoted in the extractive fallback answer
const DIGEST_DOCUMENTS: usize = 5;

/// Caller's analysis-type hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    Auto,
    Graph,
    Semantic,
    Hybrid,
    Conversational,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Graph => "graph",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
            Self::Conversational => "conversational",
        }
    }

    /// Label forced by the hint, `None` for `Auto`
    pub fn forced_label(&self) -> Option<ClassificationLabel> {
        match self {
            Self::Auto => None,
            Self::Graph => Some(ClassificationLabel::Graph),
            Self::Semantic => Some(ClassificationLabel::Semantic),
            Self::Hybrid => Some(ClassificationLabel::Hybrid),
            Self::Conversational => Some(ClassificationLabel::Conversational),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = FlowscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "graph" => Ok(Self::Graph),
            "semantic" | "vector" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            "conversational" | "chat" => Ok(Self::Conversational),
            other => Err(FlowscopeError::InvalidInput(format!(
                "unknown analysis type '{}'",
                other
            ))),
        }
    }
}

/// One analysis call as received from the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    #[serde(default)]
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub include_sources: bool,
    /// 0 selects the configured default
    #[serde(default)]
    pub max_results: usize,
    pub user_id: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            analysis_type: AnalysisType::Auto,
            include_sources: false,
            max_results: 0,
            user_id: user_id.into(),
            history: Vec::new(),
        }
    }

    pub fn with_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = analysis_type;
        self
    }

    pub fn with_sources(mut self, include_sources: bool) -> Self {
        self.include_sources = include_sources;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }
}

/// External collaborators; `None` marks a backend as unavailable
#[derive(Clone)]
pub struct Backends {
    pub llm: Arc<dyn LanguageModel>,
    pub graph: Option<Arc<dyn GraphConnector>>,
    pub vector: Option<Arc<dyn VectorStore>>,
}

impl Backends {
    /// HTTP clients for every enabled backend with a URL
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);

        let graph = if config.graph.enabled && !config.graph.url.trim().is_empty() {
            let connector =
                Neo4jHttpConnector::from_config(&config.graph, config.coordinator.graph_deadline())?;
            Some(Arc::new(connector) as Arc<dyn GraphConnector>)
        } else {
            None
        };

        let vector = if config.vector.enabled && !config.vector.url.trim().is_empty() {
            let store =
                ChromaHttpStore::from_config(&config.vector, config.coordinator.vector_deadline())?;
            Some(Arc::new(store) as Arc<dyn VectorStore>)
        } else {
            None
        };

        Ok(Self { llm, graph, vector })
    }

    pub fn availability(&self) -> Availability {
        Availability::new(self.graph.is_some(), self.vector.is_some())
    }
}

/// Natural-language security query router
pub struct Analyzer {
    limits: QueryConfig,
    deadlines: CoordinatorConfig,
    llm: Arc<dyn LanguageModel>,
    classifier: QueryClassifier,
    availability: Availability,
    graph: Option<Arc<GraphAdapter>>,
    vector: Option<Arc<VectorAdapter>>,
    hybrid: Option<Arc<HybridAdapter>>,
    patterns: Arc<PatternTable>,
    cache: CacheHierarchy,
    coordinator: ParallelCoordinator,
    assembler: ResultAssembler,
}

impl Analyzer {
    pub fn new(backends: Backends, config: &Config) -> Result<Self> {
        let patterns = Arc::new(PatternTable::from_configs(&config.patterns)?);

        let graph = match &backends.graph {
            Some(connector) => {
                let pool = SessionPool::new(connector.clone(), PoolSettings::from(&config.pool));
                Some(Arc::new(GraphAdapter::new(Arc::new(pool))?))
            }
            None => None,
        };

        let vector = backends.vector.as_ref().map(|store| {
            Arc::new(VectorAdapter::new(
                store.clone(),
                config.vector.collections.clone(),
                config.vector.results_per_collection,
            ))
        });

        let hybrid = match (&graph, &vector) {
            (Some(g), Some(v)) => Some(Arc::new(HybridAdapter::new(
                g.clone() as Arc<dyn Retriever>,
                v.clone() as Arc<dyn Retriever>,
                config.coordinator.graph_deadline(),
                config.coordinator.vector_deadline(),
            ))),
            _ => None,
        };

        let availability = backends.availability();
        info!(
            graph = availability.graph,
            vector = availability.vector,
            patterns = patterns.len(),
            "Analyzer ready"
        );

        Ok(Self {
            limits: config.query.clone(),
            deadlines: config.coordinator.clone(),
            classifier: QueryClassifier::new(backends.llm.clone()),
            llm: backends.llm,
            availability,
            graph,
            vector,
            hybrid,
            cache: CacheHierarchy::new(CacheSettings::from(&config.cache), patterns.clone()),
            patterns,
            coordinator: ParallelCoordinator::new(),
            assembler: ResultAssembler::from(&config.assembler),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(Backends::from_config(config)?, config)
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn cache(&self) -> &CacheHierarchy {
        &self.cache
    }

    /// Label for `text` without running retrieval
    pub async fn classify(&self, text: &str) -> ClassificationLabel {
        self.classifier.classify(text).await
    }

    /// Answer one request; never returns an error
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisResponse {
        let started = Instant::now();
        let span = info_span!(
            "analyze",
            request_id = %Uuid::new_v4(),
            user = %request.user_id,
            hint = %request.analysis_type
        );

        async {
            match self.run(&request, started).await {
                Ok(response) => {
                    info!(
                        query_type = %response.query_type,
                        adapters = ?response.adapters_used,
                        cache_hit = ?response.cache_hit,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Analysis complete"
                    );
                    response
                }
                Err(e) => {
                    if e.is_user_visible() {
                        warn!("Analysis rejected: {}", e);
                    } else {
                        error!("Analysis failed: {}", e);
                    }
                    self.assembler.failure(&e, started)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &AnalysisRequest, started: Instant) -> Result<AnalysisResponse> {
        let text = self.validate(&request.query)?;
        let max_results = self.clamp_max_results(request.max_results);
        let key = RequestKey::new(text, request.analysis_type.as_str(), &request.user_id);

        if let Some(response) = self.cached(&key, request.include_sources, started) {
            return Ok(response);
        }

        // Sources responses are never cached, so they only deduplicate among themselves
        let flight_key = if request.include_sources {
            RequestKey::new(
                text,
                &format!("{}+sources", request.analysis_type.as_str()),
                &request.user_id,
            )
        } else {
            key.clone()
        };

        let _in_flight = match self.cache.try_begin(&flight_key) {
            Some(guard) => guard,
            None if request.include_sources => {
                debug!(fingerprint = %flight_key.fingerprint, "Identical sources request in flight");
                return Ok(self.assembler.processing(started));
            }
            None => {
                debug!(fingerprint = %key.fingerprint, "Identical request in flight, waiting");
                return Ok(match self.cache.await_in_flight(&key).await {
                    Some(response) => response.served_from(CacheTier::Exact, started),
                    None => self.assembler.processing(started),
                });
            }
        };

        let label = match request.analysis_type.forced_label() {
            Some(label) => label,
            None => self.classifier.classify(text).await,
        };

        let history = recent_history(&request.history);
        let query = Arc::new(
            Query::new(text, request.user_id.clone(), max_results).with_history(history.to_vec()),
        );

        let response = self
            .answer(label, query, request.include_sources, started)
            .await?;

        if !request.include_sources && response.success {
            self.cache.store(&key, &response);
        }
        Ok(response)
    }

    fn validate<'a>(&self, raw: &'a str) -> Result<&'a str> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(FlowscopeError::InvalidInput("query is empty".to_string()));
        }
        let length = text.chars().count();
        if length > self.limits.max_query_length {
            return Err(FlowscopeError::InvalidInput(format!(
                "query is {} characters, limit is {}",
                length, self.limits.max_query_length
            )));
        }
        Ok(text)
    }

    fn clamp_max_results(&self, requested: usize) -> usize {
        let requested = if requested == 0 {
            self.limits.default_max_results
        } else {
            requested
        };
        requested.clamp(1, self.limits.max_results_cap.max(1))
    }

    fn cached(
        &self,
        key: &RequestKey,
        include_sources: bool,
        started: Instant,
    ) -> Option<AnalysisResponse> {
        if include_sources {
            return self
                .cache
                .lookup_pattern(key)
                .map(|canned| self.assembler.pattern(&canned, started));
        }

        match self.cache.lookup(key) {
            CacheLookup::Exact(response) => Some(response.served_from(CacheTier::Exact, started)),
            CacheLookup::Pattern(canned) => Some(self.assembler.pattern(&canned, started)),
            CacheLookup::Similar(found) => {
                debug!(
                    similarity = found.similarity,
                    matched = %found.matched,
                    "Reusing similar query"
                );
                Some(found.value.served_from(CacheTier::Similarity, started))
            }
            CacheLookup::Miss => None,
        }
    }

    async fn answer(
        &self,
        label: ClassificationLabel,
        query: Arc<Query>,
        include_sources: bool,
        started: Instant,
    ) -> Result<AnalysisResponse> {
        let mut prior_failures = Vec::new();
        let selection = match router::select(label, self.availability) {
            Ok(selection) => Some(selection),
            Err(e) => {
                warn!("{}", e);
                prior_failures.push(e.to_string());
                None
            }
        };
        info!(label = %label, selection = ?selection.map(|s| s.as_str()), "Routing query");

        if selection == Some(AdapterSelection::Direct) {
            let answer = self
                .llm
                .complete(&conversation_prompt(&query))
                .await
                .map_err(|e| FlowscopeError::AllStrategiesFailed {
                    reasons: vec![format!("llm: {}", e)],
                })?;
            return Ok(self.assembler.success(
                Assembly {
                    answer,
                    query_type: label.as_str(),
                    adapters_used: vec!["llm".to_string()],
                    collections_used: None,
                    documents: &[],
                    include_sources,
                },
                started,
            ));
        }

        let mut strategies: Vec<Arc<dyn Strategy>> = Vec::new();
        if let Some(strategy) = selection.and_then(|s| self.retrieval_strategy(s)) {
            strategies.push(strategy);
        }
        strategies.push(Arc::new(PatternStrategy::new(
            self.patterns.clone(),
            self.deadlines.pattern_deadline(),
        )));

        let outcome = self
            .coordinator
            .race(query.clone(), strategies, prior_failures)
            .await?;

        if let Some(canned) = outcome.canned() {
            let mut response = self.assembler.pattern(canned, started);
            response.cache_hit = None;
            return Ok(response);
        }

        let documents = outcome.documents();
        let answer = self.synthesize(&query, &documents).await;

        Ok(self.assembler.success(
            Assembly {
                answer,
                query_type: label.as_str(),
                adapters_used: outcome.adapters_used(),
                collections_used: Some(outcome.collections_used()),
                documents: &documents,
                include_sources,
            },
            started,
        ))
    }

    fn retrieval_strategy(&self, selection: AdapterSelection) -> Option<Arc<dyn Strategy>> {
        let (retriever, deadline) = match selection {
            AdapterSelection::Direct => return None,
            AdapterSelection::Graph => (
                self.graph.clone()? as Arc<dyn Retriever>,
                self.deadlines.graph_deadline(),
            ),
            AdapterSelection::Vector => (
                self.vector.clone()? as Arc<dyn Retriever>,
                self.deadlines.vector_deadline(),
            ),
            AdapterSelection::Hybrid => (
                self.hybrid.clone()? as Arc<dyn Retriever>,
                self.deadlines.hybrid_deadline(),
            ),
        };
        Some(Arc::new(RetrievalStrategy::new(retriever, deadline)))
    }

    /// Compose an answer from retrieved documents, falling back to a digest
    async fn synthesize(&self, query: &Query, documents: &[Document]) -> String {
        if documents.is_empty() {
            return "No matching flows or log entries were found for this question.".to_string();
        }

        let context: Vec<&Document> = documents.iter().take(query.max_results).collect();
        let prompt = synthesis_prompt(query, &context, self.assembler.max_content_chars());

        match self.llm.complete(&prompt).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                warn!("Synthesis returned nothing, using extractive digest");
                digest(&context, self.assembler.max_content_chars())
            }
            Err(e) => {
                warn!("Synthesis failed, using extractive digest: {}", e);
                digest(&context, self.assembler.max_content_chars())
            }
        }
    }
}

fn recent_history(history: &[ConversationTurn]) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

fn render_history(out: &mut String, history: &[ConversationTurn]) {
    if history.is_empty() {
        return;
    }
    out.push_str("Conversation so far:\n");
    for turn in history {
        out.push_str(&format!("{}: {}\n", turn.role, turn.content));
    }
    out.push('\n');
}

fn conversation_prompt(query: &Query) -> String {
    let mut prompt = String::from(
        "You are a network security analyst assistant. Answer briefly and plainly.\n\n",
    );
    render_history(&mut prompt, &query.history);
    prompt.push_str(&format!("user: {}\nassistant:", query.text));
    prompt
}

fn synthesis_prompt(query: &Query, documents: &[&Document], max_chars: usize) -> String {
    let mut prompt = String::from(
        "You are a network security analyst. Answer the question using only the \
         evidence below. Cite IP addresses, ports and protocols exactly as written.\n\n",
    );
    render_history(&mut prompt, &query.history);

    prompt.push_str("Evidence:\n");
    for (i, doc) in documents.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] ({}) {}\n",
            i + 1,
            doc.metadata.data_type,
            crate::assembler::truncate(&doc.content, max_chars)
        ));
    }

    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", query.text));
    prompt
}

/// Extractive answer used when the model is unavailable
fn digest(documents: &[&Document], max_chars: usize) -> String {
    let mut out = format!("Found {} relevant records:", documents.len());
    for doc in documents.iter().take(DIGEST_DOCUMENTS) {
        out.push_str("\n- ");
        out.push_str(&crate::assembler::truncate(&doc.content, max_chars));
    }
    out
}

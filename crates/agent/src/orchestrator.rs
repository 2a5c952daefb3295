//! The session orchestrator.
//!
//! One `Orchestrator` per session owns that session's history and active
//! persona. Each query runs through classification, persona scope checks
//! and the answering backend, and every failure comes back as a structured
//! error record instead of escaping.

use std::sync::Arc;

use futures::{StreamExt, stream};
use medassist_config::{AppConfig, ModelConfig};
use medassist_core::classification::{QueryCategory, QueryClassification};
use medassist_core::error::{ErrorKind, ErrorRecord, ProviderError, QueryError};
use medassist_core::history::{Exchange, HistoryRing};
use medassist_core::message::Message;
use medassist_core::nutrition::NutritionAnalysis;
use medassist_core::persona::{PersonaConfig, PersonaId, ScopeValidation};
use medassist_core::provider::{Provider, ProviderRequest, VisionRequest};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::{AggregationContext, ChunkStream, ResponseAggregator};
use crate::classifier::{Classifier, GreetingKind, greeting_kind};
use crate::parser;
use crate::persona::{PersonaRegistry, matches_keywords, refusal_message};
use crate::profile::{Profile, ProfileExtractor, ProfileKind};
use crate::state::{QueryState, QueryTracker};
use crate::stream_event::{CompletionMetadata, Route, StreamChunk};
use crate::timeouts::{Timeouts, within};

pub const DISCLAIMER: &str = "Always consult your healthcare provider before making any changes to your medication or treatment plan.";

pub const FOOD_ANALYSIS_PROMPT: &str = "You are a nutritional analysis expert. Provide a comprehensive analysis of the food image:

1. Health Category: Classify as one of:
   - Clearly Healthy
   - Borderline
   - Mixed
   - Clearly Unhealthy

2. Confidence Score: Provide a confidence level (0-100%)

3. Detailed Analysis:
   Break down the following aspects:
   - Food name: Identify the food item
   - Caloric Content: Analyze the caloric density and impact
   - Macronutrients: Evaluate proteins, fats, carbohydrates present
   - Processing Level: Assess how processed the foods are
   - Nutritional Profile: Identify key nutrients present or lacking
   - Health Implications: Discuss potential health effects
   - Portion Considerations: Comment on serving sizes if relevant

4. Summary: Conclude with overall health impact and recommendations

Format your response exactly as:
Category: [category]
Confidence: [number]%
Analysis:
[Provide detailed analysis]
[Include specific items from the image in your analysis]
[Leave out any aspect above that does not apply to the image]
[End with a summary statement]";

/// Backend handles, one per external role.
#[derive(Clone)]
pub struct Collaborators {
    pub answering: Arc<dyn Provider>,
    pub classification: Arc<dyn Provider>,
    pub vision: Arc<dyn Provider>,
}

/// Model name and sampling settings for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl From<&ModelConfig> for ModelParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A successful query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub query: String,
    pub response: String,
    #[serde(flatten)]
    pub metadata: CompletionMetadata,
    pub conversation_history: Vec<Exchange>,
}

/// The user-facing result of `ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Success(QueryAnswer),
    Error(ErrorRecord),
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The answer text or the error message.
    pub fn text(&self) -> &str {
        match self {
            Self::Success(answer) => &answer.response,
            Self::Error(error) => &error.message,
        }
    }
}

/// The user-facing result of `analyze_image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageAnalysisResponse {
    Success(NutritionAnalysis),
    Error(ErrorRecord),
}

/// Where routing sent a query.
enum Routing {
    /// Short-circuit with a fixed or derived reply.
    Reply {
        content: String,
        route: Route,
        persona: PersonaId,
        category: Option<QueryCategory>,
    },
    /// Hand the query to the answering backend.
    Answer {
        persona: PersonaConfig,
        category: QueryCategory,
    },
}

pub struct Orchestrator {
    collaborators: Collaborators,
    registry: PersonaRegistry,
    answer: ModelParams,
    classifier: ModelParams,
    vision: ModelParams,
    timeouts: Timeouts,
    history: Arc<Mutex<HistoryRing>>,
    active_persona: RwLock<PersonaId>,
}

impl Orchestrator {
    /// Create an orchestrator with default model settings.
    pub fn new(collaborators: Collaborators, registry: PersonaRegistry) -> Self {
        let defaults = AppConfig::default();
        let persona = registry.default_persona();
        Self {
            collaborators,
            registry,
            answer: ModelParams::from(&defaults.answering),
            classifier: ModelParams::from(&defaults.classifier),
            vision: ModelParams::from(&defaults.vision),
            timeouts: Timeouts::from(&defaults.timeouts),
            history: Arc::new(Mutex::new(HistoryRing::new(defaults.history.max_entries))),
            active_persona: RwLock::new(persona),
        }
    }

    /// Create an orchestrator from loaded configuration.
    pub fn from_config(collaborators: Collaborators, config: &AppConfig) -> Result<Self, QueryError> {
        let registry = PersonaRegistry::builtin().with_overrides(&config.personas)?;
        let persona = PersonaId::parse(&config.default_persona)?;
        Ok(Self::new(collaborators, registry)
            .with_answer_params(ModelParams::from(&config.answering))
            .with_classifier_model(ModelParams::from(&config.classifier))
            .with_vision_model(ModelParams::from(&config.vision))
            .with_timeouts(Timeouts::from(&config.timeouts))
            .with_history_capacity(config.history.max_entries)
            .with_persona(persona))
    }

    /// Replace the history ring with an empty one of `capacity`.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = Arc::new(Mutex::new(HistoryRing::new(capacity)));
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_answer_params(mut self, params: ModelParams) -> Self {
        self.answer = params;
        self
    }

    pub fn with_classifier_model(mut self, params: ModelParams) -> Self {
        self.classifier = params;
        self
    }

    pub fn with_vision_model(mut self, params: ModelParams) -> Self {
        self.vision = params;
        self
    }

    pub fn with_persona(mut self, persona: PersonaId) -> Self {
        self.active_persona = RwLock::new(persona);
        self
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// Answer a query with a single blocking call. History is replayed into
    /// the prompt.
    pub async fn ask(&self, query: &str, persona: Option<&str>) -> QueryResponse {
        let query = query.trim();
        let mut tracker = QueryTracker::new(Uuid::new_v4().to_string());
        info!(request_id = %tracker.request_id(), persona = ?persona, "Handling query");

        let routing = match self.route(&mut tracker, query, persona).await {
            Ok(routing) => routing,
            Err(e) => return QueryResponse::Error(Self::fail(&mut tracker, e)),
        };

        let (persona, category) = match routing {
            Routing::Reply {
                content,
                route,
                persona,
                category,
            } => {
                tracker.advance(QueryState::Done);
                let metadata = CompletionMetadata::new(tracker.request_id(), route, persona)
                    .with_category(category);
                return QueryResponse::Success(QueryAnswer {
                    query: query.to_string(),
                    response: content,
                    metadata,
                    conversation_history: self.history().await,
                });
            }
            Routing::Answer { persona, category } => (persona, category),
        };

        let request = self.blocking_request(&persona, query).await;
        let provider = self.collaborators.answering.clone();
        let limit = self.timeouts.answer;
        let call = async move { within(limit, "answer", provider.complete(request)).await };

        let metadata = self.answer_metadata(tracker.request_id(), persona.id, category);
        let mut chunks = ResponseAggregator::new(
            self.history.clone(),
            AggregationContext {
                query: query.to_string(),
                metadata,
                tracker,
            },
        )
        .from_call(call);

        match chunks.next().await {
            Some(StreamChunk::Complete { content, metadata }) => {
                QueryResponse::Success(QueryAnswer {
                    query: query.to_string(),
                    response: content.trim().to_string(),
                    metadata,
                    conversation_history: self.history().await,
                })
            }
            Some(StreamChunk::Failed { error }) => QueryResponse::Error(error),
            _ => QueryResponse::Error(ErrorRecord::from(ProviderError::StreamInterrupted(
                "no terminal chunk".into(),
            ))),
        }
    }

    /// Answer a query as a stream of chunks. History is not replayed into
    /// the prompt; the completed exchange is still appended.
    pub async fn ask_stream(&self, query: &str, persona: Option<&str>) -> ChunkStream {
        let query = query.trim();
        let mut tracker = QueryTracker::new(Uuid::new_v4().to_string());
        info!(request_id = %tracker.request_id(), persona = ?persona, "Handling streamed query");

        let routing = match self.route(&mut tracker, query, persona).await {
            Ok(routing) => routing,
            Err(e) => return single(StreamChunk::Failed {
                error: Self::fail(&mut tracker, e),
            }),
        };

        let (persona, category) = match routing {
            Routing::Reply {
                content,
                route,
                persona,
                category,
            } => {
                tracker.advance(QueryState::Done);
                let metadata = CompletionMetadata::new(tracker.request_id(), route, persona)
                    .with_category(category);
                return single(StreamChunk::Complete { content, metadata });
            }
            Routing::Answer { persona, category } => (persona, category),
        };

        let mut request =
            ProviderRequest::single_turn(&self.answer.model, &persona.system_prompt, query)
                .with_temperature(self.answer.temperature)
                .streaming();
        request.max_tokens = self.answer.max_tokens;

        let opened = within(
            self.timeouts.answer,
            "answer stream",
            self.collaborators.answering.stream(request),
        )
        .await;

        match opened {
            Ok(frames) => {
                let metadata = self.answer_metadata(tracker.request_id(), persona.id, category);
                ResponseAggregator::new(
                    self.history.clone(),
                    AggregationContext {
                        query: query.to_string(),
                        metadata,
                        tracker,
                    },
                )
                .with_frame_timeout(self.timeouts.frame)
                .from_frames(frames)
            }
            Err(e) => single(StreamChunk::Failed {
                error: Self::fail(&mut tracker, e.into()),
            }),
        }
    }

    /// Send an image to the vision backend and parse its assessment.
    pub async fn analyze_image(&self, image: Vec<u8>, mime_type: &str) -> ImageAnalysisResponse {
        let request_id = Uuid::new_v4().to_string();
        if image.is_empty() {
            warn!(request_id = %request_id, "Rejected empty image");
            return ImageAnalysisResponse::Error(QueryError::EmptyImage.into());
        }

        info!(request_id = %request_id, bytes = image.len(), mime = %mime_type, "Analyzing image");

        let request = VisionRequest {
            model: self.vision.model.clone(),
            prompt: FOOD_ANALYSIS_PROMPT.into(),
            image,
            mime_type: mime_type.into(),
            max_tokens: self.vision.max_tokens,
        };

        match within(
            self.timeouts.vision,
            "vision",
            self.collaborators.vision.analyze_image(request),
        )
        .await
        {
            Ok(text) => {
                let analysis = parser::parse(&text);
                if !analysis.is_complete() {
                    warn!(
                        request_id = %request_id,
                        kind = ?ErrorKind::ParseIncomplete,
                        diagnostics = ?analysis.diagnostics,
                        "Vision answer only partially parsed"
                    );
                }
                ImageAnalysisResponse::Success(analysis)
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Image analysis failed");
                ImageAnalysisResponse::Error(e.into())
            }
        }
    }

    /// Extract profile fields from free text.
    pub async fn extract_profile(&self, kind: ProfileKind, text: &str) -> Result<Profile, QueryError> {
        ProfileExtractor::new(
            self.collaborators.classification.clone(),
            &self.classifier.model,
        )
        .with_timeout(self.timeouts.classify)
        .extract(kind, text)
        .await
    }

    /// Snapshot of the session history, oldest first.
    pub async fn history(&self) -> Vec<Exchange> {
        self.history.lock().await.list()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
        info!("History cleared");
    }

    pub async fn active_persona(&self) -> PersonaId {
        *self.active_persona.read().await
    }

    /// Switch the session's default persona.
    pub async fn set_persona(&self, id: &str) -> Result<PersonaId, QueryError> {
        let persona = PersonaId::parse(id)?;
        *self.active_persona.write().await = persona;
        info!(persona = %persona, "Active persona changed");
        Ok(persona)
    }

    fn classifier(&self) -> Classifier {
        Classifier::new(
            self.collaborators.classification.clone(),
            &self.classifier.model,
        )
        .with_max_tokens(self.classifier.max_tokens.unwrap_or(10))
        .with_timeout(self.timeouts.classify)
    }

    async fn route(
        &self,
        tracker: &mut QueryTracker,
        query: &str,
        persona: Option<&str>,
    ) -> Result<Routing, QueryError> {
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let persona = match persona {
            Some(id) => self.registry.resolve(id)?.clone(),
            None => self.registry.get(self.active_persona().await).clone(),
        };

        let classification = self.classifier().classify(query).await?;
        tracker.advance(QueryState::Classified);

        let category = match classification {
            QueryClassification::Greeting => {
                tracker.advance(QueryState::Greeting);
                return Ok(Routing::Reply {
                    content: greeting_reply(greeting_kind(query), &persona),
                    route: Route::Greeting,
                    persona: persona.id,
                    category: None,
                });
            }
            QueryClassification::Unrelated => {
                tracker.advance(QueryState::Unrelated);
                return Ok(Routing::Reply {
                    content: refusal_message(&persona),
                    route: Route::Unrelated,
                    persona: persona.id,
                    category: None,
                });
            }
            QueryClassification::DomainRelevant(category) => category,
        };

        let in_scope = match &persona.validation {
            ScopeValidation::None => true,
            ScopeValidation::Keywords { keywords } => {
                tracker.advance(QueryState::DomainValidating);
                matches_keywords(keywords, query)
            }
            ScopeValidation::Model { instruction } => {
                tracker.advance(QueryState::DomainValidating);
                self.classifier().check_relevance(instruction, query).await?
            }
        };

        if !in_scope {
            info!(
                request_id = %tracker.request_id(),
                persona = %persona.id,
                "Query outside persona scope"
            );
            return Ok(Routing::Reply {
                content: refusal_message(&persona),
                route: Route::OutOfScope,
                persona: persona.id,
                category: Some(category),
            });
        }

        tracker.advance(QueryState::Answering);
        Ok(Routing::Answer { persona, category })
    }

    /// System prompt, replayed history, then the query with the persona's
    /// suffix.
    async fn blocking_request(&self, persona: &PersonaConfig, query: &str) -> ProviderRequest {
        let mut messages = vec![Message::system(&persona.system_prompt)];
        {
            let history = self.history.lock().await;
            for exchange in history.iter() {
                messages.push(Message::user(exchange.query()));
                messages.push(Message::assistant(exchange.response()));
            }
        }
        let user_text = match &persona.query_suffix {
            Some(suffix) => format!("{query}{suffix}"),
            None => query.to_string(),
        };
        messages.push(Message::user(user_text));

        ProviderRequest {
            model: self.answer.model.clone(),
            messages,
            temperature: self.answer.temperature,
            max_tokens: self.answer.max_tokens,
            stream: false,
            stop: Vec::new(),
        }
    }

    fn answer_metadata(
        &self,
        request_id: &str,
        persona: PersonaId,
        category: QueryCategory,
    ) -> CompletionMetadata {
        let mut metadata = CompletionMetadata::new(request_id, Route::Answered, persona)
            .with_category(Some(category))
            .with_disclaimer(DISCLAIMER);
        metadata.model = Some(self.answer.model.clone());
        metadata
    }

    fn fail(tracker: &mut QueryTracker, error: QueryError) -> ErrorRecord {
        warn!(
            request_id = %tracker.request_id(),
            kind = ?error.kind(),
            error = %error,
            "Query failed"
        );
        tracker.advance(QueryState::Failed);
        ErrorRecord::from(error)
    }
}

fn single(chunk: StreamChunk) -> ChunkStream {
    Box::pin(stream::iter([chunk]))
}

fn greeting_reply(kind: Option<GreetingKind>, persona: &PersonaConfig) -> String {
    match kind {
        Some(GreetingKind::Farewell) => {
            "Goodbye! Take care, and reach out to your healthcare provider with any concerns."
                .into()
        }
        Some(GreetingKind::Thanks) => format!(
            "You're welcome! Feel free to ask anything else about {}.",
            persona.scope
        ),
        Some(GreetingKind::Hello) | None => format!(
            "Hello! I'm here to help with questions about {}. What would you like to know?",
            persona.scope
        ),
    }
}

//! Orchestrator - end-to-end answer assembly
//!
//! Each request walks a small state machine:
//!
//! ```text
//! RECEIVED -> RATE_CHECKED -> CACHE_HIT -> DONE
//!                          -> CACHE_MISS -> RETRIEVING -> GENERATING -> CACHING -> DONE
//! ```
//!
//! Any stage may fail with a typed error. The rate check runs before anything
//! that costs money, so a throttled request never reaches retrieval or
//! generation. Provider calls are retried with bounded exponential backoff and
//! raced against the caller's cancellation token; a cancelled request is never
//! written to the cache.

pub mod cancel;
pub mod types;

pub use cancel::{CancelHandle, Cancellation};
pub use types::{CompanionRequest, CompanionResponse, Grounding, Reply, ReplyBody, Stage};

use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{CacheKey, CacheScope, CachedAnswer, ResponseCache};
use crate::config::Config;
use crate::core::{CompletionProvider, GenerationOptions, Source};
use crate::error::{Error, Result};
use crate::ratelimit::{Category, RateLimitStatus, RateLimiter};
use crate::retrieval::{GroundingContext, ProcessedQuery, RetrievalEngine, RetrievalOutcome};

/// Orchestration policy
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Whether cached answers are shared between callers
    pub cache_scope: CacheScope,
    /// TTL for written answers; the cache default when `None`
    pub cache_ttl: Option<Duration>,
    /// Longest grounding context handed to the completion provider
    pub max_context_chars: usize,
    /// Retries for retryable provider failures
    pub max_retries: u32,
    /// First backoff delay
    pub retry_initial_interval: Duration,
    /// Longest backoff delay
    pub retry_max_interval: Duration,
    /// Passed to the completion provider
    pub generation: GenerationOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        OrchestratorOptions {
            cache_scope: CacheScope::Global,
            cache_ttl: None,
            max_context_chars: 4000,
            max_retries: 2,
            retry_initial_interval: Duration::from_millis(250),
            retry_max_interval: Duration::from_secs(4),
            generation: GenerationOptions::default(),
        }
    }
}

impl OrchestratorOptions {
    /// Options derived from the application config
    pub fn from_config(config: &Config) -> Self {
        OrchestratorOptions {
            cache_scope: config.cache.scope,
            cache_ttl: Some(config.cache.ttl),
            max_context_chars: config.retrieval.max_context_chars,
            max_retries: config.completion.max_retries,
            generation: GenerationOptions {
                model: Some(config.completion.model.clone()),
                max_tokens: Some(config.completion.max_tokens),
                temperature: Some(config.completion.temperature),
            },
            ..Self::default()
        }
    }
}

enum RequestState {
    Received,
    RateChecked {
        quota: RateLimitStatus,
        query: ProcessedQuery,
        k: usize,
    },
    CacheHit {
        quota: RateLimitStatus,
        answer: CachedAnswer,
    },
    CacheMiss {
        quota: RateLimitStatus,
        query: ProcessedQuery,
        k: usize,
        key: CacheKey,
    },
    Retrieving {
        quota: RateLimitStatus,
        query: ProcessedQuery,
        k: usize,
        key: CacheKey,
    },
    Generating {
        quota: RateLimitStatus,
        key: CacheKey,
        outcome: RetrievalOutcome,
    },
    Caching {
        quota: RateLimitStatus,
        key: CacheKey,
        answer: CachedAnswer,
    },
    Done {
        quota: RateLimitStatus,
        answer: CachedAnswer,
        cached: bool,
    },
}

impl RequestState {
    fn stage(&self) -> Stage {
        match self {
            RequestState::Received => Stage::Received,
            RequestState::RateChecked { .. } => Stage::RateChecked,
            RequestState::CacheHit { .. } => Stage::CacheHit,
            RequestState::CacheMiss { .. } => Stage::CacheMiss,
            RequestState::Retrieving { .. } => Stage::Retrieving,
            RequestState::Generating { .. } => Stage::Generating,
            RequestState::Caching { .. } => Stage::Caching,
            RequestState::Done { .. } => Stage::Done,
        }
    }
}

/// Sequences rate check, cache, retrieval and generation
pub struct Orchestrator {
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    retrieval: Arc<RetrievalEngine>,
    completion: Arc<dyn CompletionProvider>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Create a new orchestrator over explicitly constructed services
    pub fn new(
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        retrieval: Arc<RetrievalEngine>,
        completion: Arc<dyn CompletionProvider>,
        options: OrchestratorOptions,
    ) -> Self {
        Orchestrator {
            limiter,
            cache,
            retrieval,
            completion,
            options,
        }
    }

    /// The rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Answer a companion question
    pub async fn answer(&self, request: CompanionRequest) -> Result<CompanionResponse> {
        self.answer_with_cancel(request, &Cancellation::never()).await
    }

    /// Answer a companion question, aborting when `cancel` fires
    pub async fn answer_with_cancel(
        &self,
        request: CompanionRequest,
        cancel: &Cancellation,
    ) -> Result<CompanionResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "companion",
            %request_id,
            caller = %request.caller_id,
            category = %Category::CompanionQuery
        );
        self.run(request_id, &request, cancel).instrument(span).await
    }

    /// Answer and wrap the outcome for the caller, quota included either way
    pub async fn respond(&self, request: CompanionRequest) -> Reply {
        let caller = request.caller_id.clone();
        let result = self.answer(request).await;
        self.reply(result, &caller, Category::CompanionQuery)
    }

    /// [`ground`](Self::ground) wrapped like [`respond`](Self::respond)
    pub async fn respond_grounding(
        &self,
        request: CompanionRequest,
        category: Category,
    ) -> Reply<Grounding> {
        let caller = request.caller_id.clone();
        let result = self.ground(request, category).await;
        self.reply(result, &caller, category)
    }

    fn reply<T>(&self, result: Result<T>, caller: &str, category: Category) -> Reply<T> {
        let body = match result {
            Ok(response) => ReplyBody::Ok { response },
            Err(err) => {
                if !err.is_client_error() {
                    warn!("{} request failed: {}", category, err);
                }
                ReplyBody::Error {
                    error: err.envelope(),
                }
            }
        };

        Reply {
            body,
            quota: self.limiter.status(caller, category),
        }
    }

    /// Retrieval-only path for moderation and detection grounding.
    ///
    /// Consumes quota in `category`; never generates and never caches.
    pub async fn ground(&self, request: CompanionRequest, category: Category) -> Result<Grounding> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "grounding",
            %request_id,
            caller = %request.caller_id,
            %category
        );

        self.run_grounding(request_id, &request, category)
            .instrument(span)
            .await
    }

    async fn run_grounding(
        &self,
        request_id: Uuid,
        request: &CompanionRequest,
        category: Category,
    ) -> Result<Grounding> {
        let query = self.retrieval.prepare(&request.query)?;
        let k = self.retrieval.resolve_k(request.k)?;
        let quota = self.limiter.check(&request.caller_id, category)?;

        let outcome = self
            .retrieve(&query, request, k, &Cancellation::never())
            .await?;
        let context = GroundingContext::build(
            &outcome.query.normalized,
            &outcome.citations,
            self.options.max_context_chars,
        );
        debug!("Grounded with {} sources", context.source_count());

        Ok(Grounding {
            request_id,
            sources: context.citations.iter().map(Source::from).collect(),
            context,
            quota,
        })
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &CompanionRequest,
        cancel: &Cancellation,
    ) -> Result<CompanionResponse> {
        let mut stages = Vec::new();
        let mut state = RequestState::Received;

        loop {
            let stage = state.stage();
            stages.push(stage);
            debug!("Stage {}", stage);

            state = match self.step(state, request, cancel).await {
                Ok(RequestState::Done {
                    quota,
                    answer,
                    cached,
                }) => {
                    stages.push(Stage::Done);
                    info!(
                        cached,
                        citations = answer.citations.len(),
                        "Answered companion query"
                    );
                    return Ok(CompanionResponse {
                        request_id,
                        sources: answer.citations.iter().map(Source::from).collect(),
                        text: answer.answer,
                        citations: answer.citations,
                        cached,
                        quota,
                        stages,
                    });
                }
                Ok(next) => next,
                Err(err) => {
                    debug!("Stage {} -> {}: {}", stage, Stage::Failed, err);
                    return Err(err);
                }
            };
        }
    }

    async fn step(
        &self,
        state: RequestState,
        request: &CompanionRequest,
        cancel: &Cancellation,
    ) -> Result<RequestState> {
        match state {
            RequestState::Received => {
                // Malformed requests are rejected before they cost quota
                let query = self.retrieval.prepare(&request.query)?;
                let k = self.retrieval.resolve_k(request.k)?;
                let quota = self.limiter.check(&request.caller_id, Category::CompanionQuery)?;
                Ok(RequestState::RateChecked { quota, query, k })
            }
            RequestState::RateChecked { quota, query, k } => {
                let key = self.cache_key(&query, request, k);
                match self.cache.get(&key).await {
                    Some(answer) => Ok(RequestState::CacheHit { quota, answer }),
                    None => Ok(RequestState::CacheMiss {
                        quota,
                        query,
                        k,
                        key,
                    }),
                }
            }
            RequestState::CacheHit { quota, answer } => Ok(RequestState::Done {
                quota,
                answer,
                cached: true,
            }),
            RequestState::CacheMiss {
                quota,
                query,
                k,
                key,
            } => Ok(RequestState::Retrieving {
                quota,
                query,
                k,
                key,
            }),
            RequestState::Retrieving {
                quota,
                query,
                k,
                key,
            } => {
                let outcome = self.retrieve(&query, request, k, cancel).await?;
                Ok(RequestState::Generating {
                    quota,
                    key,
                    outcome,
                })
            }
            RequestState::Generating {
                quota,
                key,
                outcome,
            } => {
                let grounding = GroundingContext::build(
                    &outcome.query.normalized,
                    &outcome.citations,
                    self.options.max_context_chars,
                );
                let prompt = request.query.trim();
                let text = self
                    .guarded(
                        cancel,
                        self.with_retry(|| {
                            self.completion
                                .complete(prompt, &grounding, &self.options.generation)
                        }),
                    )
                    .await?;

                Ok(RequestState::Caching {
                    quota,
                    key,
                    answer: CachedAnswer {
                        answer: text,
                        citations: outcome.citations,
                    },
                })
            }
            RequestState::Caching { quota, key, answer } => {
                if cancel.is_cancelled() {
                    // Nobody is waiting for this answer
                    return Err(Error::Cancelled);
                }
                self.cache
                    .put(key, answer.clone(), self.options.cache_ttl)
                    .await;
                Ok(RequestState::Done {
                    quota,
                    answer,
                    cached: false,
                })
            }
            RequestState::Done { .. } => Err(Error::Internal(
                "orchestrator stepped past completion".to_string(),
            )),
        }
    }

    async fn retrieve(
        &self,
        query: &ProcessedQuery,
        request: &CompanionRequest,
        k: usize,
        cancel: &Cancellation,
    ) -> Result<RetrievalOutcome> {
        let engine = &self.retrieval;
        let scope = &request.scope;
        self.guarded(
            cancel,
            self.with_retry(|| engine.retrieve_processed(query.clone(), scope, k)),
        )
        .await
    }

    fn cache_key(&self, query: &ProcessedQuery, request: &CompanionRequest, k: usize) -> CacheKey {
        let caller = match self.options.cache_scope {
            CacheScope::Global => None,
            CacheScope::PerCaller => Some(request.caller_id.as_str()),
        };
        CacheKey::new(&query.normalized, &request.scope, k, caller)
    }

    /// Race `fut` against cancellation
    async fn guarded<T>(
        &self,
        cancel: &Cancellation,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }

    /// Run `op`, retrying retryable failures with exponential backoff
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.options.retry_initial_interval)
            .with_max_interval(self.options.retry_max_interval)
            .with_max_elapsed_time(None)
            .build();
        let attempts = AtomicU32::new(0);
        let max_retries = self.options.max_retries;

        backoff::future::retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_retryable() && attempt < max_retries => {
                        warn!("Provider call failed (attempt {}), retrying: {}", attempt + 1, err);
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }
}

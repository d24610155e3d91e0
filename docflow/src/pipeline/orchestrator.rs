//! The document ingestion pipeline.
//!
//! ```text
//! Received -> Extracting -> Parsing -> Validating -> Storing -> Completed
//!                 \            \           \            \
//!                  `------------`-----------`------------`---> Failed
//! ```
//!
//! | Stage      | Collaborator    | Guards                         |
//! |------------|-----------------|--------------------------------|
//! | Extracting | `TextExtractor` | none, failures are permanent   |
//! | Parsing    | `AiParser`      | timeout + retry + breaker      |
//! | Validating | `RecordSchema`  | none                           |
//! | Storing    | `RecordStore`   | retry + breaker                |

use super::ports::{AiParser, RecordStore, TextExtractor};
use super::validation::RecordSchema;
use crate::core::{
    CompletedJob, FailedJob, JobFailure, JobMetadata, JobOutcome, JobRequest, ProcessedJob,
    ProcessingJob, ProcessingStage, RecordId, StructuredFields, StructuredRecord,
};
use crate::errors::{Classify, ConfigError, IngestError};
use crate::events::{noop_sink, EventSink, PipelineEvent};
use crate::observability::SpanTimer;
use crate::resilience::{
    BreakerRegistry, CircuitBreaker, GuardedCall, RetryPolicy, TimeoutGuard,
};
use crate::settings::{IngestConfig, ResilienceConfig};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

/// Breaker name for the AI parsing service.
pub const AI_SERVICE: &str = "ai_service";
/// Breaker name for the storage backend.
pub const STORAGE: &str = "storage";

/// Why a job stopped, before it is written onto the job.
struct StageFailure {
    error: IngestError,
    stage: ProcessingStage,
    attempts: u32,
    max_attempts: u32,
    partial_fields: Option<StructuredFields>,
}

impl StageFailure {
    fn unguarded(error: IngestError, stage: ProcessingStage) -> Self {
        Self {
            error,
            stage,
            attempts: 1,
            max_attempts: 1,
            partial_fields: None,
        }
    }
}

/// Runs jobs through the ingestion stages.
///
/// One orchestrator serves many concurrent jobs. Collaborators and breakers
/// are shared; each job's state is local to its `process` call.
pub struct ProcessingOrchestrator {
    extractor: Arc<dyn TextExtractor>,
    parser: Arc<dyn AiParser>,
    store: Arc<dyn RecordStore>,
    ai_call: GuardedCall,
    storage_call: GuardedCall,
    schema: RecordSchema,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ProcessingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingOrchestrator")
            .field("ai_call", &self.ai_call)
            .field("storage_call", &self.storage_call)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ProcessingOrchestrator {
    /// Starts building an orchestrator around its three collaborators.
    pub fn builder(
        extractor: Arc<dyn TextExtractor>,
        parser: Arc<dyn AiParser>,
        store: Arc<dyn RecordStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            extractor,
            parser,
            store,
            config: IngestConfig::default(),
            schema: RecordSchema::default(),
            events: noop_sink(),
            ai_breaker: None,
            storage_breaker: None,
            registry: None,
        }
    }

    /// Returns the breaker guarding the AI service.
    #[must_use]
    pub fn ai_breaker(&self) -> &Arc<CircuitBreaker> {
        self.ai_call.breaker()
    }

    /// Returns the breaker guarding storage.
    #[must_use]
    pub fn storage_breaker(&self) -> &Arc<CircuitBreaker> {
        self.storage_call.breaker()
    }

    /// Submits a job and returns only the caller-facing outcome.
    pub async fn submit(&self, request: JobRequest) -> JobOutcome {
        self.process(request).await.outcome
    }

    /// Submits several jobs at once and returns their outcomes in request order.
    ///
    /// Jobs run concurrently on the calling task; they share breakers exactly
    /// as separately submitted jobs do.
    pub async fn submit_all(&self, requests: Vec<JobRequest>) -> Vec<JobOutcome> {
        join_all(requests.into_iter().map(|request| self.submit(request))).await
    }

    /// Runs a job to a terminal stage.
    pub async fn process(&self, request: JobRequest) -> ProcessedJob {
        let mut job = ProcessingJob::new(request);
        let span = info_span!(
            "job",
            job_id = %job.id(),
            owner_id = %job.owner_id(),
            filename = %job.filename()
        );

        async move {
            let timer = SpanTimer::start("job");
            info!(
                content_type = %job.content_type(),
                size_bytes = job.raw_bytes().len(),
                "Job received"
            );

            let outcome = match self.run_stages(&mut job, &timer).await {
                Ok(completed) => self.complete(&mut job, completed, timer),
                Err(failure) => self.fail(&mut job, failure),
            };
            ProcessedJob { job, outcome }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        job: &mut ProcessingJob,
        timer: &SpanTimer,
    ) -> Result<CompletedJob, StageFailure> {
        let text = self.extract(job).await?;
        let fields = self.parse(job, &text).await?;
        self.validate(job, &fields)?;
        let record_id = self.persist(job, &fields).await?;

        Ok(CompletedJob {
            job_id: job.id(),
            record_id,
            metadata: JobMetadata {
                filename: job.filename().to_string(),
                content_type: job.content_type().to_string(),
                size_bytes: job.raw_bytes().len(),
                digest: job.digest().to_string(),
                text_length: text.chars().count(),
                attempts: job.all_attempts().clone(),
                duration_ms: timer.elapsed_ms(),
            },
            structured_fields: fields,
        })
    }

    async fn extract(&self, job: &mut ProcessingJob) -> Result<String, StageFailure> {
        let stage = ProcessingStage::Extracting;
        self.enter(job, stage)?;

        let result = self
            .extractor
            .extract(job.raw_bytes(), job.content_type())
            .await;
        self.record_attempts(job, stage, 1)?;

        let text = result.map_err(|e| StageFailure::unguarded(e, stage))?;
        debug!(text_length = text.len(), "Text extracted");
        Ok(text)
    }

    async fn parse(
        &self,
        job: &mut ProcessingJob,
        text: &str,
    ) -> Result<StructuredFields, StageFailure> {
        let stage = ProcessingStage::Parsing;
        self.enter(job, stage)?;

        let report = self.ai_call.run(|| self.parser.parse(text)).await;
        self.record_attempts(job, stage, report.attempts)?;

        report.result.map_err(|error| StageFailure {
            error,
            stage,
            attempts: report.attempts,
            max_attempts: self.ai_call.max_attempts(),
            partial_fields: None,
        })
    }

    fn validate(
        &self,
        job: &mut ProcessingJob,
        fields: &StructuredFields,
    ) -> Result<(), StageFailure> {
        let stage = ProcessingStage::Validating;
        self.enter(job, stage)?;
        self.schema
            .validate(fields)
            .map_err(|e| StageFailure::unguarded(e.into(), stage))
    }

    async fn persist(
        &self,
        job: &mut ProcessingJob,
        fields: &StructuredFields,
    ) -> Result<RecordId, StageFailure> {
        let stage = ProcessingStage::Storing;
        self.enter(job, stage)?;

        let record = StructuredRecord {
            job_id: job.id(),
            owner_id: job.owner_id().to_string(),
            filename: job.filename().to_string(),
            content_type: job.content_type().to_string(),
            digest: job.digest().to_string(),
            fields: fields.clone(),
        };
        let report = self.storage_call.run(|| self.store.persist(&record)).await;
        self.record_attempts(job, stage, report.attempts)?;

        report.result.map_err(|error| StageFailure {
            error,
            stage,
            attempts: report.attempts,
            max_attempts: self.storage_call.max_attempts(),
            partial_fields: Some(record.fields),
        })
    }

    fn enter(&self, job: &mut ProcessingJob, stage: ProcessingStage) -> Result<(), StageFailure> {
        if let Err(e) = job.advance(stage) {
            let current = job.stage();
            return Err(StageFailure::unguarded(
                IngestError::permanent(e.to_string()),
                current,
            ));
        }
        info!(stage = %stage, "Stage entered");
        self.events.emit(&PipelineEvent::StageEntered {
            job_id: job.id(),
            stage,
        });
        Ok(())
    }

    fn record_attempts(
        &self,
        job: &mut ProcessingJob,
        stage: ProcessingStage,
        attempts: u32,
    ) -> Result<(), StageFailure> {
        job.record_attempts(stage, attempts)
            .map_err(|e| StageFailure::unguarded(IngestError::permanent(e.to_string()), stage))
    }

    fn complete(
        &self,
        job: &mut ProcessingJob,
        mut completed: CompletedJob,
        timer: SpanTimer,
    ) -> JobOutcome {
        if let Err(e) = job.advance(ProcessingStage::Completed) {
            let failure = StageFailure::unguarded(IngestError::permanent(e.to_string()), job.stage());
            return self.fail(job, failure);
        }
        completed.metadata.duration_ms = timer.finish();

        info!(
            record_id = %completed.record_id,
            duration_ms = completed.metadata.duration_ms,
            "Job completed"
        );
        self.events.emit(&PipelineEvent::JobCompleted {
            job_id: job.id(),
            record_id: completed.record_id.to_string(),
            duration_ms: completed.metadata.duration_ms,
        });
        JobOutcome::Completed(completed)
    }

    fn fail(&self, job: &mut ProcessingJob, failure: StageFailure) -> JobOutcome {
        let record = JobFailure::from_error(
            &failure.error,
            failure.stage,
            failure.attempts,
            failure.max_attempts,
        );

        error!(
            stage = %record.stage,
            kind = %record.kind,
            attempts = record.attempts,
            retries_exhausted = record.retries_exhausted,
            error = %failure.error,
            "Job failed"
        );
        self.events.emit(&PipelineEvent::JobFailed {
            job_id: job.id(),
            stage: record.stage,
            kind: failure.error.kind(),
        });

        if let Err(e) = job.fail(record.clone()) {
            error!(error = %e, "Could not mark job as failed");
        }
        JobOutcome::Failed(FailedJob {
            job_id: job.id(),
            failure: record,
            partial_fields: failure.partial_fields,
        })
    }
}

/// Builder for [`ProcessingOrchestrator`].
///
/// Breakers are resolved in this order: an explicitly supplied breaker, a
/// breaker from the attached registry, or a fresh breaker built from the
/// configuration.
pub struct OrchestratorBuilder {
    extractor: Arc<dyn TextExtractor>,
    parser: Arc<dyn AiParser>,
    store: Arc<dyn RecordStore>,
    config: IngestConfig,
    schema: RecordSchema,
    events: Arc<dyn EventSink>,
    ai_breaker: Option<Arc<CircuitBreaker>>,
    storage_breaker: Option<Arc<CircuitBreaker>>,
    registry: Option<Arc<BreakerRegistry>>,
}

impl OrchestratorBuilder {
    /// Sets the resilience configuration.
    #[must_use]
    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the record schema used by the validation stage.
    #[must_use]
    pub fn schema(mut self, schema: RecordSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Sets the event sink for job, retry and breaker events.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Shares an existing breaker for the AI service.
    #[must_use]
    pub fn ai_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.ai_breaker = Some(breaker);
        self
    }

    /// Shares an existing breaker for storage.
    #[must_use]
    pub fn storage_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.storage_breaker = Some(breaker);
        self
    }

    /// Resolves breakers by dependency name from `registry`.
    ///
    /// Breakers taken from the registry report transitions to the sink set
    /// with [`BreakerRegistry::with_event_sink`], not to [`Self::event_sink`].
    /// Job and retry events still go to the builder's sink.
    #[must_use]
    pub fn breakers(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the configuration and builds the orchestrator.
    pub fn build(self) -> Result<ProcessingOrchestrator, ConfigError> {
        self.config.validate()?;

        let ai_breaker =
            self.resolve_breaker(AI_SERVICE, &self.config.ai_service, self.ai_breaker.clone())?;
        let storage_breaker =
            self.resolve_breaker(STORAGE, &self.config.storage, self.storage_breaker.clone())?;

        let ai_call = GuardedCall::new(
            AI_SERVICE,
            Some(TimeoutGuard::new("ai_service.parse", self.config.ai_service.timeout()?)?),
            RetryPolicy::new("ai_service.parse", self.config.ai_service.retry_config()?)?
                .with_event_sink(self.events.clone()),
            ai_breaker,
        );
        // Storage writes are not cancelled mid-flight.
        let storage_call = GuardedCall::new(
            STORAGE,
            None,
            RetryPolicy::new("storage.persist", self.config.storage.retry_config()?)?
                .with_event_sink(self.events.clone()),
            storage_breaker,
        );

        info!(
            ai_max_attempts = ai_call.max_attempts(),
            storage_max_attempts = storage_call.max_attempts(),
            schema_rules = self.schema.rules().count(),
            "Processing orchestrator built"
        );

        Ok(ProcessingOrchestrator {
            extractor: self.extractor,
            parser: self.parser,
            store: self.store,
            ai_call,
            storage_call,
            schema: self.schema,
            events: self.events,
        })
    }

    fn resolve_breaker(
        &self,
        name: &str,
        config: &ResilienceConfig,
        explicit: Option<Arc<CircuitBreaker>>,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(breaker) = explicit {
            return Ok(breaker);
        }
        let breaker_config = config.breaker_config()?;
        match &self.registry {
            Some(registry) => registry.get_or_create(name, breaker_config),
            None => Ok(Arc::new(
                CircuitBreaker::new(name, breaker_config)?.with_event_sink(self.events.clone()),
            )),
        }
    }
}

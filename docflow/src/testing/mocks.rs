//! Scripted collaborators for exercising the pipeline.
//!
//! Each collaborator counts its calls and plays back a queue of scripted
//! failures before falling back to its default behaviour.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{RecordId, StructuredFields, StructuredRecord};
use crate::errors::IngestError;
use crate::pipeline::{AiParser, RecordStore, TextExtractor};

/// An extractor that returns fixed text or a fixed error.
#[derive(Debug)]
pub struct ScriptedExtractor {
    result: Result<String, IngestError>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    /// Always extracts `text`.
    pub fn returning(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: IngestError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for ScriptedExtractor {
    async fn extract(&self, _bytes: &[u8], _content_type: &str) -> Result<String, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// A parser that fails through a script, then returns fixed fields.
#[derive(Debug)]
pub struct ScriptedParser {
    fields: StructuredFields,
    script: Mutex<VecDeque<IngestError>>,
    permanent_error: Option<IngestError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl ScriptedParser {
    /// Returns `fields` on every call.
    #[must_use]
    pub fn returning(fields: StructuredFields) -> Self {
        Self {
            fields,
            script: Mutex::new(VecDeque::new()),
            permanent_error: None,
            delay: None,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Fails with `error` on every call.
    #[must_use]
    pub fn always_failing(error: IngestError) -> Self {
        let mut parser = Self::returning(StructuredFields::new());
        parser.permanent_error = Some(error);
        parser
    }

    /// Fails the next `times` calls with `error`.
    #[must_use]
    pub fn fail_times(self, times: usize, error: IngestError) -> Self {
        self.script
            .lock()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    /// Sleeps for `delay` on every call before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the texts received, in call order.
    #[must_use]
    pub fn received_texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl AiParser for ScriptedParser {
    async fn parse(&self, text: &str) -> Result<StructuredFields, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.permanent_error {
            return Err(error.clone());
        }
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(error) => Err(error),
            None => Ok(self.fields.clone()),
        }
    }
}

/// A store that fails through a script, then assigns sequential ids.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    script: Mutex<VecDeque<IngestError>>,
    permanent_error: Option<IngestError>,
    calls: AtomicUsize,
    records: Mutex<Vec<StructuredRecord>>,
}

impl ScriptedStore {
    /// Accepts every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `error` on every call.
    #[must_use]
    pub fn always_failing(error: IngestError) -> Self {
        Self {
            permanent_error: Some(error),
            ..Self::default()
        }
    }

    /// Fails the next `times` calls with `error`.
    #[must_use]
    pub fn fail_times(self, times: usize, error: IngestError) -> Self {
        self.script
            .lock()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the records persisted successfully.
    #[must_use]
    pub fn records(&self) -> Vec<StructuredRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn persist(&self, record: &StructuredRecord) -> Result<RecordId, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.permanent_error {
            return Err(error.clone());
        }
        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }
        let mut records = self.records.lock();
        records.push(record.clone());
        Ok(RecordId::new(format!("rec-{}", records.len())))
    }
}

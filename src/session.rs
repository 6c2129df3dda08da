//! One document session: the interpreter plus the host capabilities the
//! engine drives it through.

use anyhow::Context as _;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

use crate::config::InterpreterConfig;
use crate::dom::Document;
use crate::events::{DispatchOutcome, EventRecord, NativeEvent};
use crate::interpreter::{BatchError, BatchSummary, DomEdit, Interpreter};
use crate::navigation::History;
use crate::net::{FetchBridge, FetchError, FetchRequest, FetchResponse};
use crate::scheduler::{CallbackHandle, Scheduler, SchedulerConfig, Tick};

pub struct Session {
    interpreter: Interpreter,
    scheduler: Scheduler,
    history: History,
    fetch: FetchBridge,
    events_tx: UnboundedSender<EventRecord>,
}

impl Session {
    /// Must be called from inside a tokio runtime. The receiver yields every
    /// event report in dispatch order.
    pub fn new(
        document: Document,
        config: &InterpreterConfig,
    ) -> anyhow::Result<(Self, UnboundedReceiver<EventRecord>)> {
        let scheduler = Scheduler::try_current(SchedulerConfig::from(config))
            .context("failed to start scheduler")?;
        let history = History::new(&config.base_url).context("invalid base_url")?;
        let fetch = FetchBridge::new(config).context("failed to build fetch client")?;
        let (events_tx, events_rx) = unbounded_channel();
        Ok((
            Self {
                interpreter: Interpreter::new(document, config),
                scheduler,
                history,
                fetch,
                events_tx,
            },
            events_rx,
        ))
    }

    pub fn apply(&mut self, batch: &[DomEdit]) -> Result<BatchSummary, BatchError> {
        self.interpreter.apply_batch(batch)
    }

    /// Synchronous delivery: the report is queued before this returns, inside
    /// the native event's turn.
    pub fn handle_event(&self, event: &NativeEvent) -> DispatchOutcome {
        let outcome = self.interpreter.dispatch_event(event);
        if let Some(record) = &outcome.record {
            if self.events_tx.send(record.clone()).is_err() {
                tracing::debug!(target: "events", "event receiver dropped; report discarded");
            }
        }
        outcome
    }

    pub fn request_render_idle(
        &self,
        timeout: Option<Duration>,
        callback: impl FnOnce(Tick) + 'static,
    ) -> CallbackHandle {
        self.scheduler.request_idle_callback(timeout, callback)
    }

    pub fn request_render_frame(&self, callback: impl FnOnce(Tick) + 'static) -> CallbackHandle {
        self.scheduler.request_animation_frame(callback)
    }

    pub fn cancel_render(&self, handle: CallbackHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.fetch.fetch(request).await
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn document(&self) -> &Document {
        self.interpreter.document()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }
}

//! Binds a coordinator to a consumer's attach/focus/blur/detach lifecycle.
//!
//! A screen showing server data attaches once, may be focused and blurred
//! any number of times, and finally detaches. The binder turns those events
//! into coordinator calls:
//!
//! | event    | effect                                                     |
//! |----------|------------------------------------------------------------|
//! | `Attach` | `request(false)`                                           |
//! | `Focus`  | `request(false)` only if the store has no usable entry     |
//! | `Blur`   | none                                                       |
//! | `Detach` | cancel the in-flight request; ignore events until attached |
//!
//! Failures of triggered requests that a user should see are forwarded to the
//! [`ErrorSink`]; cancellation and rate-limit suppression are not.

use std::sync::Arc;

use nutrilog_core::{CoordinatorError, ErrorSink, NutrilogError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coordinator::{Dispatch, FetchCoordinator};

/// Consumer lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Attach,
    Focus,
    Blur,
    Detach,
}

/// Drives a [`FetchCoordinator`] from [`LifecycleEvent`]s.
pub struct LifecycleBinder<T> {
    coordinator: FetchCoordinator<T>,
    sink: Arc<dyn ErrorSink>,
    context: String,
    attached: bool,
    focused: bool,
    reporters: Vec<JoinHandle<()>>,
    /// Request whose outcome a reporter already waits on.
    reported_request: Option<u64>,
}

impl<T> LifecycleBinder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        coordinator: FetchCoordinator<T>,
        sink: Arc<dyn ErrorSink>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            sink,
            context: context.into(),
            attached: false,
            focused: false,
            reporters: Vec::new(),
            reported_request: None,
        }
    }

    pub fn coordinator(&self) -> &FetchCoordinator<T> {
        &self.coordinator
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn handle(&mut self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Attach => self.on_attach(),
            LifecycleEvent::Focus => self.on_focus(),
            LifecycleEvent::Blur => self.on_blur(),
            LifecycleEvent::Detach => self.on_detach(),
        }
    }

    pub fn on_attach(&mut self) {
        self.attached = true;
        self.focused = true;
        tracing::debug!(context = %self.context, key = %self.coordinator.key(), "Attached");
        self.trigger();
    }

    /// Refresh only if there is nothing fresh to show.
    pub fn on_focus(&mut self) {
        if !self.attached {
            return;
        }
        self.focused = true;

        if !self.coordinator.options().refresh_on_focus {
            return;
        }
        if self.coordinator.store().contains(self.coordinator.key()) {
            tracing::trace!(
                key = %self.coordinator.key(),
                "Focus with fresh entry, not refreshing"
            );
            return;
        }
        self.trigger();
    }

    pub fn on_blur(&mut self) {
        if self.attached {
            self.focused = false;
        }
    }

    /// Cancel in-flight work so its eventual result is discarded.
    pub fn on_detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.focused = false;
        self.coordinator.cancel();
        tracing::debug!(context = %self.context, key = %self.coordinator.key(), "Detached");
    }

    /// Handle events until the channel closes, then detach.
    pub async fn run(mut self, mut events: mpsc::Receiver<LifecycleEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        self.on_detach();
        self.flush().await;
    }

    /// Wait until every triggered request has been resolved and reported.
    pub async fn flush(&mut self) {
        for reporter in self.reporters.drain(..) {
            if let Err(e) = reporter.await {
                tracing::error!(error = %e, "Error reporter task failed");
            }
        }
    }

    fn trigger(&mut self) {
        self.reporters.retain(|r| !r.is_finished());

        match self.coordinator.begin(false) {
            Dispatch::Ready(Ok(_)) => {}
            Dispatch::Ready(Err(err)) => report(self.sink.as_ref(), err, &self.context),
            Dispatch::Pending(pending) => {
                // Joined a request that already has a reporter.
                if self.reported_request == Some(pending.token_id()) {
                    return;
                }
                self.reported_request = Some(pending.token_id());

                let sink = Arc::clone(&self.sink);
                let context = self.context.clone();
                self.reporters.push(tokio::spawn(async move {
                    if let Err(err) = pending.wait().await {
                        report(sink.as_ref(), err, &context);
                    }
                }));
            }
        }
    }
}

fn report(sink: &dyn ErrorSink, err: CoordinatorError, context: &str) {
    if err.is_user_visible() {
        sink.report(&NutrilogError::from(err), context);
    }
}

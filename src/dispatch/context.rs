use std::future::Future;
use tracing::{Instrument, Span, field, info_span};
use uuid::Uuid;

tokio::task_local! {
    static CONTEXT: RequestContext;
}

/// Request-scoped identifiers that follow a unit of work across tasks.
///
/// The context lives only for the duration of [`scope`](Self::scope); nothing outside
/// that future can observe it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub payment_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
}

impl RequestContext {
    /// A fresh context with a newly minted request id.
    pub fn new_request() -> Self {
        Self {
            request_id: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// Snapshot of the context of the running task, if it has one.
    pub fn current() -> Option<Self> {
        CONTEXT.try_with(Clone::clone).ok()
    }

    pub fn with_payment_id(mut self, payment_id: Uuid) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn span(&self) -> Span {
        let span = info_span!(
            "request",
            rid = field::Empty,
            payment_id = field::Empty,
            transaction_id = field::Empty
        );
        if let Some(request_id) = &self.request_id {
            span.record("rid", request_id.as_str());
        }
        if let Some(payment_id) = self.payment_id {
            span.record("payment_id", field::display(payment_id));
        }
        if let Some(transaction_id) = self.transaction_id {
            span.record("transaction_id", field::display(transaction_id));
        }
        span
    }

    /// Runs `future` with this context installed, and its ids on the tracing span.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        let span = self.span();
        CONTEXT.scope(self, future.instrument(span)).await
    }
}

/// Runs `future` under the current context extended by `extend`.
pub async fn with_context<F, E>(extend: E, future: F) -> F::Output
where
    F: Future,
    E: FnOnce(RequestContext) -> RequestContext,
{
    extend(RequestContext::current().unwrap_or_default())
        .scope(future)
        .await
}

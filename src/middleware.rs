//! HTTP handler instrumentation.
//!
//! [`HttpTimingService`] wraps any tower [`Service`] over `http` requests and
//! observes the latency of every request into the agent's HTTP timer. A
//! request is timed from the moment the handler is called until its response
//! body has been written out, so streamed bodies count in full. Status,
//! headers and errors are passed through as they are; the body is wrapped in
//! a [`TimedBody`] that yields the same frames.
//!
//! Handlers are usually wrapped while the server is being set up, before the
//! agent runs. The timer is therefore looked up through an [`HttpTimerCell`]
//! when a request starts, not when the handler is wrapped.
//!
//! ```
//! use std::convert::Infallible;
//! use http::{Request, Response};
//! use relic_agent::{Agent, AgentConfig};
//!
//! let agent = Agent::new(AgentConfig::new("license").with_http_stats(true));
//! let service = agent.wrap_http_handler_fn(|_req: Request<String>| async {
//!     Ok::<_, Infallible>(Response::new(String::from("hello")))
//! });
//! # drop(service);
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{ready, Context, Poll};
use std::time::Instant;

use http::{Request, Response};
use http_body::{Body, Frame, SizeHint};
use tower::util::ServiceFn;
use tower_layer::Layer;
use tower_service::Service;

use crate::metrics::Timer;

/// Late bound reference to the HTTP timer.
///
/// Empty until the agent runs with HTTP statistics enabled, then set once.
#[derive(Clone, Default)]
pub struct HttpTimerCell {
    inner: Arc<OnceLock<Arc<Timer>>>,
}

impl HttpTimerCell {
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the timer, if it was bound.
    pub fn get(&self) -> Option<&Arc<Timer>> {
        self.inner.get()
    }

    /// Binds the timer. Returns `false` if a timer was bound before.
    pub(crate) fn bind(&self, timer: Arc<Timer>) -> bool {
        self.inner.set(timer).is_ok()
    }
}

impl fmt::Debug for HttpTimerCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTimerCell")
            .field("bound", &self.inner.get().is_some())
            .finish()
    }
}

/// Tower Layer that times requests.
#[derive(Clone, Debug, Default)]
pub struct HttpTimingLayer {
    cell: Option<HttpTimerCell>,
}

impl HttpTimingLayer {
    /// Creates a layer observing into the timer of `cell`.
    pub fn new(cell: HttpTimerCell) -> Self {
        Self { cell: Some(cell) }
    }

    /// Creates a layer that passes requests through without timing them.
    pub fn disabled() -> Self {
        Self { cell: None }
    }
}

impl<S> Layer<S> for HttpTimingLayer {
    type Service = HttpTimingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        HttpTimingService {
            service,
            cell: self.cell.clone(),
        }
    }
}

/// Tower Service that times requests.
#[derive(Clone, Debug)]
pub struct HttpTimingService<S> {
    service: S,
    cell: Option<HttpTimerCell>,
}

impl<S> HttpTimingService<S> {
    /// Wraps `service`, observing into the timer of `cell` if given.
    pub fn new(service: S, cell: Option<HttpTimerCell>) -> Self {
        Self { service, cell }
    }

    /// Returns the wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.service
    }

    /// Unwraps the inner service.
    pub fn into_inner(self) -> S {
        self.service
    }
}

/// Wraps a request handling function in an [`HttpTimingService`].
pub fn wrap_fn<F>(f: F, cell: Option<HttpTimerCell>) -> HttpTimingService<ServiceFn<F>> {
    HttpTimingService::new(tower::service_fn(f), cell)
}

/// Observes the elapsed time when dropped.
struct LatencyGuard {
    timer: Arc<Timer>,
    start: Instant,
}

impl Drop for LatencyGuard {
    fn drop(&mut self) {
        self.timer.observe(self.start.elapsed());
    }
}

/// The Future returned from [`HttpTimingService`].
///
/// Resolves to the inner response with its body wrapped in a [`TimedBody`],
/// which then owns the running measurement. An error, a panic, or dropping
/// the future early ends the measurement right away.
#[pin_project::pin_project]
pub struct HttpTimingFuture<F> {
    guard: Option<LatencyGuard>,
    #[pin]
    future: F,
}

impl<F, ResBody, Error> Future for HttpTimingFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, Error>>,
{
    type Output = Result<Response<TimedBody<ResBody>>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let slf = self.project();
        match ready!(slf.future.poll(cx)) {
            Ok(response) => {
                let guard = slf.guard.take();
                Poll::Ready(Ok(response.map(|inner| TimedBody { inner, guard })))
            }
            Err(err) => {
                drop(slf.guard.take());
                Poll::Ready(Err(err))
            }
        }
    }
}

/// A response body that ends the latency measurement of its request.
///
/// The latency is observed once the inner body reports its end or fails,
/// or when the body is dropped before that, whichever comes first.
#[pin_project::pin_project]
pub struct TimedBody<B> {
    #[pin]
    inner: B,
    guard: Option<LatencyGuard>,
}

impl<B> TimedBody<B> {
    /// Returns the wrapped body.
    pub fn get_ref(&self) -> &B {
        &self.inner
    }

    /// Unwraps the inner body. The request counts as finished at this point.
    pub fn into_inner(self) -> B {
        let TimedBody { inner, guard } = self;
        drop(guard);
        inner
    }
}

impl<B: Body> Body for TimedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let slf = self.project();
        let frame = ready!(slf.inner.poll_frame(cx));
        if !matches!(frame, Some(Ok(_))) {
            drop(slf.guard.take());
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: fmt::Debug> fmt::Debug for TimedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedBody")
            .field("inner", &self.inner)
            .field("timing", &self.guard.is_some())
            .finish()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for HttpTimingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<TimedBody<ResBody>>;
    type Error = S::Error;
    type Future = HttpTimingFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let guard = self
            .cell
            .as_ref()
            .and_then(HttpTimerCell::get)
            .map(|timer| LatencyGuard {
                timer: timer.clone(),
                start: Instant::now(),
            });

        HttpTimingFuture {
            guard,
            future: self.service.call(request),
        }
    }
}

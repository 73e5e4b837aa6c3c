//! Graceful shutdown: once the shutdown token is cancelled, new requests get
//! 503 while in-flight ones run to completion. The same token stops read
//! retries, so a request stuck retrying a dead backend ends promptly.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use http::{Request, Response, StatusCode};
use http_body::Body;
use pin_project::pin_project;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::debug;

#[derive(Clone, Default)]
pub struct ShutdownState {
    token: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown starts. Hand it to anything that should stop early.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn start_shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no request is in flight.
    pub async fn completed(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight_count() == 0 {
                return;
            }
            debug!(in_flight = self.in_flight_count(), "Waiting for requests to finish");
            notified.await;
        }
    }

    fn enter(&self) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            state: self.clone(),
        }
    }
}

/// Counts a request until dropped, including when a timeout drops it early.
struct InFlight {
    state: ShutdownState,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct GracefulShutdownLayer {
    state: ShutdownState,
}

impl GracefulShutdownLayer {
    pub fn new(state: ShutdownState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for GracefulShutdownLayer {
    type Service = GracefulShutdownService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GracefulShutdownService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct GracefulShutdownService<S> {
    inner: S,
    state: ShutdownState,
}

fn unavailable<B: Default>() -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GracefulShutdownService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Body + Default,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = GracefulShutdownFuture<S::Future, ResBody, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if self.state.is_shutting_down() {
            return GracefulShutdownFuture {
                kind: FutureKind::Rejected {
                    response: Some(unavailable()),
                    _error: PhantomData,
                },
                _in_flight: None,
            };
        }

        GracefulShutdownFuture {
            _in_flight: Some(self.state.enter()),
            kind: FutureKind::Inner(self.inner.call(req)),
        }
    }
}

#[pin_project]
pub struct GracefulShutdownFuture<F, B, E> {
    #[pin]
    kind: FutureKind<F, B, E>,
    _in_flight: Option<InFlight>,
}

#[pin_project(project = FutureKindProj)]
enum FutureKind<F, B, E> {
    Inner(#[pin] F),
    Rejected {
        response: Option<Response<B>>,
        _error: PhantomData<fn() -> E>,
    },
}

impl<F, B, E> Future for GracefulShutdownFuture<F, B, E>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body + Default,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            FutureKindProj::Inner(fut) => fut.poll(cx),
            FutureKindProj::Rejected { response, .. } => {
                Poll::Ready(Ok(response.take().unwrap_or_else(unavailable)))
            }
        }
    }
}

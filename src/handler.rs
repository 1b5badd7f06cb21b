use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

use crate::h3::Request;
use crate::Session;

/// Serves accepted WebTransport requests.
///
/// The handler owns the session's fate: it must call
/// [`Session::accept_session`] or [`Session::reject_session`] before the
/// peer considers the session established.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, request: Request, session: Arc<Session>);
}

/// Adapts an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request, Arc<Session>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    HandlerFn(f)
}

pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request, Arc<Session>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn serve(&self, request: Request, session: Arc<Session>) {
        (self.0)(request, session).await
    }
}

/// Dispatches requests by URL path.
///
/// Patterns ending in `/` match every path they prefix; all others match
/// exactly. The longest matching pattern wins. Requests that match nothing
/// are rejected with `404`.
#[derive(Default)]
pub struct Router {
    routes: Vec<(String, Arc<dyn Handler>)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`.
    pub fn handle(&mut self, pattern: impl Into<String>, handler: impl Handler + 'static) {
        self.routes.push((pattern.into(), Arc::new(handler)));
    }

    fn lookup(&self, path: &str) -> Option<Arc<dyn Handler>> {
        let mut best: Option<&(String, Arc<dyn Handler>)> = None;
        for route in &self.routes {
            let (pattern, _) = route;
            let hit = if pattern.ends_with('/') {
                path.starts_with(pattern.as_str())
            } else {
                path == pattern
            };
            if hit && best.map_or(true, |(b, _)| pattern.len() > b.len()) {
                best = Some(route);
            }
        }
        best.map(|(_, handler)| handler.clone())
    }
}

#[async_trait]
impl Handler for Router {
    async fn serve(&self, request: Request, session: Arc<Session>) {
        match self.lookup(request.url.path()) {
            Some(handler) => handler.serve(request, session).await,
            None => {
                tracing::debug!(path = request.url.path(), "no route for request");
                let _ = session.reject_session(StatusCode::NOT_FOUND).await;
            }
        }
    }
}

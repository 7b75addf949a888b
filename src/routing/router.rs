//! Composable route table.
//!
//! # Responsibilities
//! - Store routes built from chained selectors (domain, path, method, root)
//! - Resolve a request to the first route whose selector accepts it
//! - Delegate to mounted sub-tables and strip mount roots from the path
//!
//! # Design Decisions
//! - First match wins, in insertion order; no specificity ordering
//! - Patterns compiled when the route is registered (fail fast)
//! - Immutable once turned into a `ServeFunction`
//! - Exhaustion is a 500, not a 404: a missing route is a configuration defect
//!
//! # Example
//! ```ignore
//! let mut app = App::new();
//! app.domain("*.example.com").serve(site)?;
//! app.root("/api/").path("/users").serve(users)?;
//! let serve = app.into_serve();
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, Uri};

use crate::http::event::{FetchEvent, ServeFunction};
use crate::http::request::{hostname, with_uri};
use crate::http::response::{unrouted, ServeError};
use crate::routing::glob::{Glob, GlobError};

/// The parts of a request selectors look at.
struct Target<'a> {
    host: Option<&'a str>,
    method: &'a Method,
    path: &'a str,
}

/// Compiled route predicate. Unset fields accept everything.
#[derive(Debug, Clone, Default)]
struct Selector {
    domain: Option<Glob>,
    path: Option<Glob>,
    method: Option<Method>,
    /// Normalized: leading `/`, no trailing `/` (`""` for the root itself)
    root: Option<String>,
}

impl Selector {
    /// The path presented to this route's handler, if the selector accepts.
    fn accepts<'p>(&self, target: &Target<'p>) -> Option<Cow<'p, str>> {
        if let Some(domain) = &self.domain {
            if !target.host.is_some_and(|host| domain.is_match(host)) {
                return None;
            }
        }
        if let Some(method) = &self.method {
            if method != target.method {
                return None;
            }
        }

        let path = match &self.root {
            Some(root) => strip_root(root, target.path)?,
            None => Cow::Borrowed(target.path),
        };
        if let Some(glob) = &self.path {
            if !glob.is_match(&path) {
                return None;
            }
        }
        Some(path)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(domain) = &self.domain {
            parts.push(format!("domain={}", domain));
        }
        if let Some(root) = &self.root {
            parts.push(format!("root={}/", root));
        }
        if let Some(path) = &self.path {
            parts.push(format!("path={}", path));
        }
        if let Some(method) = &self.method {
            parts.push(format!("method={}", method));
        }
        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

#[derive(Debug)]
struct Route {
    selector: Selector,
    handler: ServeFunction,
    /// Set for mounts: the sub-table must also accept the request.
    mounted: Option<Arc<App>>,
}

/// Result of [`App::resolve`].
#[derive(Debug)]
pub struct Resolved<'a> {
    pub handler: &'a ServeFunction,
    /// Path to forward when a root prefix was stripped.
    pub path: Option<String>,
}

/// Ordered table of routes.
#[derive(Debug, Default)]
pub struct App {
    routes: Vec<Route>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// A route with no selectors set yet.
    pub fn route(&mut self) -> RouteBuilder<'_> {
        RouteBuilder {
            app: self,
            domain: None,
            path: None,
            method: None,
            root: None,
        }
    }

    pub fn domain(&mut self, expr: &str) -> RouteBuilder<'_> {
        self.route().domain(expr)
    }

    pub fn path(&mut self, expr: &str) -> RouteBuilder<'_> {
        self.route().path(expr)
    }

    pub fn method(&mut self, method: Method) -> RouteBuilder<'_> {
        self.route().method(method)
    }

    pub fn root(&mut self, prefix: &str) -> RouteBuilder<'_> {
        self.route().root(prefix)
    }

    /// Catch-all route.
    pub fn serve(&mut self, handler: ServeFunction) -> Result<(), GlobError> {
        self.route().serve(handler)
    }

    pub fn mount(&mut self, app: App) -> Result<(), GlobError> {
        self.route().mount(app)
    }

    pub fn get(&mut self, path: &str, handler: ServeFunction) -> Result<(), GlobError> {
        self.route().get(path, handler)
    }

    pub fn put(&mut self, path: &str, handler: ServeFunction) -> Result<(), GlobError> {
        self.route().put(path, handler)
    }

    pub fn post(&mut self, path: &str, handler: ServeFunction) -> Result<(), GlobError> {
        self.route().post(path, handler)
    }

    /// Returns true if any route in this table accepts the request.
    pub fn filter<B>(&self, request: &Request<B>) -> bool {
        let host = hostname(request);
        let target = Target {
            host: host.as_deref(),
            method: request.method(),
            path: request.uri().path(),
        };
        self.accepts(&target)
    }

    fn accepts(&self, target: &Target<'_>) -> bool {
        self.routes.iter().any(|route| route_accepts(route, target).is_some())
    }

    /// First route accepting `request`, in insertion order.
    pub fn resolve<B>(&self, request: &Request<B>) -> Option<Resolved<'_>> {
        let host = hostname(request);
        let target = Target {
            host: host.as_deref(),
            method: request.method(),
            path: request.uri().path(),
        };

        for route in &self.routes {
            match route_accepts(route, &target) {
                Some(path) => {
                    tracing::debug!(route = %route.selector, path = %target.path, "Route hit");
                    let path = route.selector.root.as_ref().map(|_| path.into_owned());
                    return Some(Resolved {
                        handler: &route.handler,
                        path,
                    });
                }
                None => {
                    tracing::debug!(route = %route.selector, path = %target.path, "Route skipped");
                }
            }
        }
        None
    }

    /// Dispatch `event` to the first matching route.
    pub async fn handle(&self, event: FetchEvent) -> Result<Response<Body>, ServeError> {
        let Some(resolved) = self.resolve(event.request()) else {
            tracing::debug!(uri = %event.request().uri(), "No matching route");
            return Ok(unrouted());
        };

        let event = match resolved.path {
            Some(path) => {
                let uri = replace_path(event.request().uri(), &path)?;
                let (request, tasks) = event.into_parts();
                FetchEvent::new(with_uri(request, uri), tasks)
            }
            None => event,
        };
        resolved.handler.call(event).await
    }

    pub fn into_serve(self) -> ServeFunction {
        let app = Arc::new(self);
        ServeFunction::new(move |event: FetchEvent| {
            let app = app.clone();
            async move { app.handle(event).await }
        })
    }
}

/// Path to present to the route, or `None` if it does not accept `target`.
fn route_accepts<'p>(route: &Route, target: &Target<'p>) -> Option<Cow<'p, str>> {
    let path = route.selector.accepts(target)?;
    if let Some(sub) = &route.mounted {
        let inner = Target {
            host: target.host,
            method: target.method,
            path: &path,
        };
        if !sub.accepts(&inner) {
            return None;
        }
    }
    Some(path)
}

/// Builder for one route. Terminated by `serve`, `mount` or a verb shortcut.
#[must_use = "a route is only registered by serve, mount, get, put or post"]
pub struct RouteBuilder<'a> {
    app: &'a mut App,
    domain: Option<String>,
    path: Option<String>,
    method: Option<Method>,
    root: Option<String>,
}

impl<'a> RouteBuilder<'a> {
    pub fn domain(mut self, expr: &str) -> Self {
        self.domain = Some(expr.to_string());
        self
    }

    pub fn path(mut self, expr: &str) -> Self {
        self.path = Some(expr.to_string());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Only accept paths under `prefix`, and strip it before path matching
    /// and dispatch.
    pub fn root(mut self, prefix: &str) -> Self {
        self.root = Some(prefix.to_string());
        self
    }

    pub fn serve(self, handler: ServeFunction) -> Result<(), GlobError> {
        self.push(handler, None)
    }

    /// Delegate to `app` when both this selector and one of `app`'s routes accept.
    pub fn mount(self, app: App) -> Result<(), GlobError> {
        let app = Arc::new(app);
        let sub = app.clone();
        let handler = ServeFunction::new(move |event: FetchEvent| {
            let sub = sub.clone();
            async move { sub.handle(event).await }
        });
        self.push(handler, Some(app))
    }

    pub fn get(self, path: &str, handler: ServeFunction) -> Result<(), GlobError> {
        self.method(Method::GET).path(path).serve(handler)
    }

    pub fn put(self, path: &str, handler: ServeFunction) -> Result<(), GlobError> {
        self.method(Method::PUT).path(path).serve(handler)
    }

    pub fn post(self, path: &str, handler: ServeFunction) -> Result<(), GlobError> {
        self.method(Method::POST).path(path).serve(handler)
    }

    fn push(self, handler: ServeFunction, mounted: Option<Arc<App>>) -> Result<(), GlobError> {
        let selector = Selector {
            domain: self.domain.as_deref().map(Glob::host).transpose()?,
            path: self.path.as_deref().map(Glob::new).transpose()?,
            method: self.method,
            root: self.root.as_deref().map(normalize_root),
        };
        tracing::debug!(route = %selector, mount = mounted.is_some(), "Route registered");

        self.app.routes.push(Route {
            selector,
            handler,
            mounted,
        });
        Ok(())
    }
}

fn normalize_root(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// `path` relative to `root`, always with a leading `/`.
fn strip_root<'p>(root: &str, path: &'p str) -> Option<Cow<'p, str>> {
    if root.is_empty() {
        return Some(Cow::Borrowed(path));
    }
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        Some(Cow::Borrowed("/"))
    } else if rest.starts_with('/') {
        Some(Cow::Borrowed(rest))
    } else {
        None
    }
}

/// `uri` with its path replaced and its query kept.
fn replace_path(uri: &Uri, path: &str) -> Result<Uri, axum::http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };
    let mut builder = Uri::builder();
    if let Some(scheme) = uri.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = uri.authority() {
        builder = builder.authority(authority.clone());
    }
    builder.path_and_query(path_and_query).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::event::BackgroundTasks;
    use crate::http::response::UNROUTED_BODY;
    use axum::http::StatusCode;

    /// Answers with its name and the path it saw.
    fn named(name: &'static str) -> ServeFunction {
        ServeFunction::new(move |event: FetchEvent| async move {
            let uri = event.request().uri();
            let body = match uri.query() {
                Some(q) => format!("{} {}?{}", name, uri.path(), q),
                None => format!("{} {}", name, uri.path()),
            };
            Ok(Response::new(Body::from(body)))
        })
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn dispatch(serve: &ServeFunction, method: Method, uri: &str) -> (StatusCode, String) {
        let event = FetchEvent::new(request(method, uri), BackgroundTasks::new());
        let response = serve.call(event).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_domain_selector() {
        let mut app = App::new();
        app.domain("*.gitbook.com").serve(named("gitbook")).unwrap();
        app.serve(named("fallback")).unwrap();
        let serve = app.into_serve();

        let (_, body) = dispatch(&serve, Method::GET, "https://docs.gitbook.com/x").await;
        assert_eq!(body, "gitbook /x");
        let (_, body) = dispatch(&serve, Method::GET, "https://gitbook.com/x").await;
        assert_eq!(body, "fallback /x");
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let mut app = App::new();
        app.path("/a/**").serve(named("broad")).unwrap();
        app.path("/a/b").serve(named("narrow")).unwrap();
        let serve = app.into_serve();

        // Insertion order, not specificity
        let (_, body) = dispatch(&serve, Method::GET, "https://x.com/a/b").await;
        assert_eq!(body, "broad /a/b");
    }

    #[tokio::test]
    async fn test_method_shortcuts() {
        let mut app = App::new();
        app.get("/items", named("list")).unwrap();
        app.post("/items", named("create")).unwrap();
        app.put("/items/*", named("update")).unwrap();
        let serve = app.into_serve();

        assert_eq!(dispatch(&serve, Method::GET, "https://x.com/items").await.1, "list /items");
        assert_eq!(dispatch(&serve, Method::POST, "https://x.com/items").await.1, "create /items");
        assert_eq!(dispatch(&serve, Method::PUT, "https://x.com/items/7").await.1, "update /items/7");

        let (status, body) = dispatch(&serve, Method::DELETE, "https://x.com/items").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, UNROUTED_BODY);
    }

    #[tokio::test]
    async fn test_root_prefix_is_stripped() {
        let mut app = App::new();
        app.root("/api/").path("/users").serve(named("users")).unwrap();
        let serve = app.into_serve();

        let (_, body) = dispatch(&serve, Method::GET, "https://x.com/api/users?page=2").await;
        assert_eq!(body, "users /users?page=2");

        // Prefix must end on a segment boundary
        let (status, _) = dispatch(&serve, Method::GET, "https://x.com/apiusers").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_root_itself_becomes_slash() {
        let mut app = App::new();
        app.root("/docs").serve(named("docs")).unwrap();
        let serve = app.into_serve();

        assert_eq!(dispatch(&serve, Method::GET, "https://x.com/docs").await.1, "docs /");
        assert_eq!(dispatch(&serve, Method::GET, "https://x.com/docs/").await.1, "docs /");
        assert_eq!(dispatch(&serve, Method::GET, "https://x.com/docs/a/b").await.1, "docs /a/b");
    }

    #[tokio::test]
    async fn test_mount_requires_sub_match() {
        let mut api = App::new();
        api.get("/users", named("users")).unwrap();
        api.get("/teams/*", named("teams")).unwrap();

        let mut app = App::new();
        app.domain("api.example.com").mount(api).unwrap();
        app.serve(named("site")).unwrap();
        let serve = app.into_serve();

        assert_eq!(
            dispatch(&serve, Method::GET, "https://api.example.com/teams/1").await.1,
            "teams /teams/1"
        );
        // Outer gate matches but no sub-route does: falls through
        assert_eq!(
            dispatch(&serve, Method::GET, "https://api.example.com/other").await.1,
            "site /other"
        );
        // Sub-route matches but outer gate does not
        assert_eq!(
            dispatch(&serve, Method::GET, "https://www.example.com/users").await.1,
            "site /users"
        );
    }

    #[tokio::test]
    async fn test_mount_under_root() {
        let mut api = App::new();
        api.get("/users", named("users")).unwrap();

        let mut app = App::new();
        app.root("/api/").mount(api).unwrap();
        let serve = app.into_serve();

        assert_eq!(
            dispatch(&serve, Method::GET, "https://x.com/api/users").await.1,
            "users /users"
        );
        let (status, _) = dispatch(&serve, Method::GET, "https://x.com/users").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_filter_and_resolve() {
        let mut app = App::new();
        app.domain("*.example.com").path("/x/*").serve(named("x")).unwrap();

        assert!(app.filter(&request(Method::GET, "https://a.example.com/x/1")));
        assert!(!app.filter(&request(Method::GET, "https://a.example.com/y/1")));
        assert!(app.resolve(&request(Method::GET, "https://b.com/x/1")).is_none());

        let resolved = app.resolve(&request(Method::GET, "https://a.example.com/x/1")).unwrap();
        assert!(resolved.path.is_none());
    }

    #[test]
    fn test_invalid_pattern_fails_registration() {
        let mut app = App::new();
        assert!(app.path("/!(a").serve(named("bad")).is_err());
        assert!(app.domain("").serve(named("bad")).is_err());
        assert!(app.is_empty());
    }

    #[test]
    fn test_strip_root() {
        assert_eq!(strip_root("/api", "/api/users").as_deref(), Some("/users"));
        assert_eq!(strip_root("/api", "/api").as_deref(), Some("/"));
        assert_eq!(strip_root("/api", "/apix"), None);
        assert_eq!(strip_root("", "/any").as_deref(), Some("/any"));
        assert_eq!(normalize_root("api/"), "/api");
        assert_eq!(normalize_root("/"), "");
    }
}

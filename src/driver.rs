//! The single-threaded event-loop runner: owns a `tokio_core::reactor::
//! Core`, the DNS resolver, the connection pool, and the `tacho`
//! metrics scope/reporter, matching the teacher's `main.rs`/`app.rs`
//! wiring (`tacho::new()` once at the root, `Core::new()` driving
//! everything registered on its `Handle`).

use std::rc::Rc;
use std::time::Duration;

use futures::Future;
use tacho;
use tokio_core::reactor::{Core, Handle};
use tokio_timer::Timer;

use config::RuntimeConfig;
use dns::{DnsCache, RefreshingAddressResolver};
use error::Result;
use pool::{Dialer, Pool};

/// Owns one event loop and everything registered on it. Not `Send`:
/// callers that need multiple independent loops run one `Runtime` per
/// thread, the way the teacher splits admin and proxy work across
/// `thread::Builder::spawn` calls in `main.rs`.
pub struct Runtime<D: Dialer> {
    core: Core,
    metrics_scope: tacho::Scope,
    reporter: tacho::Reporter,
    dns_cache: DnsCache,
    resolver: RefreshingAddressResolver,
    pool: Rc<Pool<D>>,
}

impl<D: Dialer> Runtime<D> {
    pub fn new(config: RuntimeConfig, dialer: D) -> Result<Runtime<D>> {
        let core = Core::new()?;
        let handle = core.handle();
        let timer = Timer::default();

        let (metrics_scope, reporter) = tacho::new();
        let metrics_scope = metrics_scope.prefixed("armeria_client");

        let dns_cache = DnsCache::new(config.resolver.dns_cache_capacity);
        let resolver = RefreshingAddressResolver::new(
            handle.clone(),
            timer.clone(),
            dns_cache.clone(),
            config.resolver,
            &metrics_scope,
        );

        let max_age = config.pool.max_connection_age_millis.map(Duration::from_millis);
        let pool = Rc::new(Pool::new(
            dialer,
            config.pool.use_http1_pipelining,
            max_age,
            config.pool.http2.to_settings(),
            &metrics_scope,
        ));

        Ok(Runtime {
            core: core,
            metrics_scope: metrics_scope,
            reporter: reporter,
            dns_cache: dns_cache,
            resolver: resolver,
            pool: pool,
        })
    }

    pub fn handle(&self) -> Handle {
        self.core.handle()
    }

    pub fn dns_cache(&self) -> &DnsCache {
        &self.dns_cache
    }

    pub fn resolver(&self) -> &RefreshingAddressResolver {
        &self.resolver
    }

    pub fn pool(&self) -> Rc<Pool<D>> {
        self.pool.clone()
    }

    pub fn metrics_scope(&self) -> &tacho::Scope {
        &self.metrics_scope
    }

    pub fn report(&mut self) -> tacho::Report {
        self.reporter.take()
    }

    /// Registers `f` on this runtime's event loop and runs it to
    /// completion, the way `main.rs` drives `proxies.run()`.
    pub fn run<F>(&mut self, f: F) -> ::std::result::Result<F::Item, F::Error>
    where
        F: Future,
    {
        self.core.run(f)
    }
}

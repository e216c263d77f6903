//! Top-level server: wires configuration, the base-directory handle,
//! the stats bank, and the five worker threads together, then routes
//! each classified request to its handler.

use std::sync::Arc;
use std::time::Instant;

use crate::basedir::BaseDir;
use crate::classifier::{self, Routes};
use crate::config::Config;
use crate::download;
use crate::executor::{self, Lane};
use crate::http::{Method, Reply};
use crate::lister;
use crate::request::Request;
use crate::stats::{Kind, Stats};
use crate::upload;

const INFO_BANNER: &str = "gunkan object-storage blob v1";
const BLOB_PREFIX: &str = "/v1/blob/";
const LIST_PREFIX: &str = "/v1/list/";

pub struct ServerContext {
    pub config: Config,
    pub basedir: Arc<BaseDir>,
    pub stats: Arc<Stats>,
    /// Incremented once per completed request (`add_permits(1)`),
    /// observed from the main thread for backpressure/visibility — the
    /// idiomatic substitute for the original's tokens eventfd.
    pub tokens: Arc<tokio::sync::Semaphore>,
}

pub struct Server {
    context: Arc<ServerContext>,
}

impl Server {
    pub fn new(config: Config) -> std::io::Result<Self> {
        let basedir = Arc::new(BaseDir::open(&config.basedir)?);
        let context = Arc::new(ServerContext {
            config,
            basedir,
            stats: Arc::new(Stats::new()),
            tokens: Arc::new(tokio::sync::Semaphore::new(0)),
        });
        Ok(Server { context })
    }

    /// Binds the listener, starts the acceptor and the four executor
    /// threads, and runs until `shutdown` fires. Six OS threads exist
    /// by the time this returns: the caller's own (main), the acceptor,
    /// and the four executors.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> std::io::Result<()> {
        let std_listener = std::net::TcpListener::bind(&self.context.config.endpoint)?;
        std_listener.set_nonblocking(true)?;
        tracing::info!(endpoint = %self.context.config.endpoint, "listening");

        let be_read = executor::spawn(Lane::BestEffortRead, self.context.clone());
        let be_write = executor::spawn(Lane::BestEffortWrite, self.context.clone());
        // Real-time lanes are started (and keep their elevated priority,
        // per the thread-priority table) even though the classifier
        // never routes traffic to them directly.
        let _rt_read = executor::spawn(Lane::RealTimeRead, self.context.clone());
        let _rt_write = executor::spawn(Lane::RealTimeWrite, self.context.clone());

        let routes = Routes {
            best_effort_read: be_read,
            best_effort_write: be_write,
            workers_ingress: self.context.config.workers_ingress,
            stats: self.context.stats.clone(),
        };
        spawn_acceptor(std_listener, routes, shutdown.clone());

        tokio::spawn(poll_tokens(self.context.tokens.clone(), shutdown.clone()));

        shutdown.changed().await.ok();
        Ok(())
    }
}

/// Mirrors `main.cpp`'s `_poll_tokens`: periodically drains completed-
/// request tokens and logs the throughput, giving the main thread
/// visibility into executor progress without blocking on it.
async fn poll_tokens(tokens: Arc<tokio::sync::Semaphore>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => if *shutdown.borrow() { return },
        }
        let completed = tokens.available_permits();
        if completed > 0 {
            tokens.forget_permits(completed);
            tracing::debug!(completed, "requests completed since last token poll");
        }
    }
}

/// Runs the acceptor loop on its own dedicated thread and runtime,
/// mirroring the executor threads' shape.
fn spawn_acceptor(std_listener: std::net::TcpListener, routes: Routes, shutdown: tokio::sync::watch::Receiver<bool>) {
    std::thread::Builder::new()
        .name("gunkan-acceptor".to_string())
        .spawn(move || {
            executor::apply_realtime_priority("gunkan-acceptor", 2);
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("build acceptor runtime");
            rt.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(std_listener) {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to attach listener in acceptor thread");
                        return;
                    }
                };
                classifier::run(listener, routes, shutdown).await;
            });
        })
        .expect("spawn acceptor thread");
}

pub async fn dispatch(context: &ServerContext, mut req: Request) {
    let t_exec_start = Instant::now();
    let url = req.url.clone();
    let _entered = req.span_exec.enter();

    let (kind, status, bytes_out) = if let Some(id_str) = url.strip_prefix(BLOB_PREFIX) {
        dispatch_blob(context, &mut req, id_str).await
    } else if url == "/v1/status" {
        (Kind::Status, dispatch_status(context, &req).await, 0)
    } else if url == "/info" {
        (Kind::Info, dispatch_info(&req).await, 0)
    } else if let Some(marker) = url.strip_prefix(LIST_PREFIX) {
        dispatch_list(context, &req, marker).await
    } else if url == "/v1/list" {
        dispatch_list(context, &req, "").await
    } else {
        let mut reply = Reply::new(&req.active);
        let _ = reply.write_error(418).await;
        (Kind::Other, 418, 0)
    };

    let elapsed_micros = t_exec_start.elapsed().as_micros() as u64;
    context.stats.record(kind, elapsed_micros, status);
    context.stats.add_bytes_in(req.bytes_in);
    context.stats.add_bytes_out(bytes_out);
    context.tokens.add_permits(1);
}

async fn dispatch_blob(context: &ServerContext, req: &mut Request, id_str: &str) -> (Kind, u16, u64) {
    let id = match crate::blob_id::BlobId::decode(id_str) {
        Ok(id) => id,
        Err(_) => {
            let mut reply = Reply::new(&req.active);
            let _ = reply.write_error(400).await;
            return (Kind::Other, 400, reply.bytes_out);
        }
    };
    let path = crate::path_mapper::relative_path(context.config.hash_layout, &id);

    match req.method {
        Method::Put => {
            let outcome = upload::handle_put(&context.basedir, &context.config, req, &path).await;
            let mut reply = Reply::new(&req.active);
            let _ = reply.write_error(outcome.status).await;
            req.bytes_in += outcome.bytes_in;
            (Kind::Put, outcome.status, reply.bytes_out)
        }
        Method::Get | Method::Head => {
            let mut reply = Reply::new(&req.active);
            let with_body = req.method == Method::Get;
            let outcome = download::handle_get(&context.basedir, &req.active, &path, with_body, &mut reply).await;
            let kind = if with_body { Kind::Get } else { Kind::Head };
            (kind, outcome.status, outcome.bytes_out)
        }
        Method::Delete => {
            let status = download::handle_delete(&context.basedir, &path);
            let mut reply = Reply::new(&req.active);
            let _ = reply.write_error(status).await;
            (Kind::Delete, status, reply.bytes_out)
        }
        _ => {
            let mut reply = Reply::new(&req.active);
            let _ = reply.write_error(405).await;
            (Kind::Other, 405, reply.bytes_out)
        }
    }
}

async fn dispatch_status(context: &ServerContext, req: &Request) -> u16 {
    let snapshot = context.stats.snapshot();
    let body = serde_json::to_vec(&snapshot).unwrap_or_default();
    let mut reply = Reply::new(&req.active);
    if reply.write_headers(200, None, &[]).await.is_err() {
        return 499;
    }
    if reply.write_chunk(&body).await.is_err() {
        return 499;
    }
    let _ = reply.write_final_chunk().await;
    200
}

async fn dispatch_info(req: &Request) -> u16 {
    let mut reply = Reply::new(&req.active);
    if reply.write_headers(200, None, &[]).await.is_err() {
        return 499;
    }
    if reply.write_chunk(INFO_BANNER.as_bytes()).await.is_err() {
        return 499;
    }
    let _ = reply.write_final_chunk().await;
    200
}

async fn dispatch_list(context: &ServerContext, req: &Request, marker: &str) -> (Kind, u16, u64) {
    if req.method != Method::Get {
        let mut reply = Reply::new(&req.active);
        let _ = reply.write_error(405).await;
        return (Kind::List, 405, reply.bytes_out);
    }

    let layout = context.config.hash_layout;
    let basedir = context.basedir.clone();
    let marker_owned = marker.to_string();
    let ids = tokio::task::spawn_blocking(move || lister::list(&basedir, layout, &marker_owned, lister::MAX_RESULTS)).await;

    let ids = match ids {
        Ok(Ok(ids)) => ids,
        _ => {
            let mut reply = Reply::new(&req.active);
            let _ = reply.write_error(500).await;
            return (Kind::List, 500, reply.bytes_out);
        }
    };

    let mut reply = Reply::new(&req.active);
    if reply.write_headers(200, None, &[("Content-Type", "text/plain".to_string())]).await.is_err() {
        return (Kind::List, 499, reply.bytes_out);
    }
    for id in ids {
        let line = format!("{}\r\n", id);
        if reply.write_chunk(line.as_bytes()).await.is_err() {
            return (Kind::List, 499, reply.bytes_out);
        }
    }
    let _ = reply.write_final_chunk().await;
    (Kind::List, 200, reply.bytes_out)
}

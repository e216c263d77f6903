//! Acceptor thread: accepts connections in batches, parses headers on
//! a short-lived per-connection task, classifies by read/write intent,
//! and hands the request to the matching executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use crate::executor::ExecutorHandle;
use crate::http::{consume_headers, Method};
use crate::io::ActiveFd;
use crate::request::Handoff;
use crate::stats::Stats;

const ACCEPT_BATCH: usize = 16;
const HEADER_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Routes {
    pub best_effort_read: ExecutorHandle,
    pub best_effort_write: ExecutorHandle,
    /// Soft cap reported through `stats.ingress_gauge()`, per
    /// `workers_ingress` — never enforced as a hard admission limit.
    pub workers_ingress: usize,
    pub stats: Arc<Stats>,
}

pub async fn run(listener: TcpListener, routes: Routes, shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let mut accepted = 0;
        while accepted < ACCEPT_BATCH {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    accepted += 1;
                    let active = ActiveFd::new(stream, peer);
                    let routes_ref = ExecutorPair {
                        read: routes.best_effort_read.clone(),
                        write: routes.best_effort_write.clone(),
                        workers_ingress: routes.workers_ingress,
                        stats: routes.stats.clone(),
                    };
                    tokio::spawn(classify(active, routes_ref));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }

        if accepted == 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[derive(Clone)]
struct ExecutorPair {
    read: ExecutorHandle,
    write: ExecutorHandle,
    workers_ingress: usize,
    stats: Arc<Stats>,
}

async fn classify(active: ActiveFd, routes: ExecutorPair) {
    let span_active = tracing::info_span!("active", peer = %active.peer);
    let t_active = Instant::now();

    let inflight = routes.stats.ingress_enter();
    if inflight > routes.workers_ingress as i64 {
        tracing::warn!(
            inflight,
            limit = routes.workers_ingress,
            "ingress gauge above workers_ingress (soft limit, not enforced)"
        );
    }

    let span_parse = tracing::info_span!(parent: &span_active, "parse");
    let parsed = {
        let _entered = span_parse.enter();
        consume_headers(&active, Instant::now() + HEADER_TIMEOUT).await
    };
    routes.stats.ingress_exit();

    let (parsed_req, surplus, header_bytes) = match parsed {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "header parse failed, dropping connection");
            return;
        }
    };
    let t_parsed = Instant::now();

    let span_wait = tracing::info_span!(parent: &span_active, "wait");
    span_wait.follows_from(&span_parse);

    // Read-only requests go to the read lane, mutating ones to the
    // write lane. Both lanes are best-effort, so they share one TOS class.
    active.set_prio(crate::io::active_fd::IpTos::LowCost);
    let method = parsed_req.method;

    let (std_stream, peer) = match active.into_std() {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "failed to detach socket for handoff");
            return;
        }
    };

    let handoff = Handoff {
        std_stream,
        peer,
        method,
        url: parsed_req.url,
        headers: parsed_req.headers,
        surplus,
        header_bytes,
        t_active,
        t_parsed,
        span_active,
        span_parse,
        span_wait,
    };

    if matches!(method, Method::Get | Method::Head) {
        routes.read.send(handoff);
    } else {
        routes.write.send(handoff);
    }
}

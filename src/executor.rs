//! The four prioritised worker threads, each hosting its own
//! single-threaded runtime and fed by an unbounded channel acting as
//! the handoff queue.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::io::active_fd::IpTos;
use crate::request::Handoff;
use crate::server::ServerContext;

/// SCHED_RR priorities, highest first: realtime-write, realtime-read,
/// best-effort-write, best-effort-read, acceptor, main.
#[derive(Debug, Clone, Copy)]
pub enum Lane {
    BestEffortRead,
    BestEffortWrite,
    RealTimeRead,
    RealTimeWrite,
}

impl Lane {
    fn thread_name(self) -> &'static str {
        match self {
            Lane::BestEffortRead => "gunkan-exec-be-r",
            Lane::BestEffortWrite => "gunkan-exec-be-w",
            Lane::RealTimeRead => "gunkan-exec-rt-r",
            Lane::RealTimeWrite => "gunkan-exec-rt-w",
        }
    }

    /// This lane's configured worker count, i.e. how many dispatches may
    /// run concurrently on it — the Rust stand-in for the original's
    /// per-lane OS thread pool size, enforced here as a permit bound on
    /// one thread's concurrent async tasks instead.
    fn worker_count(self, config: &crate::config::Config) -> usize {
        match self {
            Lane::BestEffortRead => config.workers_be_read,
            Lane::BestEffortWrite => config.workers_be_write,
            Lane::RealTimeRead => config.workers_rt_read,
            Lane::RealTimeWrite => config.workers_rt_write,
        }
    }

    fn sched_priority(self) -> libc::c_int {
        match self {
            Lane::BestEffortRead => 3,
            Lane::BestEffortWrite => 4,
            Lane::RealTimeRead => 5,
            Lane::RealTimeWrite => 6,
        }
    }

    pub fn tos(self) -> IpTos {
        match self {
            Lane::BestEffortRead | Lane::BestEffortWrite => IpTos::LowCost,
            Lane::RealTimeRead | Lane::RealTimeWrite => IpTos::Throughput,
        }
    }
}

/// A handle the acceptor thread uses to hand off a fully-parsed
/// request to one of the four executor threads.
#[derive(Clone)]
pub struct ExecutorHandle {
    sender: mpsc::UnboundedSender<Handoff>,
}

impl ExecutorHandle {
    pub fn send(&self, req: Handoff) {
        // A closed receiver only happens mid-shutdown; the request is
        // simply dropped along with its still-open socket.
        let _ = self.sender.send(req);
    }
}

/// Attempts `SCHED_RR` at the given priority. Only root can actually
/// set a realtime scheduling class; any other caller gets `EPERM` and
/// the thread keeps the default scheduler.
pub(crate) fn apply_realtime_priority(name: &str, priority: libc::c_int) {
    let param = libc::sched_param { sched_priority: priority };
    // SAFETY: param is a valid sched_param for the current thread (pid 0).
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        tracing::warn!(thread = name, error = %err, "failed to set SCHED_RR priority, continuing at default priority");
    }
}

pub fn spawn(lane: Lane, context: Arc<ServerContext>) -> ExecutorHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Handoff>();
    let name = lane.thread_name();
    let permits = Arc::new(tokio::sync::Semaphore::new(lane.worker_count(&context.config).max(1)));

    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            apply_realtime_priority(name, lane.sched_priority());
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("build executor runtime");
            rt.block_on(async move {
                // Drains up to 16 pending requests per round before
                // falling back to waiting on the channel.
                loop {
                    let mut batch = Vec::with_capacity(16);
                    let got = rx.recv().await;
                    let Some(first) = got else { break };
                    batch.push(first);
                    while batch.len() < 16 {
                        match rx.try_recv() {
                            Ok(req) => batch.push(req),
                            Err(_) => break,
                        }
                    }
                    for handoff in batch {
                        let context = context.clone();
                        let span_exec = tracing::info_span!(parent: &handoff.span_active, "exec");
                        span_exec.follows_from(&handoff.span_wait);
                        // from_std must run inside this runtime so the
                        // socket attaches to this thread's reactor.
                        match handoff.into_request(span_exec) {
                            Ok(req) => {
                                // Bounds concurrent dispatches on this lane
                                // to its configured worker count; acquiring
                                // here (rather than inside the spawned
                                // task) throttles how fast this loop keeps
                                // admitting new work.
                                let permit = permits.clone().acquire_owned().await.expect("semaphore not closed");
                                tokio::spawn(async move {
                                    crate::server::dispatch(&context, req).await;
                                    drop(permit);
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to re-attach handed-off socket");
                            }
                        }
                    }
                }
            });
        })
        .expect("spawn executor thread");

    ExecutorHandle { sender: tx }
}

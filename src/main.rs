//! CLI entrypoint: parse flags, configure logging, optionally daemonize,
//! then run the server until a shutdown signal arrives.

use std::io::Write;

use clap::Parser;
use gunkan_blob::{Cli, Config, Server};

fn main() {
    let cli = Cli::parse();
    let config: Config = cli.into();

    init_tracing(&config);

    if config.init {
        if let Err(e) = std::fs::create_dir_all(&config.basedir) {
            tracing::error!(path = %config.basedir.display(), error = %e, "failed to create base directory");
            std::process::exit(1);
        }
        tracing::info!(path = %config.basedir.display(), "base directory initialised");
        std::process::exit(0);
    }

    if config.daemonize {
        // SAFETY: called once, before any threads are spawned and before
        // the tokio runtime starts; nochdir=1 keeps the cwd, noclose=0
        // redirects stdio to /dev/null as daemon(3) documents.
        let rc = unsafe { libc::daemon(1, 0) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            tracing::error!(error = %err, "daemon() failed");
            std::process::exit(1);
        }
    }

    if let Some(pidfile) = &config.pidfile {
        if let Err(e) = write_pidfile(pidfile) {
            tracing::error!(path = %pidfile.display(), error = %e, "failed to write pidfile");
            std::process::exit(1);
        }
    }

    let exit_code = run(config);
    std::process::exit(exit_code);
}

fn write_pidfile(path: &std::path::Path) -> std::io::Result<()> {
    let mut f = std::fs::File::create(path)?;
    write!(f, "{}", std::process::id())
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;
    let default_level = if config.quiet {
        "error"
    } else if config.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: Config) -> i32 {
    let pidfile = config.pidfile.clone();
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to build main runtime");
            return 1;
        }
    };

    let result = rt.block_on(async move {
        let server = match Server::new(config) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to start server");
                return 1;
            }
        };

        let (tx, rx) = tokio::sync::watch::channel(false);
        tokio::spawn(wait_for_shutdown_signal(tx));

        if let Err(e) = server.run(rx).await {
            tracing::error!(error = %e, "server exited with error");
            return 1;
        }
        0
    });

    if let Some(pidfile) = pidfile {
        let _ = std::fs::remove_file(pidfile);
    }
    result
}

/// Waits for SIGINT/SIGTERM/SIGQUIT and flips the shutdown watch channel,
/// mirroring `_sig_stop_react`'s three-signal net.
async fn wait_for_shutdown_signal(tx: tokio::sync::watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("register SIGQUIT handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
        _ = sigquit.recv() => {}
    }
    tracing::info!("shutdown signal received");
    let _ = tx.send(true);
}

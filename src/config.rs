//! Process-wide configuration, parsed once at startup from CLI flags.

use std::path::PathBuf;

use crate::path_mapper::HashLayout;

/// `server [OPTIONS] NAMESPACE ENDPOINT BASEDIR`
#[derive(clap::Parser, Debug, Clone)]
#[command(name = "gunkan-blobd", about = "Single-node HTTP blob storage server")]
pub struct Cli {
    /// Gunkan namespace this node participates in.
    pub namespace: String,

    /// Listen endpoint, `host:port`.
    pub endpoint: String,

    /// Base directory holding the hashed blob tree.
    pub basedir: PathBuf,

    /// Set the verbosity to 0.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Set the verbosity to a high level.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Daemonize the process.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Initiate the base directory and exit.
    #[arg(short = 'i', long)]
    pub init: bool,

    /// Path of the pidfile.
    #[arg(short = 'p', long = "pid")]
    pub pidfile: Option<PathBuf>,

    #[arg(long = "hash-width", default_value_t = 2)]
    pub hash_width: usize,

    #[arg(long = "hash-depth", default_value_t = 2)]
    pub hash_depth: usize,

    #[arg(long = "workers-ingress", default_value_t = 64)]
    pub workers_ingress: usize,

    #[arg(long = "workers-be-read", default_value_t = 1024)]
    pub workers_be_read: usize,

    #[arg(long = "workers-be-write", default_value_t = 1024)]
    pub workers_be_write: usize,

    #[arg(long = "workers-rt-read", default_value_t = 8)]
    pub workers_rt_read: usize,

    #[arg(long = "workers-rt-write", default_value_t = 8)]
    pub workers_rt_write: usize,
}

/// Process-wide configuration, set once at startup and read-only
/// thereafter.
#[derive(Debug, Clone)]
pub struct Config {
    pub namespace: String,
    pub endpoint: String,
    pub basedir: PathBuf,
    pub hash_layout: HashLayout,
    pub workers_ingress: usize,
    pub workers_be_read: usize,
    pub workers_be_write: usize,
    pub workers_rt_read: usize,
    pub workers_rt_write: usize,
    pub pidfile: Option<PathBuf>,
    pub daemonize: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub init: bool,

    /// Whether `FileAppender::preallocate` is allowed to call `fallocate`.
    /// Disabled automatically (not via this flag) on `ENOTSUP` filesystems.
    pub fallocate: bool,
    /// `POSIX_FADV_DONTNEED` after a successful upload.
    pub fadvise_upload: bool,
    /// `fdatasync(file)` after a successful upload.
    pub fsync_data: bool,
    /// `fdatasync(parent dir)` after a successful upload, if `fsync_data` is false.
    pub fsync_dir: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            namespace: cli.namespace,
            endpoint: cli.endpoint,
            basedir: cli.basedir,
            hash_layout: HashLayout { width: cli.hash_width, depth: cli.hash_depth },
            workers_ingress: cli.workers_ingress,
            workers_be_read: cli.workers_be_read,
            workers_be_write: cli.workers_be_write,
            workers_rt_read: cli.workers_rt_read,
            workers_rt_write: cli.workers_rt_write,
            pidfile: cli.pidfile,
            daemonize: cli.daemon,
            quiet: cli.quiet,
            verbose: cli.verbose,
            init: cli.init,
            fallocate: true,
            fadvise_upload: true,
            fsync_data: false,
            fsync_dir: false,
        }
    }
}

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

mod adapters;
mod commit_index;
mod error;
mod inode;
mod repo;
mod resolver;
mod vfm;

#[cfg(test)]
mod fake_repo;

use adapters::fuse::GitSnapFuse;
use adapters::nfs::GitSnapNfs;
use adapters::webdav::GitSnapDav;
use commit_index::CommitIndex;
use repo::RepoAdapter;
use vfm::{Vfm, DEFAULT_MAX_COMMITS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Fuse,
    Nfs,
    Webdav,
}

#[derive(Debug, Parser)]
#[command(
    name = "gitsnapfs",
    version,
    about = "Browse a Git repository's history as a read-only filesystem"
)]
struct Cli {
    /// Path to the target Git repository (.git dir or bare repo).
    #[arg(long)]
    repo: PathBuf,

    /// Mount point (FUSE) or local directory served from (NFS/WebDAV only
    /// need this for logging; the listener itself binds to --port).
    #[arg(long)]
    mountpoint: PathBuf,

    /// Which protocol adapter to serve the VFM through.
    #[arg(long, value_enum, default_value_t = Transport::Fuse)]
    transport: Transport,

    /// Allow other users to access the mount. FUSE only.
    #[arg(long)]
    allow_other: bool,

    /// TCP port to listen on. NFS only.
    #[arg(long, default_value_t = 11111)]
    port: u16,

    /// Cap on entries listed under a branch history directory.
    #[arg(long, default_value_t = DEFAULT_MAX_COMMITS)]
    max_commits: usize,

    /// Increase logging verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_directive = match verbose {
        0 => "gitsnapfs=info",
        1 => "gitsnapfs=debug",
        _ => "gitsnapfs=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::info!(
        repo = %cli.repo.display(),
        mountpoint = %cli.mountpoint.display(),
        transport = ?cli.transport,
        "GitSnapFS starting"
    );

    let repo = RepoAdapter::open(&cli.repo).context("failed to open git repository")?;
    let repo: Arc<dyn repo::GitSource> = Arc::new(repo);
    let index = Arc::new(CommitIndex::new(repo.clone()));
    let vfm = Arc::new(Vfm::new(repo, index, cli.max_commits));

    match cli.transport {
        Transport::Fuse => serve_fuse(vfm, &cli.mountpoint, cli.allow_other),
        Transport::Nfs => serve_nfs(vfm, cli.port),
        Transport::Webdav => serve_webdav(vfm, cli.port),
    }
}

fn serve_fuse(vfm: Arc<Vfm>, mountpoint: &std::path::Path, allow_other: bool) -> Result<()> {
    use fuse_backend_rs::api::server::Server;
    use fuse_backend_rs::transport::{FuseChannel, FuseSession};

    let fs = GitSnapFuse::new(vfm);
    let server = Arc::new(Server::new(fs));

    let mut session = FuseSession::new(mountpoint, "gitsnapfs", "", false)
        .context("failed to create FUSE session")?;
    session.set_allow_other(allow_other);
    session.mount().context("failed to mount FUSE filesystem")?;

    let mut channel: FuseChannel = session
        .new_channel()
        .context("failed to open FUSE channel")?;
    tracing::info!(mountpoint = %mountpoint.display(), "FUSE filesystem mounted");

    loop {
        match channel.get_request() {
            Ok(Some((reader, writer))) => {
                if let Err(err) = server.handle_message(reader, writer) {
                    tracing::warn!(error = %err, "FUSE request failed");
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(error = %err, "FUSE channel error");
                break;
            }
        }
    }

    session.umount().context("failed to unmount FUSE filesystem")?;
    Ok(())
}

fn serve_nfs(vfm: Arc<Vfm>, port: u16) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let fs = GitSnapNfs::new(vfm);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        tracing::info!(%addr, "NFSv3 server listening");
        nfsserve::tcp::NFSTcpListener::bind(&addr.to_string(), fs)
            .await
            .context("failed to bind NFS listener")?
            .handle_forever()
            .await
            .context("NFS server stopped")
    })
}

fn serve_webdav(vfm: Arc<Vfm>, port: u16) -> Result<()> {
    use hyper::server::conn::AddrStream;
    use hyper::service::{make_service_fn, service_fn};

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let fs = GitSnapDav::new(vfm);
        let handler = dav_server::DavHandler::builder()
            .filesystem(Box::new(fs))
            .build_handler();

        let make_svc = make_service_fn(move |_conn: &AddrStream| {
            let handler = handler.clone();
            async move {
                Ok::<_, std::convert::Infallible>(service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, std::convert::Infallible>(handler.handle(req).await) }
                }))
            }
        });

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        tracing::info!(%addr, "WebDAV server listening");
        hyper::Server::bind(&addr)
            .serve(make_svc)
            .await
            .context("WebDAV server stopped")
    })
}

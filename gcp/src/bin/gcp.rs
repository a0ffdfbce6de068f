use anyhow::Context;
use clap::Parser;
use tracing::instrument;

use gcp_tools_gcp::{client, path};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gcp",
    version,
    about = "Copy a single file to or from a `gcpd` server",
    long_about = "`gcp` copies one file between this host and a host running `gcpd`.

Exactly one of SRC and DST must name the server using `host:path` syntax (similar to `scp`).

EXAMPLES:
    # Push a local file to the server
    gcp /var/tmp/x.iso dhcp-101:/var/opt/x.iso

    # Pull a file from the server
    gcp 35.128.27.105:/var/opt/y.iso /var/tmp/y.iso --summary"
)]
struct Args {
    // Connection
    /// Port `gcpd` listens on
    #[arg(short, long, default_value_t = remote::rpc::DEFAULT_PORT, value_name = "PORT", help_heading = "Connection")]
    port: u16,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "15",
        value_name = "N",
        help_heading = "Connection"
    )]
    conn_timeout_sec: u64,

    /// Deadline for the whole copy in seconds (0 = no deadline)
    #[arg(
        long,
        default_value = "30",
        value_name = "N",
        help_heading = "Connection"
    )]
    timeout_sec: u64,

    // Progress & output
    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads (0 = number of CPU cores)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads (0 = Tokio default of 512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    /// Enable file-based debug logging
    ///
    /// Example: /tmp/gcp-log creates /tmp/gcp-log-YYYY-MM-DDTHH-MM-SS-RANDOM
    #[arg(long, value_name = "PREFIX", help_heading = "Advanced settings")]
    debug_log_prefix: Option<String>,

    // ARGUMENTS
    /// Source path, local or `host:path`
    #[arg()]
    src: String,

    /// Destination path, local or `host:path`
    #[arg()]
    dst: String,
}

#[instrument]
async fn copy(args: &Args) -> anyhow::Result<remote::transfer::Summary> {
    let transfer = path::parse_transfer(&args.src, &args.dst)?;
    let conn_timeout = std::time::Duration::from_secs(args.conn_timeout_sec);
    match transfer {
        path::Transfer::Push { local, remote: dst } => {
            let channel = remote::rpc::Channel::new(dst.host(), args.port, conn_timeout);
            tracing::info!("pushing {local:?} to {}:{:?}", channel.addr(), dst.path());
            let result = client::copy_to_server(&channel, dst.path(), &local)
                .await
                .with_context(|| format!("failed to copy {local:?} to {}", args.dst))?;
            Ok(result.summary)
        }
        path::Transfer::Pull { remote: src, local } => {
            let channel = remote::rpc::Channel::new(src.host(), args.port, conn_timeout);
            tracing::info!("pulling {}:{:?} to {local:?}", channel.addr(), src.path());
            let summary = client::copy_from_server(&channel, src.path(), &local)
                .await
                .with_context(|| format!("failed to copy {} to {local:?}", args.src))?;
            Ok(summary)
        }
    }
}

async fn async_main(args: Args) -> anyhow::Result<remote::transfer::Summary> {
    if args.timeout_sec == 0 {
        return copy(&args).await;
    }
    let deadline = std::time::Duration::from_secs(args.timeout_sec);
    tokio::time::timeout(deadline, copy(&args))
        .await
        .with_context(|| format!("copy did not finish within {}s", args.timeout_sec))?
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let debug_log_file = args.debug_log_prefix.as_ref().map(|prefix| {
        let filename = common::generate_debug_log_filename(prefix);
        println!("gcp: Debug logging to file: {filename}");
        filename
    });
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary || args.verbose > 0,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let tracing = common::TracingConfig { debug_log_file };
    let res = common::run(output, runtime, tracing, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gcpd",
    version,
    about = "Copy server - accepts pushes from and serves pulls to `gcp`",
    long_about = "`gcpd` serves the CopyTo and CopyFrom calls made by `gcp`.

Every call is an independent transfer on its own connection. Files are written with mode 0700, replacing any existing content."
)]
struct Args {
    // Server
    /// Port to listen on
    #[arg(short, long, default_value_t = remote::rpc::DEFAULT_PORT, value_name = "PORT", help_heading = "Server")]
    port: u16,

    /// IP address to bind to
    #[arg(
        long,
        default_value = "0.0.0.0",
        value_name = "IP",
        help_heading = "Server"
    )]
    bind_ip: std::net::IpAddr,

    // Progress & output
    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
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
    /// Example: /tmp/gcpd-log creates /tmp/gcpd-log-YYYY-MM-DDTHH-MM-SS-RANDOM
    #[arg(long, value_name = "PREFIX", help_heading = "Advanced settings")]
    debug_log_prefix: Option<String>,
}

async fn async_main(args: Args) -> anyhow::Result<String> {
    let listener = remote::rpc::bind(args.bind_ip, args.port).await?;
    let addr = listener.local_addr()?;
    tracing::info!("serving on {addr}");
    eprintln!("gcpd: serving on {addr}");
    tokio::select! {
        result = gcp_tools_gcp::server::serve(listener) => {
            result?;
            Ok(format!("gcpd: listener on {addr} closed"))
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted, shutting down");
            Ok(format!("gcpd: stopped serving on {addr}"))
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let debug_log_file = args.debug_log_prefix.as_ref().map(|prefix| {
        let filename = common::generate_debug_log_filename(prefix);
        println!("gcpd: Debug logging to file: {filename}");
        filename
    });
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: false,
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

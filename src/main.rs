//! subcast - stream magnet links with auto-matched subtitles
//!
//! Lists a torrent through a remote streaming server, picks the video and
//! its subtitle, waits for the server to extract the subtitle track and
//! opens the stream in VLC or mpv.
//!
//! # Usage
//!
//! ```bash
//! subcast config set-key <KEY>
//! subcast play "magnet:?xt=urn:btih:..."
//! subcast resume --json
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subcast::cli::{Cli, Command, ExitCode, Output};
use subcast::commands::{self, Context};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so JSON on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let ctx = Context::load(cli.config);

    match cli.command {
        Command::Files(cmd) => commands::files_cmd(cmd, &ctx, &output).await,

        Command::Match(cmd) => commands::match_cmd(cmd, &ctx, &output).await,

        Command::Probe(cmd) => commands::probe_cmd(cmd, &ctx, &output).await,

        Command::Extract(cmd) => commands::extract_cmd(cmd, &ctx, &output).await,

        Command::Poll(cmd) => commands::poll_cmd(cmd, &ctx, &output).await,

        Command::Play(cmd) => commands::play_cmd(cmd, &ctx, &output).await,

        Command::Resume(cmd) => commands::resume_cmd(cmd, &ctx, &output).await,

        Command::Reset => commands::reset_cmd(&ctx, &output).await,

        Command::Progress(cmd) => commands::progress_cmd(cmd, &ctx, &output).await,

        Command::Health => commands::health_cmd(&ctx, &output).await,

        Command::KeyStatus => commands::key_status_cmd(&ctx, &output).await,

        Command::Config(cmd) => commands::config_cmd(cmd, ctx, &output).await,
    }
}

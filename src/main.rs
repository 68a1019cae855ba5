use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;

use crate::{
    config::{Config, Pacing},
    dedup::DedupTracker,
    logging::{AdminSink, LogContext},
    pipeline::{run_guarded, Relay, RelayOptions},
    sources::vk::VkClient,
    telegram::TelegramClient,
};

mod compose;
mod config;
mod dedup;
mod delivery;
mod error;
mod filter;
mod logging;
mod pipeline;
mod resolver;
mod sources;
mod splitter;
mod telegram;
#[cfg(test)]
mod test_utils;

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    /// Toml configuration. See README for more info.
    #[clap(short, long, value_parser, default_value = "vkrelay.toml")]
    config: PathBuf,

    /// Poll every feed once and exit, whatever the config says.
    #[clap(long, value_parser, default_value_t = false)]
    once: bool,

    /// Overrides `working_dir` from the config.
    #[clap(short, long, value_parser)]
    working_dir: Option<PathBuf>,
}

/// The CLI value is taken as given. A relative `working_dir` from the config
/// is relative to the config file, as is the default.
fn working_dir(cli: Option<&Path>, configured: Option<&Path>, config_path: &Path) -> PathBuf {
    if let Some(dir) = cli {
        return dir.to_path_buf();
    }

    let config_dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    match configured {
        Some(dir) => config_dir.join(dir),
        None => config_dir.to_path_buf(),
    }
}

fn admin_sink(cfg: &Config, pacing: &Pacing) -> anyhow::Result<Option<AdminSink>> {
    let channel = match &cfg.telegram.log_channel {
        Some(channel) if !channel.is_empty() => channel.clone(),
        _ => return Ok(None),
    };
    let token = match &cfg.telegram.log_token {
        Some(token) if !token.is_empty() => token.clone(),
        _ => cfg.telegram.token.clone(),
    };

    let client = TelegramClient::new(token).context("building log bot client")?;

    Ok(Some(AdminSink::new(Box::new(client), channel, pacing.before_log_forward)))
}

fn prepare_state(state_dir: &Path, cfg: &Config) -> anyhow::Result<()> {
    for feed in &cfg.feeds {
        let path = state_dir.join(feed.state_file());
        DedupTracker::ensure(&path).with_context(|| format!("creating {}", path.display()))?;
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg = Config::load(&args.config)
        .with_context(|| format!("reading config from {}", args.config.display()))?;
    let root = working_dir(
        args.working_dir.as_deref(),
        cfg.working_dir.as_deref(),
        &args.config,
    );

    logging::init(&root.join("logs").join(&cfg.logfile)).context("setting up logging")?;
    let log = LogContext::system();
    log.info("Started vkrelay");

    let options = RelayOptions {
        state_dir: root.join("jsons"),
        scratch_dir: root.join("temp"),
        max_ids: cfg.max_ids,
        max_send_attempts: cfg.max_send_attempts,
        pacing: Pacing::default(),
    };
    prepare_state(&options.state_dir, &cfg)?;

    let vk = VkClient::new(cfg.vk.token.clone(), cfg.vk.version.clone())?;
    let tg = TelegramClient::new(cfg.telegram.token.clone())?;
    let sink = admin_sink(&cfg, &options.pacing)?;
    let relay = Relay::new(&vk, &tg, &options, sink.as_ref());

    let single = args.once || cfg.single_start;
    loop {
        run_guarded(&relay, &cfg.feeds);

        if single {
            log.info("Script exited");
            break;
        }

        log.info(format!("Script went to sleep for {} seconds", cfg.sleep_secs));
        thread::sleep(Duration::from_secs(cfg.sleep_secs));
    }

    log.info("Script ended");
    Ok(())
}

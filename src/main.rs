use std::io;

use anyhow::Context;
use clap::Parser;

use oxyping::cli::Cli;
use oxyping::config::{self, ProxyEnv, Settings};
use oxyping::pinger::prelude::*;
use oxyping::pinger::{DEFAULT_COUNTER, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
use oxyping::probe::HttpSettings;

const DEFAULT_USER_AGENT: &str = concat!("oxyping/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let settings = cli.overlay(config::load_config(cli.config.as_deref())?);

    let target = build_target(&cli, &settings)?;
    let options = build_options(&target, &settings)?;
    let meta = settings.meta.unwrap_or(false);
    let http = HttpSettings {
        method: settings
            .http_method
            .clone()
            .unwrap_or_else(|| HttpSettings::default().method),
        trace: meta,
    };

    let registry = Registry::builtin(&http, meta);
    let probe = registry
        .build(&target, &options)
        .with_context(|| format!("cannot ping {target}"))?;
    log::info!("pinging {target} with the {} probe", probe.name());

    let mut pinger = Pinger::new(
        io::stdout(),
        target.clone(),
        probe,
        target.interval,
        target.counter,
        target.timeout,
    );
    pinger.start();

    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => Some(signal),
        _ = pinger.done() => None,
    };
    if let Some(Err(err)) = interrupted {
        log::warn!("cannot listen for ctrl-c: {err}");
        pinger.done().await;
    }

    pinger.stop();
    let outcome = pinger.wait().await;
    pinger.summarize().context("cannot write summary")?;
    match outcome {
        Ok(outcome) => {
            log::debug!("run ended: {outcome:?}");
            Ok(())
        }
        // Already reported on the output.
        Err(_) => std::process::exit(1),
    }
}

fn build_target(cli: &Cli, settings: &Settings) -> anyhow::Result<Target> {
    let mut target = Target::parse(&cli.address, cli.port)?;
    target.counter = settings.counter.unwrap_or(DEFAULT_COUNTER);
    target.timeout = settings.timeout.unwrap_or(DEFAULT_TIMEOUT);
    target.interval = settings.interval.unwrap_or(DEFAULT_INTERVAL);
    target.proxy = settings.proxy.clone().or_else(|| {
        let proxy = ProxyEnv::from_env().proxy_for(target.protocol, &target.host);
        if let Some(proxy) = &proxy {
            log::info!("Using proxy from environment: {proxy}");
        }
        proxy
    });
    Ok(target)
}

fn build_options(target: &Target, settings: &Settings) -> anyhow::Result<ProbeOptions> {
    let resolver = if settings.dns_servers.is_empty() {
        None
    } else {
        Some(config::setup_resolver(&settings.dns_servers)?)
    };
    let proxy = target
        .proxy
        .as_deref()
        .map(config::proxy_url)
        .transpose()?;
    Ok(ProbeOptions {
        timeout: target.timeout,
        resolver,
        proxy,
        user_agent: settings
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        insecure: settings.insecure.unwrap_or(false),
    })
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{Settings, parse_duration};

/// Ping a host over TCP, TLS, UDP, HTTP or HTTPS.
#[derive(Debug, Parser)]
#[command(name = "oxyping", version, about)]
pub struct Cli {
    /// Target, e.g. `example.com`, `tcp://example.com:22`,
    /// `udp://8.8.8.8` or `https://example.com/health`. Without a scheme
    /// the target is pinged over TCP.
    pub address: String,

    /// Port, overriding the one in the address.
    pub port: Option<u16>,

    /// Number of attempts, 0 runs until interrupted [default: 4]
    #[arg(short = 'c', long)]
    pub counter: Option<u32>,

    /// Timeout of a single attempt, e.g. `500ms` [default: 5s]
    #[arg(short = 'T', long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Pause between attempts [default: 1s]
    #[arg(short = 'I', long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Name server to resolve with instead of the system resolver.
    #[arg(short = 'D', long = "dns-server")]
    pub dns_servers: Vec<String>,

    /// HTTP method [default: GET]
    #[arg(long)]
    pub http_method: Option<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Show certificate details for TCP targets and phase timings for HTTP.
    #[arg(long)]
    pub meta: bool,

    /// HTTP proxy, e.g. `http://proxy.local:3128`.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Do not verify certificates of HTTPS targets.
    #[arg(long)]
    pub insecure: bool,

    /// YAML settings file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Applies the flags that were given on top of file `settings`.
    pub fn overlay(&self, mut settings: Settings) -> Settings {
        if self.counter.is_some() {
            settings.counter = self.counter;
        }
        if self.timeout.is_some() {
            settings.timeout = self.timeout;
        }
        if self.interval.is_some() {
            settings.interval = self.interval;
        }
        if !self.dns_servers.is_empty() {
            settings.dns_servers = self.dns_servers.clone();
        }
        if self.http_method.is_some() {
            settings.http_method = self.http_method.clone();
        }
        if self.user_agent.is_some() {
            settings.user_agent = self.user_agent.clone();
        }
        if self.proxy.is_some() {
            settings.proxy = self.proxy.clone();
        }
        if self.meta {
            settings.meta = Some(true);
        }
        if self.insecure {
            settings.insecure = Some(true);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "oxyping", "-c", "3", "-T", "250ms", "-I", "2s", "-D", "1.1.1.1", "-D", "8.8.8.8",
            "--meta", "https://example.com", "8443",
        ])
        .unwrap();
        assert_eq!(cli.address, "https://example.com");
        assert_eq!(cli.port, Some(8443));
        assert_eq!(cli.counter, Some(3));
        assert_eq!(cli.timeout, Some(Duration::from_millis(250)));
        assert_eq!(cli.interval, Some(Duration::from_secs(2)));
        assert_eq!(cli.dns_servers, vec!["1.1.1.1", "8.8.8.8"]);
        assert!(cli.meta);
        assert!(!cli.insecure);
    }

    #[test]
    fn rejects_bad_duration() {
        assert!(Cli::try_parse_from(["oxyping", "-T", "soon", "example.com"]).is_err());
    }

    #[test]
    fn flags_override_file_settings() {
        let file = Settings {
            counter: Some(10),
            interval: Some(Duration::from_secs(5)),
            dns_servers: vec!["9.9.9.9".into()],
            meta: Some(false),
            ..Default::default()
        };
        let cli = Cli::try_parse_from(["oxyping", "-c", "2", "--meta", "example.com"]).unwrap();
        let merged = cli.overlay(file);
        assert_eq!(merged.counter, Some(2));
        assert_eq!(merged.interval, Some(Duration::from_secs(5)));
        assert_eq!(merged.dns_servers, vec!["9.9.9.9"]);
        assert_eq!(merged.meta, Some(true));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

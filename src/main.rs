//! httap: wiretaps HTTP traffic and forwards copies of it.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                      HTTAP                        │
//!                        │                                                   │
//!   Network interface    │  ┌─────────┐   ┌────────────┐   ┌─────────────┐  │
//!   ─────────────────────┼─▶│ capture │──▶│ reassembly │──▶│ http reader │  │
//!   (client → server)    │  │  pcap   │   │ flow table │   │ per flow    │  │
//!                        │  └─────────┘   └────────────┘   └──────┬──────┘  │
//!                        │                                        │         │
//!                        │                                        ▼         │
//!                        │  ┌──────────┐   ┌────────────┐   ┌─────────────┐  │
//!   Destination servers  │  │transport │◀──│  dispatch  │◀──│  forward    │  │
//!   ◀────────────────────┼──│  hyper   │   │ now/delay  │   │ filter/copy │  │
//!                        │  └──────────┘   └────────────┘   └─────────────┘  │
//!                        │                                                   │
//!                        │   config · observability · lifecycle              │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use httap::capture;
use httap::config::{load_config, HeaderRuleConfig, WiretapConfig};
use httap::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "httap", version, about = "Wiretaps and forwards HTTP traffic")]
#[command(override_usage = "httap [OPTIONS] [--src HOST:PORT ...] --dst HOST:PORT ...")]
struct Cli {
    /// TOML configuration file. Flags given here override it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interface to wiretap (defaults to the first available one).
    #[arg(short, long)]
    interface: Option<String>,

    /// Source HOST:PORT to wiretap. Repeatable; omit to tap all TCP traffic.
    #[arg(short, long = "src", value_name = "HOST:PORT")]
    src: Vec<String>,

    /// Destination HOST:PORT to forward to. Repeatable. `:PORT` keeps the
    /// original server's host.
    #[arg(short, long = "dst", value_name = "HOST:PORT")]
    dst: Vec<String>,

    /// Only forward this method. Repeatable.
    #[arg(short, long = "method", value_name = "METHOD")]
    method: Vec<String>,

    /// Set a request header, or remove it with an empty value. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    header: Vec<String>,

    /// Forward this many copies per destination; fractions are probabilistic.
    #[arg(short = 'x', long)]
    multiply: Option<f64>,

    /// Seconds between successive copies of a request.
    #[arg(short = 'r', long = "repeat-delay", value_name = "SECONDS")]
    repeat_delay: Option<f64>,

    /// Print every forwarded request head to stdout.
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// List capture interfaces and exit.
    #[arg(long)]
    list_interfaces: bool,
}

impl Cli {
    /// Overlays the flags that were given onto `config`.
    fn apply(self, config: &mut WiretapConfig) -> Result<(), String> {
        if self.interface.is_some() {
            config.capture.interface = self.interface;
        }
        if !self.src.is_empty() {
            config.capture.sources = self.src;
        }
        if !self.dst.is_empty() {
            config.forward.destinations = self.dst;
        }
        if !self.method.is_empty() {
            config.forward.methods = self.method;
        }
        if !self.header.is_empty() {
            config.forward.headers = self
                .header
                .iter()
                .map(|raw| parse_header_flag(raw))
                .collect::<Result<_, _>>()?;
        }
        if let Some(multiply) = self.multiply {
            config.forward.multiply = multiply;
        }
        if let Some(secs) = self.repeat_delay {
            if !secs.is_finite() || secs < 0.0 {
                return Err(format!("invalid repeat delay: {secs}"));
            }
            config.forward.repeat_delay_ms = (secs * 1000.0).round() as u64;
        }
        if self.verbose {
            config.forward.verbose = true;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        Ok(())
    }
}

fn parse_header_flag(raw: &str) -> Result<HeaderRuleConfig, String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header must be NAME:VALUE, got {raw:?}"))?;
    Ok(HeaderRuleConfig {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A bare invocation asks for usage, not for a capture with no destinations.
    if std::env::args_os().len() <= 1 {
        Cli::command().print_help()?;
        return Ok(());
    }
    let cli = Cli::parse();

    if cli.list_interfaces {
        for line in capture::list_interfaces()? {
            println!("{line}");
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => WiretapConfig::default(),
    };
    cli.apply(&mut config)?;

    logging::init_tracing(&config.observability);
    tracing::info!("httap v{} starting", env!("CARGO_PKG_VERSION"));

    httap::lifecycle::run(config).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let mut config = WiretapConfig::default();
        config.forward.destinations = vec!["10.0.0.1:80".into()];
        config.forward.multiply = 3.0;

        let cli = Cli::parse_from([
            "httap", "-d", ":9090", "-d", "10.0.0.2:80", "-H", "X-Shadow: yes", "-r", "0.25",
        ]);
        cli.apply(&mut config).unwrap();

        assert_eq!(config.forward.destinations, vec![":9090", "10.0.0.2:80"]);
        assert_eq!(config.forward.multiply, 3.0);
        assert_eq!(config.forward.repeat_delay_ms, 250);
        assert_eq!(config.forward.headers[0].name, "X-Shadow");
        assert_eq!(config.forward.headers[0].value, "yes");
    }

    #[test]
    fn help_describes_usage() {
        let help = Cli::command().render_help().to_string();
        assert!(help.contains("Wiretaps and forwards HTTP traffic"));
        assert!(help.contains("[--src HOST:PORT ...] --dst HOST:PORT ..."));
        assert!(help.contains("--list-interfaces"));
    }

    #[test]
    fn empty_header_value_is_kept_for_removal() {
        let rule = parse_header_flag("User-Agent:").unwrap();
        assert_eq!(rule.name, "User-Agent");
        assert!(rule.value.is_empty());
        assert!(parse_header_flag("no-colon").is_err());
    }

    #[test]
    fn negative_repeat_delay_is_rejected() {
        let cli = Cli::parse_from(["httap", "-d", ":80", "--repeat-delay=-1"]);
        assert!(cli.apply(&mut WiretapConfig::default()).is_err());
    }
}

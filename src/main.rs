//! fertilizer CLI
//!
//! Scans .torrent files from one of RED/OPS, looks the content up on the
//! sibling tracker, and writes (and optionally injects) cross-seedable
//! metafiles.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Parser};

use fertilizer::api::GazelleApi;
use fertilizer::config::{ConfigValidator, build_config_map};
use fertilizer::injection::Injection;
use fertilizer::scanner::{scan_torrent_directory, scan_torrent_file};
use fertilizer::webserver::run_webserver;

#[derive(Parser)]
#[command(name = "fertilizer")]
#[command(about = "An open source cross-seeder for RED & OPS")]
#[command(group(ArgGroup::new("input").required(true).args(["input_directory", "input_file"])))]
struct Cli {
    /// directory with the .torrent files to check
    #[arg(short = 'i', long)]
    input_directory: Option<PathBuf>,

    /// filepath of the single .torrent file to check
    #[arg(short = 'f', long)]
    input_file: Option<PathBuf>,

    /// directory where cross-seedable .torrent files will be saved
    #[arg(short = 'o', long)]
    output_directory: PathBuf,

    /// starts fertilizer in server mode. Requires -i/--input-directory
    #[arg(short = 's', long, requires = "input_directory")]
    server: bool,

    /// enables verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// path to a configuration file
    #[arg(short = 'c', long, default_value = "config.json")]
    config_file: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fertilizer=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli_entrypoint(&cli) {
        if cli.verbose {
            eprintln!("{e:?}");
        }
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn cli_entrypoint(cli: &Cli) -> anyhow::Result<()> {
    // single-file mode is probably running as a script, where extra
    // printing wouldn't be appreciated
    let should_print = cli.input_directory.is_some() || cli.server;

    let env: HashMap<String, String> = std::env::vars().collect();
    let config = command_log_wrapper("Reading configuration:", should_print, || {
        let config_map = build_config_map(&cli.config_file, &env)?;
        Ok(ConfigValidator::new(config_map).validate()?)
    })?;

    let injector = if config.inject_torrents {
        Some(command_log_wrapper(
            "Connecting to torrent client:",
            should_print,
            || {
                let injection = Injection::from_config(&config)?;
                injection.setup()?;
                Ok(injection)
            },
        )?)
    } else {
        None
    };

    let (red_api, ops_api) = command_log_wrapper("Verifying API keys:", should_print, || {
        let red_api = GazelleApi::red(&config.red_key)?;
        let ops_api = GazelleApi::ops(&config.ops_key)?;

        // Performs one lookup per site and fails fast on bad keys; also
        // caches the announce URLs for later generation
        red_api.announce_url()?;
        ops_api.announce_url()?;

        Ok((red_api, ops_api))
    })?;

    if cli.server {
        let Some(input_directory) = &cli.input_directory else {
            anyhow::bail!("--server requires --input-directory");
        };

        run_webserver(
            input_directory,
            &cli.output_directory,
            Arc::new(red_api),
            Arc::new(ops_api),
            injector.map(Arc::new),
            config.server_port,
        )?;

        // the server only returns after an interrupt
        println!("Exiting...");
        std::process::exit(1);
    } else if let Some(input_file) = &cli.input_file {
        let new_filepath = scan_torrent_file(
            input_file,
            &cli.output_directory,
            &red_api,
            &ops_api,
            injector.as_ref(),
        )?;
        println!("{}", new_filepath.display());
    } else if let Some(input_directory) = &cli.input_directory {
        let report = scan_torrent_directory(
            input_directory,
            &cli.output_directory,
            &red_api,
            &ops_api,
            injector.as_ref(),
        )?;
        println!("{report}");
    }

    Ok(())
}

fn command_log_wrapper<T>(
    label: &str,
    should_print: bool,
    func: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    if should_print {
        print!("{label} ");
        std::io::stdout().flush().ok();
    }

    match func() {
        Ok(result) => {
            if should_print {
                println!("Success");
            }
            Ok(result)
        }
        Err(e) => {
            if should_print {
                println!("Error");
            }
            Err(e)
        }
    }
}

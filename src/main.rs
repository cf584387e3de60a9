//! tc-config command line tool
//!
//! Resolves a configuration document and prints the result.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use tc_config::common::fs::source_directory;
use tc_config::common::init_logger;
use tc_config::config::defaults::LOG_LEVEL_STR;
use tc_config::plugin::StaticPlugins;
use tc_config::{Result, TcConfiguration, TcConfigurationParser, APP_NAME, VERSION};

/// Resolve and print a tc-config document
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration document
    file: PathBuf,

    /// Report every validation issue instead of stopping at the first
    #[clap(long)]
    collect: bool,

    /// Log level
    #[clap(long, env = "TC_CONFIG_LOG_LEVEL", default_value = LOG_LEVEL_STR)]
    log_level: String,

    /// Print the resolved configuration as JSON
    #[clap(long)]
    json: bool,
}

fn resolve(args: &Args, parser: &TcConfigurationParser) -> Result<TcConfiguration> {
    if !args.collect {
        return parser.parse_file(&args.file);
    }

    let mut issues = Vec::new();
    let file = File::open(&args.file)?;
    let source = source_directory(&args.file);
    let result = parser.parse_reader_collecting(file, &mut issues, source.as_deref());
    for issue in &issues {
        error!("{}: {}", args.file.display(), issue);
    }
    result
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logger(&args.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    let parser = TcConfigurationParser::new(StaticPlugins::empty());
    match resolve(&args, &parser) {
        Ok(configuration) => {
            if args.json {
                println!("{}", configuration);
            } else {
                for server in configuration.servers() {
                    println!(
                        "{}\thost={}\tbind={}\ttsa-port={}",
                        server.display_name(),
                        server.host.as_deref().unwrap_or(""),
                        server.bind.as_deref().unwrap_or(""),
                        server.tsa_port_value()
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

//! XMLTV -> JSON converter for the tvguide client

use argparse::{ArgumentParser, Store, StoreOption, StoreTrue};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use tvguide::convert::{self, ConvertOptions};

struct CliArgs {
    url: String,
    input: Option<PathBuf>,
    out: PathBuf,
    categories: PathBuf,
    keep_feed: bool,
    log_level: String,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            url: convert::DEFAULT_FEED_URL.into(),
            input: None,
            out: PathBuf::from(convert::DEFAULT_OUT_DIR),
            categories: PathBuf::from(convert::DEFAULT_CATEGORIES_PATH),
            keep_feed: false,
            log_level: "info".into(),
        }
    }
}

fn parse_cli() -> CliArgs {
    let mut args = CliArgs::default();
    {
        let mut ap = ArgumentParser::new();
        ap.set_description("Convert an XMLTV feed into the JSON files read by tvguide");
        ap.refer(&mut args.url)
            .add_option(&["--url"], Store, "Feed URL (zip, gzip or plain XML)");
        ap.refer(&mut args.input)
            .add_option(&["-i", "--input"], StoreOption, "Local feed file, skips the download");
        ap.refer(&mut args.out)
            .add_option(&["-o", "--out"], Store, "Output directory");
        ap.refer(&mut args.categories)
            .add_option(&["-c", "--categories"], Store, "Category mapping (TOML)");
        ap.refer(&mut args.keep_feed)
            .add_option(&["--keep-feed"], StoreTrue, "Keep the downloaded archive and extracted XML");
        ap.refer(&mut args.log_level)
            .add_option(&["--log"], Store, "Log level (info|debug|trace|warn|error)");
        ap.parse_args_or_exit();
    }
    args
}

fn setup_logging(level: &str) {
    let env = Env::default().filter_or("RUST_LOG", match level {
        "debug" => "debug",
        "trace" => "trace",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    });
    env_logger::Builder::from_env(env).init();
}

fn main() -> ExitCode {
    let args = parse_cli();
    setup_logging(&args.log_level);

    let options = ConvertOptions {
        url: args.url,
        input: args.input,
        out_dir: args.out,
        categories_path: args.categories,
        keep_feed: args.keep_feed,
        ..Default::default()
    };

    match convert::run(&options) {
        Ok(report) => {
            if !report.unmapped.is_empty() {
                info!("Unmapped categories: {}", report.unmapped.join(", "));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

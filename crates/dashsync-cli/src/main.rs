use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dashsync_cli::{
    init_logging, load_config, render_config, run_simulator, LogFormat, SimulatorConfig,
};
use std::path::PathBuf;
use std::time::Duration;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file");

    Command::new("dashsync")
        .version(dashsync_cli::VERSION)
        .about("Dashboard data synchronization coordinator")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON on stderr"),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Drive a provider against a simulated collaborator")
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("rounds")
                        .long("rounds")
                        .default_value("5")
                        .value_parser(value_parser!(u32))
                        .help("Number of load bursts"),
                )
                .arg(
                    Arg::new("burst")
                        .long("burst")
                        .default_value("4")
                        .value_parser(value_parser!(u32))
                        .help("Overlapping loads per domain per burst"),
                )
                .arg(
                    Arg::new("latency-ms")
                        .long("latency-ms")
                        .default_value("50")
                        .value_parser(value_parser!(u64))
                        .help("Upper bound of simulated collaborator latency"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.1")
                        .value_parser(parse_rate)
                        .help("Probability that a collaborator call fails"),
                )
                .arg(
                    Arg::new("force-rate")
                        .long("force-rate")
                        .default_value("0.2")
                        .value_parser(parse_rate)
                        .help("Probability that a load is forced"),
                )
                .arg(config_arg.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output report as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration")
                .arg(config_arg)
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON instead of TOML"),
                ),
        )
}

fn parse_rate(raw: &str) -> Result<f64, String> {
    let rate: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if rate.is_finite() && (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("{raw} is not a probability between 0 and 1"))
    }
}

fn config_path(args: &ArgMatches) -> Option<&PathBuf> {
    args.get_one::<PathBuf>("config")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let format = if matches.get_flag("log-json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(format)?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let sync = load_config(config_path(args).map(PathBuf::as_path))?;
            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                rounds: args.get_one::<u32>("rounds").copied().unwrap_or(5),
                burst: args.get_one::<u32>("burst").copied().unwrap_or(4),
                max_latency: Duration::from_millis(
                    args.get_one::<u64>("latency-ms").copied().unwrap_or(50),
                ),
                failure_rate: args.get_one::<f64>("failure-rate").copied().unwrap_or(0.1),
                force_rate: args.get_one::<f64>("force-rate").copied().unwrap_or(0.2),
                sync,
            };

            let report = run_simulator(config).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("config", args)) => {
            let config = load_config(config_path(args).map(PathBuf::as_path))?;
            print!("{}", render_config(&config, args.get_flag("json"))?);
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

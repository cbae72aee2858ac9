use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use log::debug;

use RustSPN::config::SpnConfig;
use RustSPN::net::io;
use RustSPN::options::Options;
use RustSPN::sim::{self, SimulationOptions, Verbosity};

fn main() -> ExitCode {
    if std::env::var("SPN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("SPN_LOG")
            .write_style("SPN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let from_env = Options::parse_from_str(&std::env::var("SPN_FLAGS").unwrap_or_default())
        .map_err(|e| anyhow!("invalid SPN_FLAGS: {e}"))?;
    debug!("SPN options from environment: {:?}", from_env);

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let options = Options::parse_from_args(&args)
        .map_err(|e| anyhow!("{e}"))?
        .merge(from_env);
    debug!("SPN options: {:?}", options);

    let net_path = options
        .net
        .clone()
        .context("no net description given; usage: spn <net-file> [options]")?;
    let config = SpnConfig::load_from_file(&options.config)?;
    let sim_options = simulation_options(&config, &options)?;

    let description = io::read_description(&net_path)
        .with_context(|| format!("Failed to load net description: {:?}", net_path))?;
    let build = || description.build_with(config.net_config());

    if options.runs > 1 {
        let reports = sim::replicate(build, options.runs, &sim_options)?;
        for (i, report) in reports.iter().enumerate() {
            if options.json {
                println!("{}", serde_json::to_string(report)?);
            } else {
                println!("== replication {} ==\n{report}", i + 1);
            }
        }
        return Ok(());
    }

    let mut net = build().context("Failed to build net")?;
    let report = sim::simulate(&mut net, &sim_options)?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    if let Some(path) = &options.protocol {
        let events = report.events.clone().unwrap_or_default();
        write_output(path, &events)?;
    }
    if let Some(path) = &options.snapshot {
        write_output(path, &net.snapshot())?;
    }
    if let Some(path) = &options.dot {
        net.snapshot()
            .write_dot(path)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }
    Ok(())
}

fn simulation_options(config: &SpnConfig, options: &Options) -> Result<SimulationOptions> {
    let mut sim_options = config.to_options()?;
    if let Some(max_time) = options.max_time {
        sim_options.max_time = max_time;
    }
    if let Some(level) = options.verbosity {
        sim_options.verbosity = Verbosity::from_level(level);
    }
    if let Some(seed) = options.seed {
        sim_options.seed = Some(seed);
    }
    if options.protocol.is_some() {
        sim_options.protocol = true;
    }
    // trace output goes through `log`, so make sure something is listening
    if sim_options.verbosity > Verbosity::Silent && std::env::var("SPN_LOG").is_err() {
        let _ = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .try_init();
    }
    Ok(sim_options)
}

fn write_output<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    io::write(path, value).with_context(|| format!("Failed to write {:?}", path))
}

//! Parsing Options.
//! `spn <net-file> [--config FILE] [--max-time T] [--verbosity 0|1|2] ...`

use clap::{Arg, ArgAction, Command, value_parser};
use std::error::Error;
use std::path::PathBuf;

fn make_options_parser() -> clap::Command {
    let parser = Command::new("spn")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Discrete-event simulator for stochastic Petri nets")
        .arg(
            Arg::new("net")
                .value_name("NET_FILE")
                .help("Net description (.json, .ron, .yaml or .toml)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration with dimensions and simulation defaults")
                .default_value("spn.toml")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("max-time")
                .short('t')
                .long("max-time")
                .value_name("T")
                .help("Simulation horizon, overrides the configuration")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .value_parser(value_parser!(u8).range(0..=2)),
        )
        .arg(
            Arg::new("protocol")
                .short('p')
                .long("protocol")
                .value_name("FILE")
                .help("Write the event log to FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .value_name("FILE")
                .help("Write the final net snapshot to FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Write a Graphviz rendering of the final net to FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("runs")
                .short('r')
                .long("runs")
                .help("Number of independent replications")
                .default_value("1")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the report as JSON")
                .action(ArgAction::SetTrue),
        );
    parser
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub net: Option<PathBuf>,
    pub config: PathBuf,
    pub max_time: Option<f64>,
    pub verbosity: Option<u8>,
    pub protocol: Option<PathBuf>,
    pub snapshot: Option<PathBuf>,
    pub dot: Option<PathBuf>,
    pub seed: Option<u64>,
    pub runs: usize,
    pub json: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            net: None,
            config: PathBuf::from("spn.toml"),
            max_time: None,
            verbosity: None,
            protocol: None,
            snapshot: None,
            dot: None,
            seed: None,
            runs: 1,
            json: false,
        }
    }
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;
        let runs = matches.get_one::<usize>("runs").copied().unwrap_or(1);
        if runs == 0 {
            return Err("--runs must be at least 1".into());
        }

        Ok(Options {
            net: matches.get_one::<PathBuf>("net").cloned(),
            config: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("spn.toml")),
            max_time: matches.get_one::<f64>("max-time").copied(),
            verbosity: matches.get_one::<u8>("verbosity").copied(),
            protocol: matches.get_one::<PathBuf>("protocol").cloned(),
            snapshot: matches.get_one::<PathBuf>("snapshot").cloned(),
            dot: matches.get_one::<PathBuf>("dot").cloned(),
            seed: matches.get_one::<u64>("seed").copied(),
            runs,
            json: matches.get_flag("json"),
        })
    }

    /// Fills the fields left unset in `self` from `fallback`.
    pub fn merge(self, fallback: Options) -> Options {
        let defaults = Options::default();
        Options {
            net: self.net.or(fallback.net),
            config: if self.config == defaults.config {
                fallback.config
            } else {
                self.config
            },
            max_time: self.max_time.or(fallback.max_time),
            verbosity: self.verbosity.or(fallback.verbosity),
            protocol: self.protocol.or(fallback.protocol),
            snapshot: self.snapshot.or(fallback.snapshot),
            dot: self.dot.or(fallback.dot),
            seed: self.seed.or(fallback.seed),
            runs: if self.runs == defaults.runs {
                fallback.runs
            } else {
                self.runs
            },
            json: self.json || fallback.json,
        }
    }
}

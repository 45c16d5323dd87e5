//! Parsing Options.
//! `pn <NET> [-c CONFIG] [-l LIMIT] [--dot FILE] [--json FILE] [--parallel] [--format json|ron]`

use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;

use crate::config::ExplorerConfig;
use crate::net::io::Format;

fn make_options_parser() -> clap::Command {
    Command::new("pn")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Build the reachability graph of a coloured Petri net")
        .arg(
            Arg::new("net")
                .value_name("NET")
                .help("Net description (.json or .ron)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML file with exploration settings")
                .default_value("pn.toml"),
        )
        .arg(
            Arg::new("state-limit")
                .short('l')
                .long("state-limit")
                .value_name("N")
                .help("Stop discovering states after N states")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Write the state graph in DOT format"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("FILE")
                .help("Write the state graph summary"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .help("Compute transition modes in parallel")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Format of the summary written by --json")
                .default_value("json")
                .value_parser(["json", "ron"]),
        )
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Options {
    pub net: Option<PathBuf>,
    pub config: PathBuf,
    pub state_limit: Option<usize>,
    pub dot: Option<PathBuf>,
    pub json: Option<PathBuf>,
    pub parallel: bool,
    pub format: Format,
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let format = match matches.get_one::<String>("format").map(String::as_str) {
            Some(name) => Format::parse(name).ok_or("UnsupportedFormat")?,
            None => Format::Json,
        };

        Ok(Options {
            net: matches.get_one::<String>("net").map(PathBuf::from),
            config: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_default(),
            state_limit: matches.get_one::<usize>("state-limit").copied(),
            dot: matches.get_one::<String>("dot").map(PathBuf::from),
            json: matches.get_one::<String>("json").map(PathBuf::from),
            parallel: matches.get_flag("parallel"),
            format,
        })
    }

    /// 用 `other` 中显式给出的选项覆盖本选项。
    pub fn merge(self, other: Options) -> Options {
        Options {
            net: other.net.or(self.net),
            config: if other.config.as_os_str().is_empty() || other.config == PathBuf::from("pn.toml")
            {
                self.config
            } else {
                other.config
            },
            state_limit: other.state_limit.or(self.state_limit),
            dot: other.dot.or(self.dot),
            json: other.json.or(self.json),
            parallel: self.parallel || other.parallel,
            format: if other.format == Format::default() {
                self.format
            } else {
                other.format
            },
        }
    }

    /// 命令行选项优先于配置文件。
    pub fn apply(&self, mut config: ExplorerConfig) -> ExplorerConfig {
        if self.state_limit.is_some() {
            config.state_limit = self.state_limit;
        }
        if self.dot.is_some() {
            config.dot_output = self.dot.clone();
        }
        if self.json.is_some() {
            config.json_output = self.json.clone();
        }
        config.parallel_modes |= self.parallel;
        config
    }
}

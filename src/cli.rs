//! Command-line surface (spec §6): `banner`, `config <host>...` and
//! `install <host>...`, sharing the same run flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const BANNER: &str = r#"
  ___  _____ _      _
 / __\/  _  \ |    /_\
| (__ | |_| | |__ //_\\
 \___||___ /\____/\_/ \_\
cdist-rs :: push-mode configuration engine
"#;

#[derive(Parser, Debug)]
#[command(name = "cdist", about = "Push-mode host configuration engine", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    pub fn build_command() -> clap::Command {
        use clap::CommandFactory;
        let cmd = Self::command();
        cmd.after_help(format!(
            "Detailed Command Information:
{0}
  banner
    Print the banner and exit.

  config <HOST>... [OPTIONS]
    Converge each HOST's configuration against its manifests/types.

  install <HOST>... [OPTIONS]
    Alias of `config`: cdist makes no operational distinction between
    the two beyond the name a deployment chooses to invoke.

    Options (shared by config/install):
      -c, --cdist-home <DIR>        Root holding conf/{{type,explorer,manifest}}
                                     (default: $CDIST_HOME or ./cdist).
      -i, --initial-manifest <FILE> Override conf/manifest/init.
      -p, --parallel                Run all hosts concurrently.
      -s, --sequential               Run hosts one at a time (default).
      -d, --debug                   Verbose logging, including remote command lines.
",
            BANNER
        ))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the banner and exit
    Banner,
    /// Converge configuration on one or more hosts
    Config(RunArgs),
    /// Alias of `config`
    Install(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Target hosts, passed to ssh as-is
    #[arg(required = true)]
    pub hosts: Vec<String>,

    /// Root directory holding conf/{type,explorer,manifest}
    #[arg(short = 'c', long = "cdist-home", value_name = "DIR")]
    pub cdist_home: Option<PathBuf>,

    /// Override conf/manifest/init
    #[arg(short = 'i', long = "initial-manifest", value_name = "FILE")]
    pub initial_manifest: Option<PathBuf>,

    /// Run all hosts concurrently
    #[arg(short = 'p', long = "parallel", conflicts_with = "sequential")]
    pub parallel: bool,

    /// Run hosts one at a time (default)
    #[arg(short = 's', long = "sequential")]
    pub sequential: bool,

    /// Remote user ssh connects as
    #[arg(long = "remote-user", default_value = "root")]
    pub remote_user: String,

    /// Verbose logging
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

impl RunArgs {
    pub fn resolved_cdist_home(&self) -> PathBuf {
        self.cdist_home.clone().unwrap_or_else(|| {
            std::env::var("CDIST_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cdist"))
        })
    }
}

pub fn print_banner() {
    println!("{BANNER}");
}

// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};
use tracing::Level;

use crate::core::planner::Shard;
use crate::core::trigger::EventKind;
use crate::infra::{t, telemetry};

pub mod commands {
    pub mod init;
    pub mod plan;
    pub mod run;
}

/// Default workflow file name, looked up in the current directory.
pub const DEFAULT_WORKFLOW_FILE: &str = "Workflow.toml";

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` or `--lang=<VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        return args.get(pos + 1).cloned();
    }
    args.iter()
        .find_map(|arg| arg.strip_prefix("--lang=").map(str::to_string))
}

fn config_arg(locale: &str) -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help(t!("cli.arg_config", locale = locale).to_string())
        .value_name("CONFIG")
        .default_value(DEFAULT_WORKFLOW_FILE)
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

fn shard_args(locale: &str) -> [Arg; 2] {
    [
        Arg::new("total-runners")
            .long("total-runners")
            .help(t!("cli.arg_total_runners", locale = locale).to_string())
            .value_name("TOTAL_RUNNERS")
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set)
            .requires("runner-index"),
        Arg::new("runner-index")
            .long("runner-index")
            .help(t!("cli.arg_runner_index", locale = locale).to_string())
            .value_name("RUNNER_INDEX")
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set)
            .requires("total-runners"),
    ]
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("matrix-ci")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.arg_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help(t!("cli.arg_verbose", locale = locale).to_string())
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.cmd_run_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("cli.arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .help(t!("cli.arg_project_dir", locale = locale).to_string())
                        .value_name("PROJECT_DIR")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help(t!("cli.arg_timeout", locale = locale).to_string())
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("event")
                        .long("event")
                        .help(t!("cli.arg_event", locale = locale).to_string())
                        .value_name("EVENT")
                        .default_value("manual")
                        .value_parser(|s: &str| s.parse::<EventKind>())
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("ref")
                        .long("ref")
                        .help(t!("cli.arg_ref", locale = locale).to_string())
                        .value_name("REF")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("sha")
                        .long("sha")
                        .help(t!("cli.arg_sha", locale = locale).to_string())
                        .value_name("SHA")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("label")
                        .long("label")
                        .help(t!("cli.arg_label", locale = locale).to_string())
                        .value_name("LABEL")
                        .action(ArgAction::Append),
                )
                .args(shard_args(locale))
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("cli.arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("events-log")
                        .long("events-log")
                        .help(t!("cli.arg_events_log", locale = locale).to_string())
                        .value_name("PATH")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about(t!("cli.cmd_plan_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .args(shard_args(locale))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("cli.arg_json", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_output", locale = locale).to_string())
                        .value_name("PATH")
                        .default_value(DEFAULT_WORKFLOW_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn shard_from(matches: &ArgMatches) -> Option<Shard> {
    let total = matches.get_one::<usize>("total-runners").copied()?;
    let index = matches.get_one::<usize>("runner-index").copied()?;
    Some(Shard { index, total })
}

fn config_from(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOW_FILE))
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let requested_lang = pre_parse_language();
    let language = crate::resolve_locale(requested_lang.as_deref());
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();

    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::WARN
    };
    telemetry::init_tracing(level);

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = commands::run::RunArgs {
                config: config_from(run_matches),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                project_dir: run_matches
                    .get_one::<PathBuf>("project-dir")
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(".")),
                timeout_secs: run_matches.get_one::<u64>("timeout").copied(),
                event: run_matches
                    .get_one::<EventKind>("event")
                    .copied()
                    .unwrap_or(EventKind::Manual),
                git_ref: run_matches.get_one::<String>("ref").cloned(),
                sha: run_matches.get_one::<String>("sha").cloned(),
                labels: run_matches
                    .get_many::<String>("label")
                    .map(|labels| labels.cloned().collect())
                    .unwrap_or_default(),
                shard: shard_from(run_matches),
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                events_log: run_matches.get_one::<PathBuf>("events-log").cloned(),
                lang: requested_lang,
            };
            commands::run::execute(args).await
        }
        Some(("plan", plan_matches)) => commands::plan::execute(
            &config_from(plan_matches),
            shard_from(plan_matches),
            plan_matches.get_flag("json"),
            &language,
        ),
        Some(("init", init_matches)) => {
            let output = init_matches
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKFLOW_FILE));
            let non_interactive = init_matches.get_flag("non-interactive");

            // Show language detection message if it was auto-detected
            if requested_lang.is_none() && !non_interactive {
                println!(
                    "{}",
                    t!("init.system_language_detected", locale = &language, lang = &language)
                );
            }
            commands::init::execute(&output, &language, non_interactive)
        }
        // `subcommand_required` makes clap exit with usage before we get here.
        _ => Ok(()),
    }
}

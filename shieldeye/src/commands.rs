use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{arg, command};
use std::path::PathBuf;

pub const CLAP_STYLING: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
    .valid(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .invalid(AnsiColor::Yellow.on_default().effects(Effects::BOLD));

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("shieldeye")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("shieldeye")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner, progress and log output").global(true))
        .arg(
            arg!(-v --"verbose" ... "Raise log verbosity (-v debug, -vv trace)")
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("scan")
                .about(
                    "Crawl a website within page and depth limits and run security and \
                compliance checks on every page.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required_unless_present("request")
                        .help("Start URL. A missing scheme defaults to https://")
                        .conflicts_with("request"),
                )
                .arg(
                    arg!(-r --"request" <PATH>)
                        .required(false)
                        .help("Load the scan request from a JSON file; other flags override its fields")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-T --"template" <NAME>)
                        .required(false)
                        .help("Start from a built-in scan template (see `shieldeye templates`); other flags override it")
                        .conflicts_with("request"),
                )
                .arg(
                    arg!(-s --"standard" <STANDARD>)
                        .required(false)
                        .help("Compliance standard to check: GDPR, PCI-DSS or \"ISO 27001\". Repeatable.")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(-m --"mode" <MODE>)
                        .required(false)
                        .help("Scan mode: \"Quick/Safe\" (10 pages, depth 2) or \"Aggressive/Full\" (50 pages, depth 5)"),
                )
                .arg(
                    arg!(--"max-pages" <NUM>)
                        .required(false)
                        .help("Override the mode's page limit (at most 1000)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-depth" <NUM>)
                        .required(false)
                        .help("Override the mode's depth limit (at most 10)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-t --"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds (default: 10)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-k --"insecure")
                        .required(false)
                        .help("Do not verify TLS certificates when fetching pages")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"user-agent" <AGENT>)
                        .required(false)
                        .help("User-Agent header to send"),
                )
                .arg(
                    arg!(--"rate" <RPS>)
                        .required(false)
                        .help("Requests per second per domain; 0 disables rate limiting")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("5"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text or json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("templates")
                .about("List the built-in scan templates.")
                .arg(
                    arg!(--"tag" <TAG>)
                        .required(false)
                        .help("Only show templates carrying this tag. Repeatable.")
                        .action(clap::ArgAction::Append),
                ),
        )
}

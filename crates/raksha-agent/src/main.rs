use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use raksha_agent::{init_tracing, AgentConfig, RakshaApp, CONFIG_ENV};
use raksha_cache::Request;
use raksha_safety::{
    Coordinates, DispatchReport, FixedLocation, Identity, LocationSource, LoggingOpener,
    SessionProgress, UnavailableLocation,
};
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

fn cli() -> Command {
    Command::new("raksha")
        .version(raksha_agent::VERSION)
        .about("RakshaNet offline safety client")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .env(CONFIG_ENV)
                .value_parser(value_parser!(PathBuf))
                .help("Path to the TOML config file"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .global(true)
                .env("RAKSHA_USER")
                .help("Signed-in user's email"),
        )
        .arg(
            Arg::new("lat")
                .long("lat")
                .global(true)
                .requires("lng")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64))
                .help("Device latitude"),
        )
        .arg(
            Arg::new("lng")
                .long("lng")
                .global(true)
                .requires("lat")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64))
                .help("Device longitude"),
        )
        .subcommand(Command::new("install").about("Install and activate the offline shell"))
        .subcommand(
            Command::new("fetch")
                .about("Route one GET through the cache agent")
                .arg(Arg::new("url").required(true).help("Absolute URL"))
                .arg(
                    Arg::new("navigate")
                        .long("navigate")
                        .action(ArgAction::SetTrue)
                        .help("Treat as a page navigation"),
                ),
        )
        .subcommand(
            Command::new("arm")
                .about("Arm the escalation timer; type `ok` to check in")
                .arg(
                    Arg::new("seconds")
                        .long("seconds")
                        .value_parser(value_parser!(u64))
                        .help("Countdown length (default from config)"),
                ),
        )
        .subcommand(Command::new("sos").about("Send an emergency alert now"))
        .subcommand(
            Command::new("logs")
                .about("Show alert activity")
                .arg(Arg::new("date").long("date").help("Only this day, YYYY-MM-DD"))
                .arg(
                    Arg::new("stats")
                        .long("stats")
                        .action(ArgAction::SetTrue)
                        .help("Show totals instead of entries"),
                ),
        )
        .subcommand(
            Command::new("contacts")
                .about("Manage emergency contacts")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List saved contacts"))
                .subcommand(
                    Command::new("add")
                        .about("Save a contact")
                        .arg(Arg::new("phone").required(true).help("International number, +…")),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Delete a contact")
                        .arg(Arg::new("phone").required(true).help("International number, +…")),
                ),
        )
}

fn location(matches: &ArgMatches) -> Arc<dyn LocationSource> {
    match (matches.get_one::<f64>("lat"), matches.get_one::<f64>("lng")) {
        (Some(lat), Some(lng)) => Arc::new(FixedLocation(Coordinates::new(*lat, *lng))),
        _ => Arc::new(UnavailableLocation),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config = AgentConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("loading configuration")?;
    init_tracing(&config.logging)?;

    let app = RakshaApp::from_config(config, location(&matches), Arc::new(LoggingOpener))
        .context("building client")?;
    if let Some(user) = matches.get_one::<String>("user") {
        app.identity().sign_in(Identity::new(None, user.clone()));
    }

    match matches.subcommand() {
        Some(("install", _)) => {
            let activation = app.start().await;
            match activation.live_tag {
                Some(tag) => println!("live cache: {tag} (swapped: {})", activation.swapped),
                None => bail!("no cache generation is live"),
            }
        }
        Some(("fetch", sub)) => {
            let raw = sub.get_one::<String>("url").context("url is required")?;
            let url = Url::parse(raw).with_context(|| format!("invalid url {raw}"))?;
            app.start().await;
            let request = if sub.get_flag("navigate") {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            let response = app.fetch(request).await?;
            println!("{} via {:?}", response.status(), response.source);
            println!("{}", response.text());
        }
        Some(("arm", sub)) => arm(&app, sub.get_one::<u64>("seconds").copied()).await?,
        Some(("sos", _)) => print_report(&app.sos().await),
        Some(("logs", sub)) => {
            if sub.get_flag("stats") {
                let stats = app.activity().stats().await?;
                println!(
                    "total: {}  today: {}  this week: {}",
                    stats.total_alerts, stats.alerts_today, stats.alerts_this_week
                );
            } else {
                let entries = match sub.get_one::<String>("date") {
                    Some(date) => app.activity().on_date(date).await?,
                    None => app.activity().recent().await?,
                };
                if entries.is_empty() {
                    println!("no activity");
                }
                for entry in entries {
                    println!("[{:?}] {}  {}", entry.severity(), entry.time, entry.reason);
                }
            }
        }
        Some(("contacts", sub)) => match sub.subcommand() {
            Some(("list", _)) => {
                for phone in app.contacts().refresh().await? {
                    println!("{phone}");
                }
            }
            Some(("add", args)) => {
                let phone = args.get_one::<String>("phone").context("phone is required")?;
                println!("{}", app.contacts().add(phone).await?.message);
            }
            Some(("remove", args)) => {
                let phone = args.get_one::<String>("phone").context("phone is required")?;
                println!("{}", app.contacts().remove(phone).await?.message);
            }
            _ => bail!("unknown contacts command"),
        },
        _ => bail!("unknown command"),
    }

    let abandoned = app.flush().await;
    if abandoned > 0 {
        tracing::warn!(abandoned, "exiting with backend notifications unsent");
    }
    Ok(())
}

async fn arm(app: &RakshaApp, seconds: Option<u64>) -> anyhow::Result<()> {
    // Prime the known list for an offline expiry.
    if let Err(e) = app.contacts().refresh().await {
        tracing::warn!(error = %e, "could not refresh contacts before arming");
    }

    let mut session = app.arm(seconds)?;
    println!("armed {}; type `ok` to check in", session.id());

    let id = session.id();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            progress = session.changed() => match progress {
                Some(SessionProgress::Armed { remaining }) => println!("{remaining}s remaining"),
                Some(SessionProgress::CheckedIn) => {
                    println!("checked in, stay safe");
                    return Ok(());
                }
                Some(SessionProgress::Expired) => println!("time is up, alerting contacts"),
                Some(SessionProgress::Alerted(report)) => {
                    print_report(&report);
                    return Ok(());
                }
                Some(SessionProgress::Discarded) | None => return Ok(()),
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().eq_ignore_ascii_case("ok") => {
                    if let Err(e) = app.timer().check_in(id) {
                        println!("check-in rejected: {e}");
                    }
                }
                Some(_) => println!("type `ok` to check in"),
                None => stdin_open = false,
            },
        }
    }
}

fn print_report(report: &DispatchReport) {
    println!("{}", report.payload.human_message);
    println!("delivered: {}", report.delivered.join(", "));
    for (channel, error) in &report.failed {
        println!("failed: {channel}: {error}");
    }
    if !report.reached_anyone() {
        println!("no channel accepted the alert");
    }
}

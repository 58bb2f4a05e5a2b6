use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use clap::Parser;
use dotenv::dotenv;
use log::{LevelFilter, error, info, warn};

use kbs_booker::{
    AttemptOutcome, BookingTarget, Credentials, CredentialsEnv, DayResult, LoadFromEnv, Notifier,
    Orchestrator, PollSettings, Portal, PortalClient, ResourceIds, TargetSpec, TimeWindow,
    authenticate, auto_target, default_window, markup, myt_today, single_day_target,
    weekly_targets,
};

/// Automated slot booking for the KBS sports facility portal.
#[derive(Parser, Debug)]
#[command(name = "kbs-booker", version)]
struct Cli {
    /// IC number used to log in (falls back to KBS_USERNAME)
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Account password (falls back to KBS_PASSWORD)
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Booking date (DD/MM/YYYY); defaults to the release window 8 weeks out
    #[arg(short = 'd', long)]
    date: Option<String>,

    /// Slot start time (HH:MM:SS); defaults to the day's standard window
    #[arg(long)]
    time_start: Option<String>,

    /// Slot end time (HH:MM:SS)
    #[arg(long)]
    time_end: Option<String>,

    /// Encoded venue id from the portal URL
    #[arg(long, default_value = "GxqArR56DGE8ZakBI2f9")]
    venue_id: String,

    /// Numeric venue id (idvanue)
    #[arg(long, default_value_t = 2)]
    venue_id_num: u32,

    /// Encoded primary facility id
    #[arg(long, default_value = "GxqArR56DGE8ZGR0sR5Knm0=")]
    facility_id: String,

    /// Numeric primary facility id
    #[arg(long, default_value_t = 114)]
    facility_id_num: u32,

    /// Primary slot-type id
    #[arg(long, default_value_t = 624)]
    tjk_id: u32,

    /// Index of the facility row to use from the listing page
    #[arg(long, default_value_t = 0)]
    facility_index: usize,

    /// Encoded alternate facility id used for failover
    #[arg(long, default_value = "GxqArR56DGE8ZwNlsR5Knm0=")]
    alt_facility_id: String,

    /// Numeric alternate facility id
    #[arg(long, default_value_t = 202)]
    alt_facility_id_num: u32,

    /// Alternate slot-type id
    #[arg(long, default_value_t = 625)]
    alt_tjk_id: u32,

    /// Disable the alternate-facility failover
    #[arg(long)]
    no_failover: bool,

    /// State code
    #[arg(long, default_value = "07")]
    neg: String,

    /// Number of users on the booking form
    #[arg(long, default_value = "4")]
    num_users: String,

    /// Purpose code on the booking form
    #[arg(long, default_value = "4")]
    purpose: String,

    /// Maximum seconds to poll for the slot
    #[arg(long, default_value_t = 3600)]
    poll_timeout: u64,

    /// Seconds between availability checks
    #[arg(long, default_value_t = 1.0)]
    check_interval: f64,

    /// Book a single weekday of the release week (0=Mon .. 4=Fri)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=4))]
    day_offset: Option<u8>,

    /// Book all five weekday slots of the release week
    #[arg(long)]
    book_week: bool,

    /// Log in, print the facility listing, and exit
    #[arg(long)]
    list_facilities: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn target_spec(&self) -> TargetSpec {
        let alternate = (!self.no_failover).then(|| ResourceIds {
            facility_encoded: self.alt_facility_id.clone(),
            facility_num: self.alt_facility_id_num,
            tjk_id: self.alt_tjk_id,
            label: "Gelanggang Tenis 2".to_string(),
        });
        TargetSpec {
            venue_encoded: self.venue_id.clone(),
            venue_num: self.venue_id_num,
            region: self.neg.clone(),
            facility_index: self.facility_index,
            primary: ResourceIds {
                facility_encoded: self.facility_id.clone(),
                facility_num: self.facility_id_num,
                tjk_id: self.tjk_id,
                label: "Gelanggang Tenis 1".to_string(),
            },
            alternate,
            num_users: self.num_users.clone(),
            purpose: self.purpose.clone(),
        }
    }
}

fn resolve_credentials(cli: &Cli) -> Option<Credentials> {
    let env = CredentialsEnv::load_from_env().unwrap_or_default();
    let user_id = cli.username.clone().or(env.kbs_username)?;
    let password = cli.password.clone().or(env.kbs_password)?;
    Some(Credentials { user_id, password })
}

/// Single explicit target from --date/--time-start/--time-end, with the
/// day-standard window filling any gap.
fn explicit_target(cli: &Cli, spec: &TargetSpec) -> anyhow::Result<Option<BookingTarget>> {
    let Some(date) = &cli.date else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(date, "%d/%m/%Y")
        .map_err(|e| anyhow::anyhow!("bad --date {date}: {e}"))?;
    let window = match (&cli.time_start, &cli.time_end) {
        (Some(start), Some(end)) => TimeWindow::parse(start, end)?,
        (None, None) => default_window(date.weekday())
            .ok_or_else(|| anyhow::anyhow!("{date} is a weekend, pass --time-start/--time-end"))?,
        _ => anyhow::bail!("--time-start and --time-end must be given together"),
    };
    Ok(Some(spec.target_for(date, window)))
}

async fn notify_day(notifier: &Option<Notifier>, day: &DayResult) {
    let Some(notifier) = notifier else { return };
    match day.outcome {
        AttemptOutcome::Booked => {
            let text = format!(
                "\u{2705} <b>SUCCESS!</b>\nLocation: Kompleks Sukan KBS\nCourt: {}\nDate: {} ({})\nTime: {}-{} ({}h)",
                day.court.as_deref().unwrap_or("court unspecified"),
                day.date.format("%d/%m/%Y"),
                day.day_name(),
                day.window.start_field(),
                day.window.end_field(),
                day.window.hours(),
            );
            notifier.send(&text).await;
        }
        AttemptOutcome::BookedUnconfirmed => {
            notifier
                .send("\u{26a0} Booking created but confirmation may have failed. Check the portal to verify.")
                .await;
        }
        // Timeouts and rejections are visible in the logs and the weekly
        // summary; no point paging anyone for them.
        _ => {}
    }
}

async fn run(cli: Cli) -> i32 {
    let Some(credentials) = resolve_credentials(&cli) else {
        error!("no credentials: pass --username/--password or set KBS_USERNAME/KBS_PASSWORD");
        return 1;
    };
    let portal = match PortalClient::new() {
        Ok(portal) => portal,
        Err(e) => {
            error!("could not build HTTP client: {e:#}");
            return 1;
        }
    };
    let notifier = Notifier::from_env();

    let mut session = match authenticate(&portal, &credentials).await {
        Ok(session) => session,
        Err(e) => {
            error!("authentication failed: {e}");
            return 1;
        }
    };

    if cli.list_facilities {
        let _ = portal.booking_home().await;
        return match portal.facility_list(&cli.venue_id, &cli.neg).await {
            Ok(page) => {
                let facilities = markup::facilities(&page.body);
                println!("Found {} facilities:", facilities.len());
                for (index, facility) in facilities.iter().enumerate() {
                    println!("  [{index}] idf={}", facility.facility_encoded);
                }
                0
            }
            Err(e) => {
                error!("could not fetch the facility listing: {e:#}");
                1
            }
        };
    }

    let spec = cli.target_spec();
    let today = myt_today();
    let interval = Duration::from_secs_f64(cli.check_interval.max(0.1));

    if cli.book_week {
        // Weekly mode divides the budget so a dead Monday can't starve Friday.
        let per_day = (cli.poll_timeout / 5).min(600).max(1);
        let settings = PollSettings {
            interval,
            timeout: Duration::from_secs(per_day),
        };
        let targets = weekly_targets(&spec, today);
        info!("weekly mode: {} targets, {per_day}s poll budget each", targets.len());

        let orchestrator = Orchestrator::new(&portal, settings);
        spawn_cancel_on_ctrl_c(&orchestrator);
        let report = orchestrator.run_week(&mut session, &targets).await;

        for day in &report.days {
            notify_day(&notifier, day).await;
        }
        println!("{}", report.summary_text());
        if let Some(notifier) = &notifier {
            notifier.send(&report.summary_text()).await;
        }
        return if report.any_success() { 0 } else { 1 };
    }

    let target = if let Some(offset) = cli.day_offset {
        match single_day_target(&spec, today, offset) {
            Ok(target) => target,
            Err(e) => {
                error!("{e}");
                return 1;
            }
        }
    } else {
        match explicit_target(&cli, &spec) {
            Ok(Some(target)) => target,
            Ok(None) => match auto_target(&spec, today) {
                Some(target) => target,
                None => {
                    warn!("auto-computed target lands on a weekend, nothing to book");
                    return 2;
                }
            },
            Err(e) => {
                error!("{e}");
                return 1;
            }
        }
    };
    info!(
        "target: {} {}-{}",
        target.date_field(),
        target.window.start_field(),
        target.window.end_field()
    );

    let settings = PollSettings {
        interval,
        timeout: Duration::from_secs(cli.poll_timeout),
    };
    let orchestrator = Orchestrator::new(&portal, settings);
    spawn_cancel_on_ctrl_c(&orchestrator);
    let day = orchestrator.run_day(&mut session, &target).await;

    notify_day(&notifier, &day).await;
    info!(
        "{} {}: {}",
        day.day_name(),
        day.date.format("%d/%m/%Y"),
        day.outcome.label()
    );
    if day.outcome.is_success() { 0 } else { 1 }
}

fn spawn_cancel_on_ctrl_c(orchestrator: &Orchestrator<'_>) {
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling the run");
            cancel.cancel();
        }
    });
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(if cli.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();
    let code = run(cli).await;
    std::process::exit(code);
}

//! omairi: record landmark visits and inspect streaks and rewards
//!
//! State lives in a JSON-lines data directory, so each invocation picks up
//! where the last one left off.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use attestation::{Coordinate, Evidence, LandmarkRegistry, LocationFix, PhotoEvidence};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use habit_loop::{FixedWeather, HabitLoopConfig, HabitLoopController, LoopState};
use reward_engine::{LocalMintLedger, MintLedger, MintOutcome, OfflineMintLedger, RewardItem};
use tracing::info;
use visit_ledger::{offset_from_minutes, JsonFileStore, SystemClock, Weather};

#[derive(Parser)]
#[command(name = "omairi")]
#[command(about = "Daily shrine and temple visits, streaks and goshuin")]
struct Cli {
    /// Data directory
    #[arg(short, long, env = "OMAIRI_DATA_DIR", default_value = "omairi-data")]
    data_dir: PathBuf,

    /// Path to YAML configuration file
    #[arg(short, long, env = "OMAIRI_CONFIG")]
    config: Option<PathBuf>,

    /// Landmark registry (YAML or JSON). Defaults to the Tokyo seed set
    #[arg(long, env = "OMAIRI_LANDMARKS")]
    landmarks: Option<PathBuf>,

    /// User id
    #[arg(short, long, env = "OMAIRI_USER", default_value = "local")]
    user: String,

    /// Your offset from UTC in minutes. Defaults to the timezone of your last visit
    #[arg(long, env = "OMAIRI_UTC_OFFSET", allow_hyphen_values = true)]
    utc_offset_minutes: Option<i32>,

    /// Where minted provenance records go
    #[arg(long, value_enum, default_value_t = MintTarget::Offline)]
    mint: MintTarget,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum MintTarget {
    /// Queue everything for later
    Offline,
    /// Issue receipts locally
    Local,
}

#[derive(Clone, Copy, ValueEnum)]
enum WeatherArg {
    Clear,
    Cloudy,
    Rain,
    Snow,
    Fog,
    Unknown,
}

impl From<WeatherArg> for Weather {
    fn from(arg: WeatherArg) -> Self {
        match arg {
            WeatherArg::Clear => Weather::Clear,
            WeatherArg::Cloudy => Weather::Cloudy,
            WeatherArg::Rain => Weather::Rain,
            WeatherArg::Snow => Weather::Snow,
            WeatherArg::Fog => Weather::Fog,
            WeatherArg::Unknown => Weather::Unknown,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List known landmarks
    Landmarks {
        /// Only show landmarks within this many meters of --lat/--lng
        #[arg(long, requires_all = ["lat", "lng"])]
        within: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
    },
    /// Visit the landmark nearest to the given position
    Visit {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Reported fix accuracy in meters
        #[arg(long, default_value_t = 10.0)]
        accuracy: f64,
        /// Photo of the landmark
        #[arg(long)]
        photo: Option<PathBuf>,
        /// EXIF position embedded in the photo
        #[arg(long, requires_all = ["photo", "photo_lng"], allow_hyphen_values = true)]
        photo_lat: Option<f64>,
        #[arg(long, requires_all = ["photo", "photo_lat"], allow_hyphen_values = true)]
        photo_lng: Option<f64>,
        #[arg(long, value_enum, default_value_t = WeatherArg::Unknown)]
        weather: WeatherArg,
    },
    /// Recent visits, newest first
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Current streak
    Streak,
    /// Collection statistics
    Stats {
        /// Also list the most recent bundles
        #[arg(long, default_value_t = 0)]
        recent: usize,
    },
    /// Retry queued mints
    FlushMints,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("omairi=info".parse()?)
                .add_directive("habit_loop=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HabitLoopConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HabitLoopConfig::default(),
    };
    let registry = match &cli.landmarks {
        Some(path) => LandmarkRegistry::from_file(path)
            .with_context(|| format!("loading landmarks {}", path.display()))?,
        None => LandmarkRegistry::tokyo_seed(),
    };

    let store = JsonFileStore::open(&cli.data_dir)
        .await
        .with_context(|| format!("opening data directory {}", cli.data_dir.display()))?;
    let mint_ledger: Arc<dyn MintLedger> = match cli.mint {
        MintTarget::Offline => Arc::new(OfflineMintLedger),
        MintTarget::Local => Arc::new(LocalMintLedger::new()),
    };
    let weather = match &cli.command {
        Command::Visit { weather, .. } => Weather::from(*weather),
        _ => Weather::Unknown,
    };

    info!(data_dir = %cli.data_dir.display(), user = %cli.user, "Starting omairi");

    let controller = HabitLoopController::builder(config)
        .with_registry(Arc::new(registry))
        .with_store(Arc::new(store))
        .with_clock(Arc::new(SystemClock))
        .with_weather(Arc::new(FixedWeather::new(weather)))
        .with_mint_ledger(mint_ledger)
        .build()
        .await?;

    let user = cli.user.as_str();
    if let Some(minutes) = cli.utc_offset_minutes {
        controller
            .set_utc_offset(user, offset_from_minutes(minutes))
            .await;
    }
    match cli.command {
        Command::Landmarks { within, lat, lng } => {
            let landmarks = match (within, lat, lng) {
                (Some(radius), Some(lat), Some(lng)) => controller
                    .registry()
                    .within(Coordinate::new(lat, lng), radius)
                    .into_iter()
                    .map(|n| (n.landmark, Some(n.distance_m)))
                    .collect(),
                _ => controller
                    .registry()
                    .all()
                    .iter()
                    .cloned()
                    .map(|l| (l, None))
                    .collect::<Vec<_>>(),
            };
            for (landmark, distance) in landmarks {
                let distance = distance.map(|d| format!(" {d:.0} m")).unwrap_or_default();
                println!(
                    "{:<16} {:<24} {:<7} {:<10}{}",
                    landmark.id,
                    landmark.name,
                    landmark.category.as_str(),
                    landmark.rarity_tier.display_name(),
                    distance
                );
            }
        }

        Command::Visit {
            lat,
            lng,
            accuracy,
            photo,
            photo_lat,
            photo_lng,
            ..
        } => {
            let fix = LocationFix::new(Coordinate::new(lat, lng), accuracy, Utc::now());
            let mut evidence = Evidence::location(fix);
            if let Some(path) = photo {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading photo {}", path.display()))?;
                let mut photo = PhotoEvidence::new(bytes);
                if let (Some(lat), Some(lng)) = (photo_lat, photo_lng) {
                    photo = photo.with_exif_location(Coordinate::new(lat, lng));
                }
                evidence = evidence.with_photo(photo);
            }

            if controller.on_location(user, fix).await == LoopState::Idle {
                anyhow::bail!("No landmark within {:.0} m", controller.config().location.vicinity_radius_m);
            }

            let outcome = match controller.trigger_visit(user, evidence).await {
                Ok(outcome) => outcome,
                Err(e) => anyhow::bail!(e.user_message()),
            };

            println!(
                "Visited {} ({}), streak {} day(s), {} visit(s) total",
                outcome.visit.landmark_id,
                outcome.visit.verification_method,
                outcome.streak.current_streak,
                outcome.total_visits
            );
            println!("Multiplier x{:.2}", outcome.bundle.multiplier.value);
            for item in &outcome.bundle.items {
                println!("  {}", describe_item(item));
            }
            match outcome.mint {
                Some(MintOutcome::Minted(receipt)) => println!("Minted: {}", receipt.receipt_id),
                Some(MintOutcome::Queued { pending }) => println!("Mint queued ({pending} pending)"),
                None => {}
            }
        }

        Command::History { limit } => {
            for visit in controller.recent_history(user, limit).await {
                println!(
                    "{}  {:<16} {:<8} {:<7} {:<9} {}",
                    visit.local_time().format("%Y-%m-%d %H:%M"),
                    visit.landmark_id,
                    visit.verification_method,
                    visit.season,
                    visit.time_of_day,
                    visit.moon_phase
                );
            }
        }

        Command::Streak => {
            let streak = controller.current_streak_state(user).await;
            println!("Streak: {} day(s)", streak.current_streak);
            if let Some(last) = streak.last_visit_date {
                println!("Last visit: {last}");
            }
            println!("Visited today: {}", if streak.today_visited { "yes" } else { "no" });
        }

        Command::Stats { recent } => {
            let stats = controller.collection_stats(user).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            for bundle in controller.recent_rewards(user, recent).await {
                println!(
                    "{}  {}  {}",
                    bundle.timestamp.format("%Y-%m-%d %H:%M"),
                    bundle.top_rarity().display_name(),
                    bundle.items.len()
                );
            }
        }

        Command::FlushMints => {
            let report = controller.flush_mints().await?;
            println!(
                "Minted {}, {} still pending",
                report.minted.len(),
                report.remaining
            );
        }
    }

    Ok(())
}

fn describe_item(item: &RewardItem) -> String {
    let label = match item {
        RewardItem::Goshuin(g) => format!("Goshuin of {} ({})", g.landmark_name, g.variant.as_str()),
        RewardItem::PrayerCard(p) => p.name.clone(),
        RewardItem::Badge(b) => b.name.clone(),
        RewardItem::Title(t) => t.name.clone(),
        RewardItem::SpecialBonus(s) => format!("{} (+{})", s.name, s.bonus_points),
    };
    format!("[{}] {}", item.rarity().display_name(), label)
}

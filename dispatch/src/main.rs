//! Operator CLI for the dispatch routing core
//!
//! Subcommands either run the triage pipeline standalone, inspect a
//! persistent case store, or play a scripted routing round against an
//! in-memory store so the escalation flow can be watched end to end.
//!
//! # Usage
//!
//! ```bash
//! # Classify a vitals snapshot
//! dispatch triage --vitals '{"spo2": 80, "heart_rate": "118 bpm"}'
//!
//! # Print the escalation threshold table
//! dispatch thresholds
//!
//! # Play one routing round in memory and print its event stream
//! dispatch simulate --acuity 4
//!
//! # Inspect a persistent store
//! dispatch show case-42
//! dispatch history --since-minutes 120 --stats
//! dispatch sweep
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};

use dispatch::{
    least_risk_recommendation, resolve_triage, CaseEvent, DispatchConfig, DispatchCoordinator,
    EventBus, EventBusExt, EventFilter, EventHistory, EventStats, HttpTriageClassifier,
    LoggingNotifier, MemoryStore, OverrideRequest, RankedHospital, ResponseDisposition,
    RocksCaseStore, SharedDispatchCoordinator, TriageClassifier, TriageRuleEngine, VitalSigns,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file with triage and escalation policy
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the case store directory (default: ./.dispatch-state)
    #[arg(long)]
    state_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a vitals snapshot and print the assessment
    Triage {
        /// Vitals snapshot as JSON. Unknown keys are ignored and
        /// unparseable readings are treated as absent.
        #[arg(long)]
        vitals: String,
    },

    /// Print the escalation thresholds for every acuity level
    Thresholds,

    /// Play one scripted routing round in memory and print its events
    Simulate {
        /// Acuity the simulated vitals should triage to (1-4)
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=4))]
        acuity: u8,
    },

    /// Show a stored case with its running response window
    Show {
        /// Case to inspect
        case_id: String,
    },

    /// List open cases in the store
    Cases,

    /// Expire every overdue response window in the store
    Sweep,

    /// Query the event journal
    History {
        /// Limit to one case; omit to query by time instead
        case_id: Option<String>,

        /// Look back this many minutes when no case is given
        #[arg(long, default_value_t = 60)]
        since_minutes: i64,

        /// Print aggregate counts instead of raw events
        #[arg(long, default_value_t = false)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dispatch=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DispatchConfig::load(args.config.as_deref())?;

    let state_path = args.state_path.unwrap_or_else(|| {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".dispatch-state")
    });

    match args.command {
        Command::Triage { vitals } => run_triage(&config, &vitals).await,
        Command::Thresholds => print_thresholds(&config),
        Command::Simulate { acuity } => simulate(&config, acuity).await,
        Command::Show { case_id } => show_case(&config, &state_path, &case_id).await,
        Command::Cases => list_cases(&config, &state_path).await,
        Command::Sweep => sweep(&config, &state_path).await,
        Command::History {
            case_id,
            since_minutes,
            stats,
        } => history(&state_path, case_id.as_deref(), since_minutes, stats).await,
    }
}

/// Run the triage pipeline on a single snapshot, outside any case.
async fn run_triage(config: &DispatchConfig, vitals_json: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(vitals_json)?;
    let vitals = VitalSigns::from_json(&value);

    let rules = TriageRuleEngine::new(config.triage.clone());
    let classifier = HttpTriageClassifier::from_config(&config.ai);
    let resolution = resolve_triage(
        classifier.as_ref().map(|c| c as &dyn TriageClassifier),
        &rules,
        &vitals,
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

fn print_thresholds(config: &DispatchConfig) -> Result<()> {
    println!("{:<8} {:<16} {:<16}", "acuity", "max_rejections", "timeout_seconds");
    for acuity in 1..=5u8 {
        let t = config.escalation.thresholds(Some(acuity));
        println!("{:<8} {:<16} {:<16}", acuity, t.max_rejections, t.timeout_seconds);
    }
    Ok(())
}

/// Vitals snapshots the rule engine classifies at each acuity level.
fn vitals_for_acuity(acuity: u8) -> VitalSigns {
    match acuity {
        1 => VitalSigns::default().with_spo2(80.0),
        2 => VitalSigns::default().with_heart_rate(140.0),
        3 => VitalSigns::default().with_heart_rate(108.0),
        _ => VitalSigns::default()
            .with_heart_rate(78.0)
            .with_spo2(98.0)
            .with_respiratory_rate(16.0),
    }
}

/// Play one routing round in memory: triage, dispatch, a rejection, and
/// either an override (escalated) or a redispatch that gets accepted.
async fn simulate(config: &DispatchConfig, acuity: u8) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::with_journal(store.clone()).shared();
    let coordinator = DispatchCoordinator::new(
        store,
        bus.clone(),
        Arc::new(LoggingNotifier),
        config.clone(),
    )
    .shared();

    let now = Utc::now();
    let case = coordinator.create_case(now).await?;
    let mut events = bus.subscribe_filtered(EventFilter::new().case(&case.id));

    coordinator
        .triage_case(&case.id, &vitals_for_acuity(acuity), now)
        .await?;

    let candidates = vec![
        RankedHospital::new("hosp-a", "Mercy General", 91.0).with_eta(9.0),
        RankedHospital::new("hosp-b", "St. Luke's", 84.0).with_eta(6.0),
        RankedHospital::new("hosp-c", "County Trauma Center", 77.5).with_eta(14.0),
    ];

    // Best candidate first; it declines twenty seconds in.
    let ranked = coordinator.rank_candidates(&case.id, &candidates).await?;
    let first = least_risk_recommendation(&ranked)
        .ok_or_else(|| anyhow::anyhow!("no dispatchable hospital in the candidate list"))?;
    coordinator.dispatch_case(&case.id, first, now).await?;

    let t1 = now + Duration::seconds(20);
    let disposition = coordinator
        .record_hospital_response(&case.id, &first.hospital_id, false, t1)
        .await?;

    let t2 = t1 + Duration::seconds(10);
    match disposition {
        ResponseDisposition::Escalated(reason) => {
            tracing::info!(?reason, "case escalated, dispatcher takes over");
            let request = OverrideRequest {
                hospital_id: "hosp-c".to_string(),
                hospital_name: "County Trauma Center".to_string(),
                score: 77.5,
                reason: "closest center with an open trauma bay".to_string(),
                actor: "dispatcher-7".to_string(),
            };
            coordinator.confirm_override(&case.id, &request, t2).await?;
        }
        _ => {
            // Re-rank so the rejection penalty shows, then send the next one.
            let reranked = coordinator.rank_candidates(&case.id, &candidates).await?;
            let next = least_risk_recommendation(&reranked)
                .ok_or_else(|| anyhow::anyhow!("no dispatchable hospital left after re-rank"))?;
            coordinator.dispatch_case(&case.id, next, t2).await?;
            coordinator
                .record_hospital_response(
                    &case.id,
                    &next.hospital_id,
                    true,
                    t2 + Duration::seconds(15),
                )
                .await?;
        }
    }

    let t3 = t2 + Duration::seconds(30);
    coordinator.mark_enroute(&case.id, t3).await?;
    coordinator
        .complete_case(&case.id, t3 + Duration::seconds(600))
        .await?;

    // The broadcast channel buffers for live subscribers, so the whole
    // round can be drained after the fact.
    let mut seen: Vec<CaseEvent> = Vec::new();
    while let Ok(Ok(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), events.recv()).await
    {
        seen.push(event);
    }

    for event in &seen {
        println!("{}", serde_json::to_string(event)?);
    }

    let snapshot = coordinator
        .snapshot(&case.id, t3 + Duration::seconds(600))
        .await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Open the persistent store and wire a coordinator over it.
fn open_coordinator(
    config: &DispatchConfig,
    state_path: &PathBuf,
) -> Result<(SharedDispatchCoordinator, Arc<RocksCaseStore>)> {
    let store = Arc::new(RocksCaseStore::open(state_path)?);
    let bus = EventBus::with_journal(store.clone()).shared();
    let coordinator = DispatchCoordinator::new(
        store.clone(),
        bus,
        Arc::new(LoggingNotifier),
        config.clone(),
    )
    .shared();
    Ok((coordinator, store))
}

async fn show_case(config: &DispatchConfig, state_path: &PathBuf, case_id: &str) -> Result<()> {
    let (coordinator, _) = open_coordinator(config, state_path)?;
    let snapshot = coordinator.snapshot(case_id, Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn list_cases(config: &DispatchConfig, state_path: &PathBuf) -> Result<()> {
    let (coordinator, _) = open_coordinator(config, state_path)?;
    let cases = coordinator.list_open_cases().await?;
    if cases.is_empty() {
        println!("no open cases");
        return Ok(());
    }
    for case in cases {
        println!("{}", case.summary());
    }
    Ok(())
}

async fn sweep(config: &DispatchConfig, state_path: &PathBuf) -> Result<()> {
    let (coordinator, _) = open_coordinator(config, state_path)?;
    let report = coordinator.sweep_expired(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn history(
    state_path: &PathBuf,
    case_id: Option<&str>,
    since_minutes: i64,
    stats: bool,
) -> Result<()> {
    let store = Arc::new(RocksCaseStore::open(state_path)?);
    let history = EventHistory::new(store);

    let events = match case_id {
        Some(id) => history.get_case_events(id).await?,
        None => history.get_recent_events(since_minutes, Utc::now()).await?,
    };

    if stats {
        let stats = EventStats::from_events(&events);
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
    }
    Ok(())
}

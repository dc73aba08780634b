//! Offline route arbitration checks.
//!
//! Runs conflict detection or candidate ranking over JSON files and prints
//! the result as JSON.

use arbiter_cli::{load_candidates, load_fleet, run_conflicts, run_score, CheckSettings};
use arbiter_core::{AlertEntry, ArbiterRules, Hemisphere, DEFAULT_UTM_ZONE};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Check recorded fleet paths for corridor conflicts
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UTM zone used for planar geometry
    #[arg(long, global = true, default_value_t = DEFAULT_UTM_ZONE)]
    zone: u8,

    /// Use the southern hemisphere variant of the zone
    #[arg(long, global = true)]
    south: bool,

    /// Corridor half-width in meters
    #[arg(long, global = true, default_value_t = 15.0)]
    radius: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print pairwise conflict alerts for a fleet file
    Conflicts {
        /// JSON object mapping agent id to path
        #[arg(long)]
        paths: PathBuf,

        /// Minimum overlap reported, in square meters
        #[arg(long, default_value_t = 5.0)]
        threshold: f64,
    },
    /// Rank planner candidates for one agent against the rest of the fleet
    Score {
        #[arg(long)]
        paths: PathBuf,

        /// Candidate array or planner `/route/candidates` response
        #[arg(long)]
        candidates: PathBuf,

        #[arg(long)]
        agent: String,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let hemisphere = if args.south {
        Hemisphere::South
    } else {
        Hemisphere::North
    };
    let mut rules = ArbiterRules {
        safety_radius_m: args.radius,
        ..ArbiterRules::default()
    };

    let output = match args.command {
        Command::Conflicts { paths, threshold } => {
            rules.area_threshold_m2 = threshold;
            let settings = CheckSettings::new(args.zone, hemisphere, rules)?;
            let fleet = load_fleet(&paths)?;
            let alerts = run_conflicts(&fleet, &settings)?;
            eprintln!("{} agent(s), {} conflict(s)", fleet.len(), alerts.len());
            let entries: Vec<AlertEntry> =
                alerts.into_iter().map(AlertEntry::RouteConflict).collect();
            serde_json::to_string_pretty(&entries)?
        }
        Command::Score {
            paths,
            candidates,
            agent,
        } => {
            let settings = CheckSettings::new(args.zone, hemisphere, rules)?;
            let fleet = load_fleet(&paths)?;
            let candidates = load_candidates(&candidates)?;
            let ranked = run_score(&agent, &fleet, &candidates, &settings)?;
            if ranked.is_empty() {
                eprintln!("No viable candidate for {}", agent);
            }
            serde_json::to_string_pretty(&ranked)?
        }
    };

    println!("{}", output);
    Ok(())
}

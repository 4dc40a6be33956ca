//! Headless runner: load a scenario and drive it for its configured ticks.
//!
//! Accepts a scenario file (`.ron`, `.toml`, `.json`) or a scenario
//! directory. Defaults to the bundled Rhine reach scenario.
//!
//! Run with: `cargo run -p floodplain-data --example headless_runner -- [path]`
//!
//! Set `RUST_LOG=floodplain_core=debug` for per-tick detail.

use std::path::PathBuf;

use floodplain_core::fixed::{Money, Volume};
use floodplain_core::rng::SimRng;
use floodplain_data::{Scenario, load_scenario, load_scenario_dir};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/rhine_reach.ron"))
    });
    let Scenario {
        mut basin,
        mut policy,
        run,
    } = if path.is_dir() {
        load_scenario_dir(&path)?
    } else {
        load_scenario(&path)?
    };

    let mut rng = SimRng::new(run.seed);
    let mut flooded_ticks = 0u64;
    let mut overflow_total: Volume = 0;
    let mut stipends: Money = 0;
    let mut spent: Money = 0;
    let mut built = 0usize;
    let mut failed = 0usize;

    for _ in 0..run.ticks {
        let report = basin.step(&mut rng, &mut policy)?;
        if !report.flow.overflowing.is_empty() {
            flooded_ticks += 1;
        }
        overflow_total += report
            .flow
            .overflowing
            .iter()
            .filter_map(|&node| basin.segment(node))
            .map(|segment| segment.overflow())
            .sum::<Volume>();
        stipends += report.flow.stipend_total;
        spent += report.economy.spent();
        built += report.economy.built();
        failed += report.economy.failed();

        if report.flow.tick % 25 == 0 {
            info!(
                tick = report.flow.tick,
                overflowing = report.flow.overflowing.len(),
                built = report.economy.built(),
                hash = %format!("{:016x}", report.hash),
                "progress"
            );
        }
    }

    println!(
        "=== {} after {} ticks (seed {}) ===\n",
        path.display(),
        run.ticks,
        run.seed
    );
    println!("ticks with flooding: {flooded_ticks}");
    println!("total overflow:      {overflow_total}");
    println!("stipends paid:       {stipends}");
    println!("spent on protection: {spent} ({built} built, {failed} failed)\n");

    println!(
        "{:<16} {:>10} {:>10} {:>10} {:>8}",
        "segment", "dike", "max", "retain", "threat"
    );
    let order = basin.order()?.to_vec();
    for node in order {
        let Some(segment) = basin.segment(node) else {
            continue;
        };
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>8}",
            segment.name(),
            segment.dike_capacity(),
            segment.max_dike_capacity(),
            segment.retainable(),
            if segment.is_threatened() { "yes" } else { "no" },
        );
    }

    println!("\n{:<16} {:>12}", "steward", "balance");
    for (_, steward) in basin.stewards() {
        println!("{:<16} {:>12}", steward.name(), steward.balance());
    }
    println!("\nstate hash: {:016x}", basin.state_hash());
    Ok(())
}

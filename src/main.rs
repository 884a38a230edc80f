use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};

use mpc_blend::charts;
use mpc_blend::logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, Logger};
use mpc_blend::scenarios::get_scenario_catalog;
use mpc_blend::utils::{RAND_SEED, TOTAL_SIMULATION_RUNS};
use mpc_blend::{log, logln};

/// Run weighted MPC blending scenarios
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered scenarios
    List,

    /// Run one scenario by name, or "all"
    Run {
        scenario: String,

        /// Number of iterations, each with its own seed
        #[arg(short, long, default_value = "1")]
        iterations: u64,

        /// Seed of the first iteration
        #[arg(short, long, default_value = "0")]
        start: u64,

        /// Stop at the first failing validation
        #[arg(long)]
        fastbreak: bool,

        /// Also print every simulation step
        #[arg(short, long)]
        verbose: bool,
    },

    /// Write trajectory charts to charts/
    Charts,
}

fn main() {
    let args = Args::parse();

    match args.command {
        Command::List => {
            for scenario in get_scenario_catalog() {
                println!("{}", scenario.short_name);
            }
        }
        Command::Charts => {
            if let Err(e) = charts::generate_blend_charts() {
                eprintln!("Error generating charts: {}", e);
                std::process::exit(1);
            }
        }
        Command::Run { scenario, iterations, start, fastbreak, verbose } => {
            if let Err(e) = run_scenarios(&scenario, iterations, start, fastbreak, verbose) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_scenarios(scenario_arg: &str, iterations: u64, start: u64, fastbreak: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let all_scenarios = get_scenario_catalog();

    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                let names: Vec<&str> = all_scenarios.iter().map(|s| s.short_name).collect();
                return Err(format!("Scenario '{}' not found. Available scenarios: {}", scenario_arg, names.join(", ")).into());
            }
        }
    };

    // Scenario detail only for a single named run, it clutters repeated runs
    let mut logger = Logger::new();
    let mut console_events = vec![LogEvent::Validation];
    if scenario_arg != "all" && iterations == 1 {
        console_events.push(LogEvent::Scenario);
        console_events.push(LogEvent::Simulation);
    }
    if verbose {
        console_events.push(LogEvent::Step);
    }
    logger.add_receiver(ConsoleReceiver::new(console_events));
    let summary_receiver_id = logger.add_receiver(FileReceiver::new(&PathBuf::from("log/summary.log"), vec![LogEvent::Validation])?);

    TOTAL_SIMULATION_RUNS.store(0, Ordering::Relaxed);
    if iterations > 1 {
        logln!(&mut logger, LogEvent::Validation, "Running '{}' {} times...\n", scenario_arg, iterations);
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running '{}'...\n", scenario_arg);
    }

    let mut failures = 0usize;
    'scenarios: for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

        let scenario_log = PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name)));
        let scenario_receiver_id = logger.add_receiver(FileReceiver::new(&scenario_log, vec![LogEvent::Scenario, LogEvent::Simulation])?);

        for i in start..(start + iterations) {
            if iterations > 1 {
                log!(&mut logger, LogEvent::Validation, "[{}/{}] ", i - start + 1, iterations);
            }
            RAND_SEED.store(i, Ordering::Relaxed);

            match (scenario.run)(scenario.short_name, &mut logger) {
                Ok(()) => {
                    logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                }
                Err(e) => {
                    failures += 1;
                    logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                    if fastbreak {
                        logger.remove_receiver(scenario_receiver_id);
                        logln!(&mut logger, LogEvent::Validation, "\nStopping at seed {} (--fastbreak)", i);
                        break 'scenarios;
                    }
                }
            }
            let _ = logger.flush();
        }

        logger.remove_receiver(scenario_receiver_id);
    }

    logln!(&mut logger, LogEvent::Validation, "\nTotal simulation runs completed: {}", TOTAL_SIMULATION_RUNS.load(Ordering::Relaxed));
    logger.remove_receiver(summary_receiver_id);

    if failures > 0 {
        return Err(format!("{} scenario run(s) failed", failures).into());
    }
    Ok(())
}

//! Raffle CLI.
//!
//! Exercises the raffle core against the in-memory store with a simulated
//! clock: a full lifecycle demo, a fairness sampling report, and a single
//! sweep over a seeded backlog.

use anyhow::Result;
use clap::{Parser, Subcommand};
use raffle_core::{
    Caller, Clock, CreateLottery, InMemoryLotteryStore, ManualClock, Participant, RaffleConfig,
    RaffleService, TimestampMs, UniformSelector, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "raffle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one lottery through its full lifecycle: create, join, expire,
    /// sweep, re-read
    Demo {
        /// Number of participants to join
        #[arg(long, default_value_t = 5)]
        participants: u32,

        /// Prize count for the lottery
        #[arg(long, default_value_t = 2)]
        prizes: u32,
    },

    /// Sample the winner selector and report per-participant win
    /// frequency
    Fairness {
        /// Number of selection trials
        #[arg(long, default_value_t = 10_000)]
        trials: u32,

        /// Pool size
        #[arg(long, default_value_t = 5)]
        participants: u32,

        /// Prize count per trial
        #[arg(long, default_value_t = 2)]
        prizes: u32,
    },

    /// Seed a backlog of lotteries and run one sweep over it
    Sweep {
        /// Number of expired lotteries to seed
        #[arg(long, default_value_t = 3)]
        lotteries: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RaffleConfig::from_env()?;

    // --verbose overrides the configured level; RUST_LOG overrides both.
    let default_level = if cli.verbose {
        "debug"
    } else {
        &config.logging.level
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if config.logging.json_output {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Demo {
            participants,
            prizes,
        } => run_demo(config, participants, prizes),
        Commands::Fairness {
            trials,
            participants,
            prizes,
        } => run_fairness(trials, participants, prizes),
        Commands::Sweep { lotteries } => run_sweep(config, lotteries),
    }
}

fn demo_service(config: RaffleConfig) -> RaffleService {
    RaffleService::new(Arc::new(InMemoryLotteryStore::new()), config)
}

fn run_demo(config: RaffleConfig, participants: u32, prizes: u32) -> Result<()> {
    let clock = ManualClock::new(TimestampMs(1_700_000_000_000));
    let service = demo_service(config);
    let admin = Caller::admin("demo-admin");

    let lottery = service.create_lottery(
        &admin,
        CreateLottery {
            title: "demo giveaway".into(),
            description: "".into(),
            end_at: clock.now().plus_minutes(15),
            prize_count: prizes,
        },
        clock.now(),
    )?;
    println!("created lottery {}", lottery.id);

    for i in 0..participants {
        service.join_lottery(
            &lottery.id,
            &UserId(format!("user-{}", i)),
            clock.now().plus_minutes(1),
        )?;
    }
    println!("{} participants joined", participants);

    // Jump past the end instant; the next sweep settles.
    clock.advance_ms(16 * 60 * 1_000);
    let report = service.run_scheduled_sweep(clock.now())?;
    println!("sweep report:\n{}", serde_json::to_string_pretty(&report)?);

    let detail = service.get_lottery_detail(&lottery.id, clock.now())?;
    println!(
        "winners: {:?}",
        detail
            .winners
            .iter()
            .map(|p| p.user_id.to_string())
            .collect::<Vec<_>>()
    );

    // Redundant re-read: the settlement is idempotent.
    let again = service.get_lottery_detail(&lottery.id, clock.now().plus_minutes(1))?;
    println!(
        "re-read drawn_at matches: {}",
        again.lottery.drawn_at() == detail.lottery.drawn_at()
    );
    Ok(())
}

fn run_fairness(trials: u32, participants: u32, prizes: u32) -> Result<()> {
    let pool: Vec<Participant> = (0..participants)
        .map(|i| Participant {
            lottery_id: raffle_core::LotteryId("fairness".into()),
            user_id: UserId(format!("user-{}", i)),
            joined_at: TimestampMs(0),
            winner: false,
        })
        .collect();

    let mut rng = rand::thread_rng();
    let mut wins: HashMap<UserId, u64> = HashMap::new();
    for _ in 0..trials {
        for winner in UniformSelector::select_with_rng(&mut rng, &pool, prizes) {
            *wins.entry(winner).or_default() += 1;
        }
    }

    let expected = f64::from(prizes.min(participants)) / f64::from(participants);
    println!(
        "{} trials, pool {}, prizes {} (expected frequency {:.4})",
        trials, participants, prizes, expected
    );
    for p in &pool {
        let freq = *wins.get(&p.user_id).unwrap_or(&0) as f64 / f64::from(trials);
        println!("  {:<12} {:.4}", p.user_id.to_string(), freq);
    }
    Ok(())
}

fn run_sweep(config: RaffleConfig, lotteries: u32) -> Result<()> {
    let clock = ManualClock::new(TimestampMs(1_700_000_000_000));
    let service = demo_service(config);
    let admin = Caller::admin("demo-admin");

    for i in 0..lotteries {
        let lottery = service.create_lottery(
            &admin,
            CreateLottery {
                title: format!("backlog {}", i),
                description: "".into(),
                end_at: clock.now().plus_minutes(5),
                prize_count: 1 + i % 3,
            },
            clock.now(),
        )?;
        // Leave every third lottery empty to show the no-participant path.
        if i % 3 != 2 {
            for j in 0..=i {
                service.join_lottery(
                    &lottery.id,
                    &UserId(format!("user-{}", j)),
                    clock.now().plus_minutes(1),
                )?;
            }
        }
    }

    clock.advance_ms(6 * 60 * 1_000);
    let report = service.run_scheduled_sweep(clock.now())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "metrics: {}",
        serde_json::to_string_pretty(&service.metrics().snapshot())?
    );
    Ok(())
}

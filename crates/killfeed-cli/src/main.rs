use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

use killfeed_core::{
    open_store, parse_file, submit_or_apply, AdminCommand, AdminDelivery, AdminInbox,
    CommandPlayerList, Engine, EngineConfig, EngineSources, FilePlayerList, KillfeedError,
    LinkOutcome, LocalFileFeed, Persistence, PlayerId, PlayerListSource, RunLock, SharedState,
};

#[derive(Parser)]
#[command(name = "killfeed", version, about = "The Isle kill feed and playtime tracker")]
struct Cli {
    /// State file: SQLite by default, JSON when the name ends in .json
    #[arg(long, env = "KILLFEED_DB", default_value = "killfeed.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail the kill feed and poll presence until Ctrl-C
    Run {
        /// Kill feed log file
        #[arg(long, env = "KILLFEED_FEED")]
        feed: Option<String>,
        /// File holding the latest player list output
        #[arg(long, conflicts_with = "players_cmd")]
        players_file: Option<PathBuf>,
        /// Command whose stdout is the player list (for example an RCON client)
        #[arg(long)]
        players_cmd: Option<String>,
        /// JSON settings file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seconds between kill feed polls
        #[arg(long)]
        log_poll: Option<u64>,
        /// Seconds between presence polls
        #[arg(long)]
        presence_poll: Option<u64>,
        /// Seconds between state saves
        #[arg(long)]
        flush: Option<u64>,
    },
    /// Show the kill leaderboard
    Top {
        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,
    },
    /// Show one player's kill and playtime stats
    Player {
        /// Steam id or exact display name
        query: String,
    },
    /// Show the playtime leaderboard
    Playtime {
        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,
    },
    /// Attach a Steam id to a display name seen in the player list
    Link {
        steam_id: String,
        display_name: String,
    },
    /// Delete collected statistics
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Only clear playtime
        #[arg(long)]
        playtime_only: bool,
    },
    /// Parse a kill feed file and print its events without storing them
    Parse {
        file: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> killfeed_core::Result<()> {
    match cli.command {
        Commands::Run {
            feed,
            players_file,
            players_cmd,
            config,
            log_poll,
            presence_poll,
            flush,
        } => {
            let mut settings = match config {
                Some(path) => EngineConfig::from_json_file(&path)?,
                None => EngineConfig::default(),
            };
            if let Some(feed) = feed {
                settings.feed_path = feed;
            }
            if let Some(secs) = log_poll {
                settings.log_poll_secs = secs;
            }
            if let Some(secs) = presence_poll {
                settings.presence_poll_secs = secs;
            }
            if let Some(secs) = flush {
                settings.flush_secs = secs;
            }
            let players: Option<Arc<dyn PlayerListSource>> = match (players_file, players_cmd) {
                (Some(path), _) => Some(Arc::new(FilePlayerList::new(path))),
                (None, Some(line)) => Some(Arc::new(CommandPlayerList::from_command_line(&line)?)),
                (None, None) => None,
            };
            cmd_run(&cli.db, settings, players)
        }
        Commands::Top { limit } => cmd_top(&cli.db, limit),
        Commands::Player { query } => cmd_player(&cli.db, &query),
        Commands::Playtime { limit } => cmd_playtime(&cli.db, limit),
        Commands::Link { steam_id, display_name } => cmd_link(&cli.db, &steam_id, &display_name),
        Commands::Reset { yes, playtime_only } => cmd_reset(&cli.db, yes, playtime_only),
        Commands::Parse { file } => cmd_parse(&file),
    }
}

fn load_state(db_path: &str) -> SharedState {
    let persistence = Persistence::new(open_store(Path::new(db_path)));
    SharedState::from_snapshot(persistence.load_or_empty())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn cmd_run(
    db_path: &str,
    config: EngineConfig,
    players: Option<Arc<dyn PlayerListSource>>,
) -> killfeed_core::Result<()> {
    let feed: Option<Arc<dyn killfeed_core::FeedSource>> = if config.feed_path.is_empty() {
        None
    } else {
        Some(Arc::new(LocalFileFeed))
    };
    let lock = RunLock::acquire(Path::new(db_path))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async move {
        let engine = Engine::start(
            config,
            EngineSources {
                feed,
                players,
                admin_inbox: Some(AdminInbox::for_state_file(Path::new(db_path))),
            },
            open_store(Path::new(db_path)),
        );
        println!("Tracking started; state in '{}'. Press Ctrl-C to stop.", db_path);
        tokio::signal::ctrl_c().await?;
        engine.shutdown().await
    });
    drop(lock);
    result
}

fn cmd_top(db_path: &str, limit: usize) -> killfeed_core::Result<()> {
    let state = load_state(db_path);
    let top = state.top_killers(limit);

    if top.is_empty() {
        println!("No kills recorded yet. Run 'killfeed run --feed <file>' first.");
        return Ok(());
    }

    let mut table = new_table(vec!["#", "Player", "Kills", "Deaths", "K/D", "Favourite"]);
    for (i, (id, record)) in top.iter().enumerate() {
        let favourite = record
            .favourite_creature()
            .map(|(creature, count)| format!("{} ({})", creature, count))
            .unwrap_or_default();
        table.add_row(vec![
            (i + 1).to_string(),
            display_or_id(&record.display_name, id),
            record.kills.to_string(),
            record.deaths.to_string(),
            format!("{:.2}", record.kd_ratio()),
            favourite,
        ]);
    }

    println!("{table}");
    Ok(())
}

fn cmd_player(db_path: &str, query: &str) -> killfeed_core::Result<()> {
    let state = load_state(db_path);
    let kills = state.lookup_killer(query);
    let playtime = state.lookup_playtime(query);

    if kills.is_none() && playtime.is_none() {
        return Err(KillfeedError::InvalidIdentity(format!(
            "Player '{}' not found",
            query
        )));
    }

    if let Some((id, record)) = kills {
        println!("=== {} ({}) ===", display_or_id(&record.display_name, &id), id);
        println!("Kills:       {}", record.kills);
        println!("Deaths:      {}", record.deaths);
        println!("K/D:         {:.2}", record.kd_ratio());
        if let Some((rank, total)) = state.killer_rank(&id) {
            println!("Rank:        {} of {}", rank, total);
        }
        if !record.creature_kill_counts.is_empty() {
            let mut table = new_table(vec!["Creature", "Kills"]);
            let mut creatures: Vec<_> = record.creature_kill_counts.iter().collect();
            creatures.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (creature, count) in creatures {
                table.add_row(vec![creature.clone(), count.to_string()]);
            }
            println!("{table}");
        }
    }

    if let Some((id, record)) = playtime {
        println!("=== Playtime: {} ===", display_or_id(&record.display_name, &id));
        println!("Total:       {}", record.formatted());
        println!("Online:      {}", if record.online { "yes" } else { "no" });
        if let Some(seen) = record.last_seen {
            println!("Last seen:   {}", seen.format("%Y-%m-%d %H:%M"));
        }
        if let Some((rank, total)) = state.playtime_rank(&id) {
            println!("Rank:        {} of {}", rank, total);
        }
    }

    Ok(())
}

fn cmd_playtime(db_path: &str, limit: usize) -> killfeed_core::Result<()> {
    let state = load_state(db_path);
    let top = state.top_playtime(limit);

    if top.is_empty() {
        println!("No playtime recorded yet.");
        return Ok(());
    }

    let mut table = new_table(vec!["#", "Player", "Playtime", "Linked"]);
    for (i, (id, record)) in top.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            display_or_id(&record.display_name, id),
            record.formatted(),
            if id.is_stable() { "yes" } else { "no" }.to_string(),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn print_queued(db_path: &str) {
    println!(
        "A tracker is running on '{}'; the command was queued and it will apply it shortly.",
        db_path
    );
}

fn cmd_link(db_path: &str, steam_id: &str, display_name: &str) -> killfeed_core::Result<()> {
    let command = AdminCommand::Link {
        stable_id: steam_id.to_string(),
        display_name: display_name.to_string(),
    };
    let outcome = match submit_or_apply(Path::new(db_path), &command)? {
        AdminDelivery::Queued => {
            print_queued(db_path);
            return Ok(());
        }
        AdminDelivery::Applied(outcome) => outcome,
    };

    match outcome {
        None => {}
        Some(LinkOutcome::Merged { minutes }) => println!(
            "Linked '{}' to {} and carried over {} minutes.",
            display_name, steam_id, minutes
        ),
        Some(LinkOutcome::Created) => println!(
            "Linked '{}' to {} (no playtime recorded under that name yet).",
            display_name, steam_id
        ),
        Some(LinkOutcome::Renamed) => println!("Renamed {} to '{}'.", steam_id, display_name),
    }
    Ok(())
}

fn cmd_reset(db_path: &str, yes: bool, playtime_only: bool) -> killfeed_core::Result<()> {
    let what = if playtime_only { "playtime" } else { "all statistics" };
    if !yes {
        eprint!("This will delete {} in '{}'. Continue? [y/N] ", what, db_path);
        let _ = io::stderr().flush();
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let command = if playtime_only {
        AdminCommand::ResetPlaytime
    } else {
        AdminCommand::ResetAll
    };
    match submit_or_apply(Path::new(db_path), &command)? {
        AdminDelivery::Queued => print_queued(db_path),
        AdminDelivery::Applied(_) => println!("Reset {} in '{}'.", what, db_path),
    }
    Ok(())
}

fn cmd_parse(file: &Path) -> killfeed_core::Result<()> {
    let (events, summary) = parse_file(file)?;

    let mut table = new_table(vec!["Time", "Killer", "Creature", "Victim", "Creature"]);
    for event in &events {
        let (victim, victim_creature) = match &event.victim {
            Some(v) => (format!("{} [{}]", v.name, v.raw_id), v.creature.clone()),
            None => ("(natural causes)".to_string(), String::new()),
        };
        let time = event
            .occurred_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| event.timestamp.clone());
        table.add_row(vec![
            time,
            format!("{} [{}]", event.killer.name, event.killer.raw_id),
            event.killer.creature.clone(),
            victim,
            victim_creature,
        ]);
    }

    println!("{table}");
    println!(
        "{} lines: {} kills, {} natural deaths, {} with unusable ids",
        summary.lines_parsed, summary.kills, summary.natural_deaths, summary.malformed
    );
    Ok(())
}

fn display_or_id(name: &str, id: &PlayerId) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use contracts::{Difficulty, GameEvent};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use session_api::{
    open_log, serve, AppState, EventLog, JoinRequest, LocalEventLog, ManualClock,
    MemoryPuzzleStore, SessionClient, SessionContext, SessionError, SqliteStore, SystemClock,
    DEFAULT_SQLITE_PATH,
};
use session_core::{reconcile, render_grid, ClientState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sudoku-sync", version, about = "Collaborative sudoku session log")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host the session log over HTTP and WebSocket.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        #[arg(long, env = "SUDOKU_SYNC_SQLITE_PATH", default_value = DEFAULT_SQLITE_PATH)]
        sqlite: PathBuf,
        /// Keep sessions in memory only.
        #[arg(long)]
        memory: bool,
    },
    /// Run in-process players against one session and check they converge.
    Simulate {
        #[arg(long, default_value_t = 3)]
        players: usize,
        #[arg(long, default_value_t = 200)]
        moves: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long, default_value = "easy")]
        difficulty: Difficulty,
    },
    /// Print the reconciled board of a persisted session.
    Replay {
        #[arg(long, env = "SUDOKU_SYNC_SQLITE_PATH", default_value = DEFAULT_SQLITE_PATH)]
        sqlite: PathBuf,
        /// Lists stored sessions when omitted.
        #[arg(long)]
        session: Option<String>,
    },
}

async fn run_serve(addr: SocketAddr, sqlite: PathBuf, memory: bool) -> Result<(), String> {
    let path = (!memory).then_some(sqlite.as_path());
    let log = open_log(path, Arc::new(SystemClock))
        .map_err(|err| format!("failed to open session log: {err}"))?;
    let state = AppState::new(Arc::new(log), Arc::new(MemoryPuzzleStore::classic()));

    println!("serving api on http://{addr}");
    serve(addr, state)
        .await
        .map_err(|err| format!("server error: {err}"))
}

fn run_simulation(
    players: usize,
    moves: usize,
    seed: u64,
    difficulty: Difficulty,
) -> Result<(), String> {
    let players = players.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let log = Arc::new(LocalEventLog::in_memory(clock.clone()));
    let ctx = SessionContext::new(log.clone(), Arc::new(MemoryPuzzleStore::classic()), clock.clone());

    let host = SessionClient::host(ctx.clone(), difficulty, "Player 0", 0)
        .map_err(|err| format!("failed to host session: {err}"))?;
    let session_id = host.session_id().to_string();
    let mut clients = vec![host];
    for index in 1..players {
        let client = SessionClient::join(
            ctx.clone(),
            JoinRequest::new(&session_id, format!("Player {index}")),
        )
        .map_err(|err| format!("player {index} failed to join: {err}"))?;
        clients.push(client);
    }

    let baseline = clients[0].snapshot().baseline;
    let open_cells = (0..9_u8)
        .flat_map(|r| (0..9_u8).map(move |c| (r, c)))
        .filter(|&(r, c)| baseline[usize::from(r)][usize::from(c)] == 0)
        .collect::<Vec<_>>();
    if open_cells.is_empty() {
        return Err("puzzle has no open cells".to_string());
    }

    for _ in 0..moves {
        clock.advance(rng.random_range(0..3));
        let who = rng.random_range(0..clients.len());
        let (r, c) = open_cells[rng.random_range(0..open_cells.len())];
        let client = &mut clients[who];

        let result = match rng.random_range(0..10) {
            0 => client.quick_pencil().map(|_| ()),
            1..=3 => client
                .toggle_note(r, c, rng.random_range(1..=9))
                .map(|_| ()),
            _ => client.set_cell(r, c, rng.random_range(0..=9)).map(|_| ()),
        };
        match result {
            Ok(()) | Err(SessionError::Move(_)) => {}
            Err(err) => return Err(format!("write failed: {err}")),
        }

        if rng.random_bool(0.3) {
            clients[who].drain_live();
        }
    }

    for client in clients.iter_mut() {
        client.drain_live();
    }

    let view = log
        .snapshot(&session_id)
        .map_err(|err| format!("snapshot failed: {err}"))?
        .ok_or_else(|| format!("session {session_id} vanished"))?;
    let expected = reconcile(&view.session.baseline, &view.events);
    let expected_hash = expected.state_hash();

    let mut diverged = 0;
    for client in &clients {
        let hash = client.board().state_hash();
        let marker = if hash == expected_hash { "ok" } else { "DIVERGED" };
        if hash != expected_hash {
            diverged += 1;
        }
        println!(
            "{:<10} events={:<4} hash={hash:016x} {marker}",
            client.player_name(),
            client.state().len()
        );
    }

    // A cold observer fed the whole log out of order, with redelivery.
    let mut delivery = view.events.clone();
    let redelivered = view
        .events
        .choose_multiple(&mut rng, view.events.len() / 4)
        .cloned()
        .collect::<Vec<GameEvent>>();
    delivery.extend(redelivered);
    delivery.shuffle(&mut rng);

    let mut observer = ClientState::new(
        "observer",
        view.session.baseline,
        view.session.created_at,
        view.session.created_at,
        Vec::new(),
    );
    for event in delivery {
        observer.ingest(event);
    }
    let observer_hash = observer.board().state_hash();
    println!(
        "{:<10} events={:<4} hash={observer_hash:016x} {}",
        "observer",
        observer.len(),
        if observer_hash == expected_hash { "ok" } else { "DIVERGED" }
    );
    if observer_hash != expected_hash {
        diverged += 1;
    }

    info!(%session_id, seed, moves, players, diverged, "simulation finished");
    println!("{}", render_grid(&expected.grid));
    println!(
        "session={session_id} seed={seed} events={} halted={}",
        view.events.len(),
        expected.halted
    );

    for client in clients {
        client.leave();
    }

    if diverged > 0 {
        return Err(format!("{diverged} view(s) diverged from the log"));
    }
    Ok(())
}

fn run_replay(sqlite: PathBuf, session: Option<String>) -> Result<(), String> {
    let store = SqliteStore::open(&sqlite)
        .map_err(|err| format!("failed to open {}: {err}", sqlite.display()))?;
    let log = LocalEventLog::new(store, Arc::new(SystemClock));

    let Some(session_id) = session else {
        let sessions = log
            .list_sessions()
            .map_err(|err| format!("failed to list sessions: {err}"))?;
        for session_id in sessions {
            println!("{session_id}");
        }
        return Ok(());
    };

    let view = log
        .snapshot(&session_id)
        .map_err(|err| format!("failed to read session: {err}"))?
        .ok_or_else(|| format!("session {session_id} not found"))?;
    let board = reconcile(&view.session.baseline, &view.events);

    println!(
        "session={session_id} difficulty={} events={} chat={} players={}",
        view.session.difficulty,
        view.events.len(),
        view.chat.len(),
        view.players.len()
    );
    println!("{}", render_grid(&board.grid));
    println!(
        "solved={} halted={} completed_at={}",
        board.is_solved(&view.session.solution),
        board.halted,
        view.session
            .completed_at
            .map_or_else(|| "-".to_string(), |at| at.to_string())
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,session_api=debug")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve {
            addr,
            sqlite,
            memory,
        } => run_serve(addr, sqlite, memory).await,
        Command::Simulate {
            players,
            moves,
            seed,
            difficulty,
        } => run_simulation(players, moves, seed, difficulty),
        Command::Replay { sqlite, session } => run_replay(sqlite, session),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

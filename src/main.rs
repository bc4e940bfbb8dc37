mod backends;
mod collections;
mod collections_manager;
mod config;
mod console;
mod db_manager;
mod headless_player;
mod player;
mod protocol;
mod search_manager;
mod sequence_manager;
mod session_manager;

use std::{
    io::BufRead,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use log::info;
use tokio::sync::broadcast;

use backends::search_proxy::SearchProxyAdapter;
use collections::Track;
use collections_manager::CollectionsManager;
use config::{sanitize_config, Config};
use console::{ConsoleManager, ConsoleState};
use db_manager::DbManager;
use headless_player::HeadlessPlayerRuntime;
use player::PlayerRuntime;
use protocol::{
    CollectionMessage, Message, SearchMessage, SequenceMessage, SessionMessage, SessionOrigin,
};
use search_manager::SearchManager;
use sequence_manager::SequenceManager;
use session_manager::SessionManager;

/// Both recurring timers (synchronizer sweep, sequencer advancement) run
/// at this fixed period.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn load_config() -> Config {
    let config_root = dirs::config_dir()
        .expect("Could not find config directory")
        .join("floatdeck");
    let config_file = config_root.join("config.toml");

    if let Err(err) = std::fs::create_dir_all(&config_root) {
        panic!(
            "Failed to create config directory {}: {}",
            config_root.display(),
            err
        );
    }

    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(&config_file, toml::to_string(&default_config).unwrap()).unwrap();
    }

    let config_content = std::fs::read_to_string(&config_file).unwrap_or_default();
    sanitize_config(toml::from_str::<Config>(&config_content).unwrap_or_default())
}

fn spawn_services(
    bus_sender: &broadcast::Sender<Message>,
    config: &Config,
    runtime: Arc<dyn PlayerRuntime>,
) -> Arc<Mutex<ConsoleState>> {
    let search_bus_receiver = bus_sender.subscribe();
    let search_bus_sender = bus_sender.clone();
    let search_config = config.search.clone();
    thread::spawn(move || {
        let backend = Arc::new(SearchProxyAdapter::new(&search_config));
        let mut search_manager =
            SearchManager::new(search_bus_receiver, search_bus_sender, backend);
        search_manager.run();
    });

    let collections_bus_receiver = bus_sender.subscribe();
    let collections_bus_sender = bus_sender.clone();
    thread::spawn(move || {
        let db_manager = DbManager::new().expect("Failed to initialize database");
        let mut collections_manager =
            CollectionsManager::new(collections_bus_receiver, collections_bus_sender, db_manager);
        collections_manager.run();
    });

    let session_bus_receiver = bus_sender.subscribe();
    let session_bus_sender = bus_sender.clone();
    let viewport = config.viewport;
    thread::spawn(move || {
        let mut session_manager = SessionManager::new(
            session_bus_receiver,
            session_bus_sender,
            runtime,
            viewport,
        );
        session_manager.run();
    });

    let sequence_bus_receiver = bus_sender.subscribe();
    let sequence_bus_sender = bus_sender.clone();
    thread::spawn(move || {
        let mut sequence_manager =
            SequenceManager::new(sequence_bus_receiver, sequence_bus_sender);
        sequence_manager.run();
    });

    let console_manager = ConsoleManager::new(bus_sender.subscribe());
    let console_state = console_manager.state();
    thread::spawn(move || {
        let mut console_manager = console_manager;
        console_manager.run();
    });

    console_state
}

fn spawn_tick_threads(bus_sender: &broadcast::Sender<Message>, shutdown: &Arc<AtomicBool>) {
    let sync_sender = bus_sender.clone();
    let sync_shutdown = Arc::clone(shutdown);
    thread::spawn(move || loop {
        thread::sleep(TICK_INTERVAL);
        if sync_shutdown.load(Ordering::SeqCst) {
            break;
        }
        if sync_sender
            .send(Message::Session(SessionMessage::SyncTick))
            .is_err()
        {
            break;
        }
    });

    let sequence_sender = bus_sender.clone();
    let sequence_shutdown = Arc::clone(shutdown);
    thread::spawn(move || loop {
        thread::sleep(TICK_INTERVAL);
        if sequence_shutdown.load(Ordering::SeqCst) {
            break;
        }
        if sequence_sender
            .send(Message::Sequence(SequenceMessage::Tick))
            .is_err()
        {
            break;
        }
    });
}

fn lock_state(state: &Arc<Mutex<ConsoleState>>) -> std::sync::MutexGuard<'_, ConsoleState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Looks up a 1-based index in one of the console's mirrored track lists.
fn indexed_track(state: &Arc<Mutex<ConsoleState>>, list: &str, index: usize) -> Option<Track> {
    if index == 0 {
        return None;
    }
    let state = lock_state(state);
    let tracks = match list {
        "results" => &state.search_results,
        "playlist" => &state.playlist,
        "history" => &state.history,
        _ => return None,
    };
    tracks.get(index - 1).cloned()
}

fn print_tracks(tracks: &[Track], active_index: Option<usize>) {
    if tracks.is_empty() {
        println!("  (empty)");
        return;
    }
    for (index, track) in tracks.iter().enumerate() {
        let marker = if active_index == Some(index) { "*" } else { " " };
        println!("  {}{}. {} [{}]", marker, index + 1, track.title, track.id);
    }
}

fn print_sessions(state: &Arc<Mutex<ConsoleState>>) {
    let state = lock_state(state);
    if state.sessions.is_empty() {
        println!("  (no open players)");
        return;
    }
    for session in &state.sessions {
        let mode = match session.sequence_index {
            Some(index) => format!("seq#{}", index + 1),
            None => "manual".to_string(),
        };
        println!(
            "  [{}] {} - {:.0}% of {:.0}s, vol {:.0}, {}, at ({:.0}, {:.0}), {}",
            session.id,
            session.title,
            session.progress_percent,
            session.duration_seconds,
            session.volume_percent,
            if session.is_playing { "playing" } else { "paused" },
            session.x,
            session.y,
            mode,
        );
    }
}

fn print_help() {
    println!("Commands:");
    println!("  search <text>          search the catalog");
    println!("  play <n>               open result n in a floating player");
    println!("  add <n>                add result n to the playlist");
    println!("  playlist               show the playlist");
    println!("  playlist play <n>      open playlist entry n");
    println!("  playlist remove <n>    remove playlist entry n");
    println!("  history                show the playback history");
    println!("  history play <n>       open history entry n");
    println!("  start | stop           run/stop ordered playlist playback");
    println!("  sessions               show open floating players");
    println!("  toggle <id>            play/pause a floating player");
    println!("  seek <id> <percent>    seek within a floating player");
    println!("  vol <id> <percent>     set a floating player's volume");
    println!("  move <id> <x> <y>      reposition a floating player");
    println!("  close <id>             close a floating player");
    println!("  quit");
}

fn handle_command(
    line: &str,
    bus_sender: &broadcast::Sender<Message>,
    console_state: &Arc<Mutex<ConsoleState>>,
) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let send = |message: Message| {
        let _ = bus_sender.send(message);
    };

    match parts.as_slice() {
        [] => {}
        ["quit"] | ["exit"] => return false,
        ["help"] => print_help(),
        ["search", rest @ ..] => {
            send(Message::Search(SearchMessage::Submit(rest.join(" "))));
        }
        ["play", index] => match index.parse().ok().and_then(|n| {
            indexed_track(console_state, "results", n)
        }) {
            Some(track) => send(Message::Session(SessionMessage::Open {
                track,
                origin: SessionOrigin::Manual,
            })),
            None => println!("No such search result."),
        },
        ["add", index] => match index.parse().ok().and_then(|n| {
            indexed_track(console_state, "results", n)
        }) {
            Some(track) => send(Message::Collection(CollectionMessage::AddToPlaylist(track))),
            None => println!("No such search result."),
        },
        ["playlist"] => {
            let (tracks, active) = {
                let state = lock_state(console_state);
                (state.playlist.clone(), state.active_sequence_index)
            };
            print_tracks(&tracks, active);
        }
        ["playlist", "play", index] => match index.parse().ok().and_then(|n| {
            indexed_track(console_state, "playlist", n)
        }) {
            Some(track) => send(Message::Session(SessionMessage::Open {
                track,
                origin: SessionOrigin::Manual,
            })),
            None => println!("No such playlist entry."),
        },
        ["playlist", "remove", index] => match index.parse().ok().and_then(|n| {
            indexed_track(console_state, "playlist", n)
        }) {
            Some(track) => send(Message::Collection(CollectionMessage::RemoveFromPlaylist(
                track.id,
            ))),
            None => println!("No such playlist entry."),
        },
        ["history"] => {
            let tracks = lock_state(console_state).history.clone();
            print_tracks(&tracks, None);
        }
        ["history", "play", index] => match index.parse().ok().and_then(|n| {
            indexed_track(console_state, "history", n)
        }) {
            Some(track) => send(Message::Session(SessionMessage::Open {
                track,
                origin: SessionOrigin::Manual,
            })),
            None => println!("No such history entry."),
        },
        ["start"] => send(Message::Sequence(SequenceMessage::Start)),
        ["stop"] => send(Message::Sequence(SequenceMessage::Stop)),
        ["sessions"] => print_sessions(console_state),
        ["toggle", id] => send(Message::Session(SessionMessage::TogglePlay(id.to_string()))),
        ["close", id] => send(Message::Session(SessionMessage::Close(id.to_string()))),
        ["seek", id, percent] => match percent.parse::<f32>() {
            Ok(percent) => send(Message::Session(SessionMessage::SeekPercent {
                id: id.to_string(),
                percent,
            })),
            Err(_) => println!("Usage: seek <id> <percent>"),
        },
        ["vol", id, percent] => match percent.parse::<f32>() {
            Ok(percent) => send(Message::Session(SessionMessage::SetVolume {
                id: id.to_string(),
                percent,
            })),
            Err(_) => println!("Usage: vol <id> <percent>"),
        },
        ["move", id, x, y] => match (x.parse::<f32>(), y.parse::<f32>()) {
            (Ok(x), Ok(y)) => send(Message::Session(SessionMessage::Move {
                id: id.to_string(),
                x,
                y,
            })),
            _ => println!("Usage: move <id> <x> <y>"),
        },
        _ => println!("Unknown command. Type 'help' for commands."),
    }
    true
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = load_config();

    let (bus_sender, _) = broadcast::channel(8192);

    let runtime: Arc<dyn PlayerRuntime> = Arc::new(HeadlessPlayerRuntime::new());
    // Start fetching the embeddable runtime now so the first bind usually
    // finds it ready; sessions opened earlier bind on RuntimeReady.
    runtime.request_load(bus_sender.clone());

    let console_state = spawn_services(&bus_sender, &config, runtime);

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_tick_threads(&bus_sender, &shutdown);

    println!("floatdeck - type 'help' for commands.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if !handle_command(&line, &bus_sender, &console_state) {
            break;
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    info!("Application exiting");
    Ok(())
}

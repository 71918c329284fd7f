//! Entry point for **rearrange**.
//!
//! Connects to the native window system, collects every eligible window and
//! feeds commands from all [`CommandSource`](rearrange::traits::CommandSource)s
//! into the [`Controller`] on the main thread.  Display snapshots are
//! published on a background thread.  When the session ends with pending
//! changes, the arrangement is saved to the per-user data directory.

use rearrange::backend;
use rearrange::collection::WindowsCollection;
use rearrange::command::Command;
use rearrange::config::Config;
use rearrange::controller::{Controller, Flow};
use rearrange::ipc::stdin::StdinSource;
use rearrange::persist;
use rearrange::traits::{CommandSource, DisplayState, PlatformBackend};
use log::{error, info, warn};
use std::sync::mpsc;
use std::thread::JoinHandle;

/// Load `config.json` from the platform config directory, falling back to
/// compiled-in defaults.
fn load_config() -> Config {
    let Some(path) = Config::default_path() else {
        info!("no config directory, using defaults");
        return Config::default();
    };
    match Config::load(&path) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            info!("no config file ({}), using defaults", e);
            Config::default()
        }
    }
}

//  Main

fn main() {
    env_logger::init();

    let config = load_config();

    let backend = match backend::probe() {
        Ok(b) => b,
        Err(e) => {
            error!("cannot connect to the window system: {}", e);
            std::process::exit(1);
        }
    };

    let collection = WindowsCollection::from_backend(&backend, config.size_limits());
    info!("collected {} window(s)", collection.size());

    let mut controller = Controller::new(backend, collection, config);

    let (state_tx, state_rx) = mpsc::channel::<DisplayState>();
    controller.set_presenter(state_tx);
    let presenter = spawn_presenter(state_rx);

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    spawn_command_sources(cmd_tx);

    let save = match controller.start() {
        Flow::Shutdown { save } => save,
        Flow::Continue => run_session(&mut controller, cmd_rx),
    };

    if save {
        save_arrangement(&controller);
    }
    controller.backend().end_session();

    drop(controller);
    if presenter.join().is_err() {
        warn!("presenter thread panicked");
    }
    #[cfg(unix)]
    let _ = std::fs::remove_file(rearrange::ipc::listener::UnixSocketListener::default_path());
}

/// Feed commands to the controller until it or every source gives up.
/// Returns whether the arrangement should be saved.
fn run_session<B: PlatformBackend>(
    controller: &mut Controller<B>,
    cmd_rx: mpsc::Receiver<Command>,
) -> bool {
    info!("rearrange running");
    for cmd in cmd_rx {
        if let Flow::Shutdown { save } = controller.handle(cmd) {
            return save;
        }
    }
    info!("all command sources closed, exiting");
    controller.collection().has_changes()
}

fn save_arrangement<B: PlatformBackend>(controller: &Controller<B>) {
    let records = controller.collection().export();
    match persist::data_dir().and_then(|dir| persist::save(&records, &dir)) {
        Ok(path) => info!("arrangement written to {}", path.display()),
        Err(e) => error!("failed to save arrangement: {}", e),
    }
}

//  Helpers

fn spawn_command_sources(tx: mpsc::Sender<Command>) {
    #[cfg(unix)]
    {
        use rearrange::ipc::listener::UnixSocketListener;

        let tx = tx.clone();
        std::thread::spawn(move || {
            let mut source = UnixSocketListener::new(UnixSocketListener::default_path());
            if let Err(e) = source.run(tx) {
                error!("socket listener error: {}", e);
            }
        });
    }

    {
        let tx = tx.clone();
        std::thread::spawn(move || {
            let mut source = StdinSource::stdin();
            if let Err(e) = source.run(tx) {
                error!("stdin error: {}", e);
            }
        });
    }

    drop(tx);
}

#[cfg(unix)]
fn spawn_presenter(rx: mpsc::Receiver<DisplayState>) -> JoinHandle<()> {
    use rearrange::ipc::feed::SnapshotFeed;

    std::thread::spawn(move || match SnapshotFeed::bind(SnapshotFeed::default_path()) {
        Ok(feed) => feed.run(rx),
        Err(e) => {
            warn!("snapshot feed unavailable: {}", e);
            log_snapshots(rx);
        }
    })
}

#[cfg(not(unix))]
fn spawn_presenter(rx: mpsc::Receiver<DisplayState>) -> JoinHandle<()> {
    std::thread::spawn(move || log_snapshots(rx))
}

fn log_snapshots(rx: mpsc::Receiver<DisplayState>) {
    for state in rx {
        log::debug!("{} {:?} {:?} {:?}", state.phase, state.wid, state.ghost, state.status);
    }
}

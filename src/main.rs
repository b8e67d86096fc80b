//! Entry point for the **spacemark** daemon.
//!
//! Restores the stored workspace names, spawns the message sources on
//! background threads and runs the owner loop on the main thread.

use spacemark::bridge::{FilePublisher, NotificationBridge};
use spacemark::cache::NameCaches;
use spacemark::config::{config_dir, default_data_dir, runtime_dir, Config};
use spacemark::daemon::{Daemon, DaemonOptions, Message};
use spacemark::diagnostics::DiagnosticLog;
use spacemark::hyprland::events::HyprlandEventSource;
use spacemark::hyprland::wm::HyprlandDesktop;
use spacemark::ipc::listener::UnixSocketListener;
use spacemark::persist::{Persister, StateFiles};
use spacemark::probe::{ProbeSource, ProbeTiming};
use spacemark::store::StateStore;
use spacemark::switcher::SwitchCoordinator;
use spacemark::traits::{MessageSource, StateProbe};
use log::{error, info};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Default socket path for the command listener.
fn default_socket_path() -> std::path::PathBuf {
    runtime_dir().join("spacemark.sock")
}

/// Try to load the config from `$XDG_CONFIG_HOME/spacemark/config.json`,
/// falling back to compiled-in defaults.
fn load_config() -> Config {
    let path = config_dir().join("config.json");
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

fn main() {
    env_logger::init();
    let config = load_config();

    let data_dir = config.storage.data_dir.clone().unwrap_or_else(default_data_dir);
    let files = StateFiles::new(&data_dir);
    let saved = files.load();
    info!(
        "restored {} workspaces from {}",
        saved.workspaces.len(),
        data_dir.display()
    );
    let store = StateStore::restore(
        saved.workspaces,
        NameCaches::new(saved.name_cache, saved.index_cache),
    );

    let persister = match Persister::spawn(files) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to start persist thread: {}", e);
            std::process::exit(1);
        }
    };

    let state_path = config
        .bridge
        .state_path
        .clone()
        .unwrap_or_else(|| runtime_dir().join("spacemark").join("state.json"));
    let publisher = match FilePublisher::spawn(state_path, config.bridge.reload_command.clone()) {
        Ok(p) => p,
        Err(e) => {
            error!("failed to start publish thread: {}", e);
            std::process::exit(1);
        }
    };
    let bridge = NotificationBridge::new(
        Box::new(publisher),
        Duration::from_millis(config.bridge.debounce_ms),
        config.bridge.enabled,
    );

    let desktop = HyprlandDesktop::new(&config.switching);
    let probe: Arc<dyn StateProbe> = Arc::new(desktop.clone());
    let switcher = SwitchCoordinator::new(desktop, &config.switching);

    let diagnostics = if config.diagnostics.enabled {
        let path = config
            .diagnostics
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join("diagnostics.log"));
        match DiagnosticLog::to_file(&path, config.diagnostics.max_bytes) {
            Ok(log) => {
                info!("diagnostic log: {}", path.display());
                log
            }
            Err(e) => {
                error!("failed to start diagnostic log thread: {}", e);
                DiagnosticLog::disabled()
            }
        }
    } else {
        DiagnosticLog::disabled()
    };

    let daemon = Daemon::new(
        store,
        probe,
        switcher,
        bridge,
        Box::new(persister),
        DaemonOptions {
            probe_timing: ProbeTiming::from(&config.probe),
            wrap_around: config.switching.wrap_around,
        },
    )
    .with_diagnostics(diagnostics);

    spawn_message_sources(daemon.sender());
    if daemon.sender().send(Message::Trigger(ProbeSource::Startup)).is_err() {
        error!("daemon queue closed before start");
        return;
    }
    daemon.run();
}

/// Run `source` on its own thread.  When it returns, `on_exit` (if any) is
/// posted to the daemon.
fn spawn_source<S>(name: &str, mut source: S, tx: mpsc::SyncSender<Message>, on_exit: Option<Message>)
where
    S: MessageSource + 'static,
{
    let label = name.to_string();
    let spawned = std::thread::Builder::new().name(label.clone()).spawn(move || {
        if let Err(e) = source.run(tx.clone()) {
            error!("{} error: {}", label, e);
        }
        if let Some(msg) = on_exit {
            let _ = tx.send(msg);
        }
    });
    if let Err(e) = spawned {
        error!("could not spawn {}: {}", name, e);
    }
}

fn spawn_message_sources(tx: mpsc::SyncSender<Message>) {
    spawn_source(
        "socket-listener",
        UnixSocketListener::new(default_socket_path()),
        tx.clone(),
        None,
    );
    // Without the event socket the compositor is gone; stop with it.
    spawn_source(
        "hyprland-events",
        HyprlandEventSource::new(),
        tx,
        Some(Message::Shutdown),
    );
}

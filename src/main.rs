mod api;
mod app;
mod cache;
mod color;
mod config;
mod date_util;
mod error;
mod events;
mod jobs;
mod logging;
mod models;
mod painter;
mod panels;
mod prefs;
mod selection;
mod ui;
mod years;

pub use logging::{get_recent_logs, log_request, log_response};

use api::ApiClient;
use app::App;
use config::Config;
use crossterm::{
    cursor,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use jobs::{JobOutcome, JobRunner};
use prefs::PreferenceStore;
use std::io::{self, BufWriter, stdout};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Input poll interval while a smooth scroll is running
const FRAME: Duration = Duration::from_millis(33);
/// Input poll interval otherwise; bounds how long job outcomes wait
const IDLE: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = logging::init_tracing(&Config::log_path()) {
        eprintln!("Logging disabled: {}", e);
    }

    let config = Config::load()?;
    Config::ensure_config_dir()?;
    let api = Arc::new(ApiClient::new(&config)?);
    let prefs = PreferenceStore::open(Config::prefs_path());
    let mut app = App::new(prefs, date_util::today(), terminal::size()?);
    tracing::info!(server = config.base_url(), "starting");

    // Enable raw mode for single-keypress input
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;

    let result = run(&mut app, api, config.max_concurrent_requests).await;

    // Cleanup: restore the terminal even when the loop failed
    disable_raw_mode()?;
    execute!(stdout(), DisableMouseCapture, LeaveAlternateScreen, cursor::Show)?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "terminal loop failed");
    }
    result?;
    Ok(())
}

async fn run(app: &mut App, api: Arc<ApiClient>, max_requests: usize) -> io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<JobOutcome>();
    let runner = JobRunner::new(api, max_requests, tx);
    let mut out = BufWriter::new(stdout());
    let mut dirty = true;

    app.boot();

    loop {
        for job in app.take_jobs() {
            runner.spawn(job);
        }

        if dirty {
            ui::render(&mut out, app)?;
            dirty = false;
        }
        if app.should_quit {
            break;
        }

        let wait = if app.years.is_animating() { FRAME } else { IDLE };
        if event::poll(wait)? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key),
                Event::Mouse(mouse) => {
                    let hit = ui::hit_test(app, mouse.column, mouse.row);
                    app.handle_mouse(hit, mouse);
                }
                Event::Resize(width, height) => app.resize(width, height),
                _ => {}
            }
            dirty = true;
        }

        while let Ok(outcome) = rx.try_recv() {
            app.apply_outcome(outcome);
            dirty = true;
        }

        let had_status = app.status_message.is_some();
        if app.tick() || had_status != app.status_message.is_some() {
            dirty = true;
        }
    }

    tracing::info!("quit");
    Ok(())
}

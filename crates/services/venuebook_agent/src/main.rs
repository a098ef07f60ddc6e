// File: services/venuebook_agent/src/main.rs
mod app_state;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use venuebook_common::logging::{self, parse_level};
use venuebook_common::{HttpStatusCode, VenuebookError};
use venuebook_config::load_config;
use venuebook_gateway::RestGateway;
use venuebook_store::{FileStore, KeyValueStore};
use venuebook_sync::{
    BookingEventRouter, ConnectionState, LiveChannel, LiveSettings, Notice, NoticeLevel,
};

use app_state::{week_of, AppState};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("venuebook agent stopped ({}): {}", err.status_code(), err);
        eprintln!("venuebook agent stopped: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), VenuebookError> {
    let config = Arc::new(load_config()?);

    let level = parse_level(&config.log.level);
    // Keeps the file writer flushing until main returns
    let _log_guard = match config.log.dir.as_deref() {
        Some(dir) => Some(logging::init_with_file(Path::new(dir), "venuebook-agent", level)),
        None => {
            logging::init_with_level(level);
            None
        }
    };

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.storage.dir));
    let api = config.api.clone();
    let mut state = AppState::build(config.clone(), store, |sessions| {
        Ok(Arc::new(RestGateway::new(&api, sessions)?))
    })?;
    info!(
        "Venuebook agent against {} (storage: {})",
        config.api.base_url, config.storage.dir
    );

    state.ensure_signed_in().await?;
    // An unreachable service is not fatal; the board fills on the next invalidation
    match state.board.load_venues().await {
        Ok(venues) => info!("{} venues available", venues.len()),
        Err(e) if e.is_transient() => warn!("venues unavailable for now: {}", e),
        Err(e) => return Err(e),
    }
    match state.board.set_range(week_of(Utc::now())?).await {
        Ok(()) => info!("{} bookings on the board this week", state.board.events().len()),
        Err(e) if e.is_transient() => warn!("bookings unavailable for now: {}", e),
        Err(e) => return Err(e),
    }

    let live = LiveChannel::spawn(LiveSettings::from_config(&config), state.sessions.clone());
    let router = BookingEventRouter::new(
        state.cache.clone(),
        state.log.clone(),
        state.notices.clone(),
    )
    .spawn(live.subscribe());

    let mut notices = state.notices.subscribe();
    let mut invalidations = state.board.invalidations();
    let mut connection = live.state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            changed = invalidations.changed() => {
                if changed.is_err() {
                    break;
                }
                if state.board.selected_venue().is_none() {
                    if let Err(e) = state.board.load_venues().await {
                        warn!("venues still unavailable: {}", e);
                    }
                }
                match state.board.refresh().await {
                    Ok(()) => debug!("board refreshed: {} events", state.board.events().len()),
                    Err(e) => warn!("board refresh failed, keeping last view: {}", e),
                }
                if let Some(latest) = state.log.items().first() {
                    info!(
                        "{} ({}) [{} unread]",
                        latest.summary(),
                        latest.time_line(state.timezone),
                        state.log.unread_count()
                    );
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *connection.borrow_and_update();
                match current {
                    ConnectionState::Connected => info!("live channel connected"),
                    ConnectionState::Failed => {
                        warn!("live channel gave up; bookings refresh only on demand");
                        if let Some(failure) = live.last_failure() {
                            log_notice(&failure);
                        }
                    }
                    other => debug!("live channel: {:?}", other),
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => log_notice(&notice),
                Err(RecvError::Lagged(skipped)) => warn!("{} notices dropped", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    live.shutdown().await;
    router.abort();
    Ok(())
}

fn log_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Success | NoticeLevel::Info => info!("{}", notice.message),
        NoticeLevel::Warning => warn!("{}", notice.message),
        NoticeLevel::Error => error!("{}", notice.message),
    }
    if let Some(redirect) = &notice.redirect {
        debug!("notice asks to move to {:?}", redirect);
    }
}

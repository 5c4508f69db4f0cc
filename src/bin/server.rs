use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use dungeon_depths_server::constants::{
    ATTACK_THROTTLE_MS, MAX_IN_FLIGHT_MESSAGES, MAX_PENDING_MESSAGES, MOVE_THROTTLE_MS,
};
use dungeon_depths_server::engine::GameEngine;
use dungeon_depths_server::server_protocol::{
    parse_client_message, ClientIntent, ServerMessageKind,
};
use dungeon_depths_server::server_utils::{
    parse_character, parse_leaderboard_limit, sanitize_name,
};
use dungeon_depths_server::session::SessionManager;
use dungeon_depths_server::store::{now_iso, GameStore, LeaderboardStore};
use dungeon_depths_server::types::{
    Delta, Direction, EnemyKind, EnemyVariant, EventData, GameStatus, LeaderboardRecord,
    VisibleGameState,
};
use futures_util::{SinkExt, StreamExt};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GAME_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionManager>,
    leaderboard: Arc<Mutex<LeaderboardStore>>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(rename = "gameId")]
    game_id: Option<String>,
    #[serde(rename = "playerName")]
    player_name: Option<String>,
    character: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000);
    let data_dir = std::env::var("GAME_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data"));

    let state = AppState {
        sessions: Arc::new(SessionManager::new(GameStore::new(&data_dir))),
        leaderboard: Arc::new(Mutex::new(LeaderboardStore::new(&data_dir))),
    };
    Arc::clone(&state.sessions).spawn_idle_sweeper();

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/ws", get(ws_handler))
        .layer(cors_layer())
        .with_state(state.clone());

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!(port, data_dir = %data_dir.display(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server runtime failed");

    let drained = state.sessions.drain().await;
    info!(drained, "sessions flushed; exiting");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let development = std::env::var("APP_ENV")
        .map(|value| value == "development")
        .unwrap_or(false);
    if development {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}

fn cors_layer() -> CorsLayer {
    match std::env::var("ALLOWED_ORIGINS") {
        Ok(raw) if !raw.trim().is_empty() => {
            let origins: Vec<HeaderValue> = raw
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::permissive(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let guard = state.leaderboard.lock().await;
    Json(guard.build_response(parse_leaderboard_limit(query.limit.as_deref())))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, query))
}

async fn handle_socket(state: AppState, socket: WebSocket, query: WsQuery) {
    let transport_id = NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed);
    // The outbound channel capacity is the in-flight cap: awaited sends gate
    // the turn processor once this many messages are unconsumed.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(MAX_IN_FLIGHT_MESSAGES);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let game_id = match open_game(&state, transport_id, &query).await {
        Ok((game_id, visible)) => {
            let init = json!({
                "type": ServerMessageKind::Init.as_str(),
                "state": visible,
            });
            if out_tx.send(init.to_string()).await.is_err() {
                state.sessions.unregister(&game_id, Some(transport_id)).await;
                drop(out_tx);
                let _ = writer.await;
                return;
            }
            game_id
        }
        Err(message) => {
            let _ = out_tx
                .send(error_payload(&message))
                .await;
            drop(out_tx);
            let _ = writer.await;
            return;
        }
    };

    // Bounded pending queue; arrivals beyond the budget are dropped.
    let (intent_tx, intent_rx) = mpsc::channel::<ClientIntent>(MAX_PENDING_MESSAGES);
    let closed = Arc::new(AtomicBool::new(false));
    let processor = tokio::spawn(process_intents(
        state.clone(),
        game_id.clone(),
        transport_id,
        out_tx.clone(),
        intent_rx,
        Arc::clone(&closed),
    ));

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };
        match message {
            Message::Text(raw) => match parse_client_message(&raw) {
                Some(intent) => {
                    if intent_tx.try_send(intent).is_err() {
                        debug!(game_id, "pending queue full; intent dropped");
                    }
                }
                None => {
                    if out_tx.try_send(error_payload("invalid message")).is_err() {
                        break;
                    }
                }
            },
            Message::Binary(_) => {
                if out_tx
                    .try_send(error_payload("binary frames are not supported"))
                    .is_err()
                {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // A turn already being processed completes; its deltas die with the
    // writer. Everything still queued is discarded.
    closed.store(true, Ordering::Relaxed);
    drop(intent_tx);
    let _ = processor.await;
    state.sessions.unregister(&game_id, Some(transport_id)).await;
    drop(out_tx);
    let _ = writer.await;
}

async fn open_game(
    state: &AppState,
    transport_id: u64,
    query: &WsQuery,
) -> Result<(String, VisibleGameState), String> {
    if let Some(game_id) = query.game_id.as_deref() {
        let seed = rand::rng().random();
        if let Some(visible) = state.sessions.attach(game_id, transport_id, seed).await {
            return Ok((game_id.to_string(), visible));
        }
        debug!(game_id, "unknown game id; starting fresh");
    }

    let game_id = make_game_id();
    let player_name = sanitize_name(query.player_name.as_deref().unwrap_or(""));
    let character = parse_character(query.character.as_deref());
    let game = GameEngine::new_game(
        game_id.clone(),
        player_name,
        character,
        rand::rng().random(),
    )
    .map_err(|err| {
        error!(error = %err, "failed to create game");
        "failed to create game".to_string()
    })?;
    let visible = state.sessions.register(&game_id, transport_id, game).await;
    info!(game_id, "new game created");
    Ok((game_id, visible))
}

#[derive(Clone, Copy)]
enum TurnKind {
    Move(Direction),
    Attack,
    Descend,
}

enum TurnVerdict {
    Completed {
        payload: String,
        status: GameStatus,
        new_floor: bool,
        death: Option<(String, EnemyKind, EnemyVariant)>,
        score: i32,
        floor: i32,
        player_name: String,
    },
    NotActive,
    Superseded,
    Failed(String),
}

async fn process_intents(
    state: AppState,
    game_id: String,
    transport_id: u64,
    out_tx: mpsc::Sender<String>,
    mut intent_rx: mpsc::Receiver<ClientIntent>,
    closed: Arc<AtomicBool>,
) {
    let mut last_move: Option<Instant> = None;
    let mut last_attack: Option<Instant> = None;

    while let Some(intent) = intent_rx.recv().await {
        if closed.load(Ordering::Relaxed) {
            break;
        }

        let turn = match intent {
            ClientIntent::Pause => {
                state.sessions.set_paused(&game_id, true).await;
                continue;
            }
            ClientIntent::Resume => {
                state.sessions.set_paused(&game_id, false).await;
                continue;
            }
            ClientIntent::Move { direction } => {
                if !throttle_allows(&mut last_move, MOVE_THROTTLE_MS) {
                    continue;
                }
                TurnKind::Move(direction)
            }
            ClientIntent::Attack => {
                if !throttle_allows(&mut last_attack, ATTACK_THROTTLE_MS) {
                    continue;
                }
                TurnKind::Attack
            }
            ClientIntent::Descend => TurnKind::Descend,
        };

        let verdict = state
            .sessions
            .with_session(&game_id, |session| run_turn(session, transport_id, turn))
            .await;

        match verdict {
            None => {
                let _ = out_tx.try_send(error_payload("unknown game"));
                break;
            }
            Some(TurnVerdict::Superseded) => break,
            Some(TurnVerdict::NotActive) => {
                if out_tx.try_send(error_payload("game is not active")).is_err() {
                    break;
                }
            }
            Some(TurnVerdict::Failed(message)) => {
                error!(game_id, message, "turn failed; state not checkpointed");
                if out_tx.try_send(error_payload("internal error")).is_err() {
                    break;
                }
            }
            Some(TurnVerdict::Completed {
                payload,
                status,
                new_floor,
                death,
                score,
                floor,
                player_name,
            }) => {
                if out_tx.send(payload).await.is_err() {
                    break;
                }
                let terminal = status != GameStatus::Active;
                if terminal || new_floor {
                    state.sessions.checkpoint(&game_id).await;
                }
                if terminal {
                    record_finish(&state, &game_id, player_name, score, floor, death).await;
                }
            }
        }
    }
}

fn run_turn(
    session: &mut dungeon_depths_server::session::Session,
    transport_id: u64,
    turn: TurnKind,
) -> TurnVerdict {
    if session.transport_id != transport_id {
        return TurnVerdict::Superseded;
    }
    if session.game.state.status != GameStatus::Active {
        return TurnVerdict::NotActive;
    }

    let result = match turn {
        TurnKind::Move(direction) => session.game.move_with_deltas(direction),
        TurnKind::Attack => session.game.attack_with_deltas(),
        TurnKind::Descend => session.game.descend_with_deltas(),
    };
    match result {
        Ok(output) => {
            let new_floor = output
                .deltas
                .iter()
                .any(|delta| matches!(delta, Delta::NewFloor { .. }));
            let death = output.events.iter().find_map(|event| match &event.data {
                EventData::PlayerDied {
                    killed_by,
                    killed_by_type,
                    killed_by_variant,
                } => Some((killed_by.clone(), *killed_by_type, *killed_by_variant)),
                _ => None,
            });
            let payload = json!({
                "type": ServerMessageKind::Update.as_str(),
                "deltas": output.deltas,
            })
            .to_string();
            let state = &session.game.state;
            TurnVerdict::Completed {
                payload,
                status: state.status,
                new_floor,
                death,
                score: state.score,
                floor: state.floor,
                player_name: state.player_name.clone(),
            }
        }
        Err(err) => TurnVerdict::Failed(err.to_string()),
    }
}

async fn record_finish(
    state: &AppState,
    game_id: &str,
    player_name: String,
    score: i32,
    floor: i32,
    death: Option<(String, EnemyKind, EnemyVariant)>,
) {
    let (killed_by, killed_by_type, killed_by_variant) = match death {
        Some((name, kind, variant)) => (Some(name), Some(kind), Some(variant)),
        None => (None, None, None),
    };
    let record = LeaderboardRecord {
        id: game_id.to_string(),
        player_name,
        score,
        floor,
        killed_by,
        killed_by_type,
        killed_by_variant,
        created_at: now_iso(),
    };
    let mut leaderboard = state.leaderboard.lock().await;
    if let Err(err) = leaderboard.insert(record) {
        error!(game_id, error = %err, "leaderboard insert failed");
    } else {
        info!(game_id, score, floor, "game finished");
    }
}

fn throttle_allows(last: &mut Option<Instant>, min_interval_ms: u64) -> bool {
    let now = Instant::now();
    if let Some(previous) = *last {
        if now.duration_since(previous).as_millis() < min_interval_ms as u128 {
            return false;
        }
    }
    *last = Some(now);
    true
}

fn error_payload(message: &str) -> String {
    json!({
        "type": ServerMessageKind::Error.as_str(),
        "message": message,
    })
    .to_string()
}

fn make_game_id() -> String {
    let seq = NEXT_GAME_SEQ.fetch_add(1, Ordering::Relaxed);
    let token: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("game_{seq}_{token}")
}

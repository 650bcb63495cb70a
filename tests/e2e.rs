//! End-to-end tests against a running server on a loopback port

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use sock_soccer_server::app::AppState;
use sock_soccer_server::config::{Config, GameConfig};
use sock_soccer_server::http::build_router;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(game: GameConfig) -> (SocketAddr, watch::Sender<bool>) {
    spawn_server_with_heartbeat(game, Duration::from_secs(5)).await
}

async fn spawn_server_with_heartbeat(
    game: GameConfig,
    heartbeat: Duration,
) -> (SocketAddr, watch::Sender<bool>) {
    let config = Config {
        server_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".into(),
        log_json: false,
        client_origin: None,
        heartbeat,
        game,
    };

    let (state, scheduler, shutdown_tx) = AppState::new(config);
    tokio::spawn(scheduler.run(state.shutdown.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, shutdown_tx)
}

fn game(max_players: usize) -> GameConfig {
    GameConfig {
        max_players,
        seed: Some(11),
        ..GameConfig::default()
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next JSON text frame, or None once the server closed the socket
async fn next_json(ws: &mut Client) -> Option<Value> {
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out waiting for frame") {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => {}
        }
    }
}

/// Skip frames until one satisfies `pred`
async fn wait_for(ws: &mut Client, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let value = next_json(ws).await.expect("connection closed");
        if pred(&value) {
            return value;
        }
    }
}

async fn join(addr: SocketAddr, name: &str) -> (Client, Value) {
    let mut ws = connect(addr).await;
    send(&mut ws, json!({"type": "join", "name": name})).await;
    let welcome = next_json(&mut ws).await.expect("no welcome");
    (ws, welcome)
}

fn is_type(value: &Value, kind: &str) -> bool {
    value["type"] == kind
}

#[tokio::test]
async fn players_are_balanced_across_teams() {
    let (addr, _shutdown) = spawn_server(game(4)).await;

    let (mut a, welcome_a) = join(addr, "Alice").await;
    assert_eq!(welcome_a["type"], "welcome");
    assert_eq!(welcome_a["team"], "red");
    assert_eq!(welcome_a["tick_rate"], 30);
    assert_eq!(welcome_a["field"], json!([1200.0, 700.0, 20.0, 220.0]));

    let (_b, welcome_b) = join(addr, "Bob").await;
    assert_eq!(welcome_b["team"], "blue");
    assert_ne!(welcome_a["id"], welcome_b["id"]);

    let toast = wait_for(&mut a, |v| is_type(v, "toast") && v["msg"] == "Bob joined!").await;
    assert_eq!(toast["msg"], "Bob joined!");

    let state = wait_for(&mut a, |v| is_type(v, "state")).await;
    let snapshot = &state["snapshot"];
    let players = snapshot["players"].as_array().unwrap();
    assert_eq!(players.len(), 2);
    assert_eq!(snapshot["score"], json!([0, 0]));
    assert_eq!(snapshot["ball"]["x"], 600.0);
    assert_eq!(snapshot["ball"]["y"], 350.0);
}

#[tokio::test]
async fn full_room_rejects_the_extra_client() {
    let (addr, _shutdown) = spawn_server(game(2)).await;
    let (mut a, _) = join(addr, "a").await;
    let (_b, _) = join(addr, "b").await;

    let (mut c, reply) = join(addr, "c").await;
    assert_eq!(reply["type"], "reject");
    assert!(reply["reason"].as_str().unwrap().contains("full"));
    assert!(next_json(&mut c).await.is_none());

    // Still two players after the refused join
    let state = wait_for(&mut a, |v| is_type(v, "state")).await;
    assert_eq!(state["snapshot"]["players"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn first_message_must_be_a_join() {
    let (addr, _shutdown) = spawn_server(game(4)).await;
    let mut ws = connect(addr).await;
    send(&mut ws, json!({"type": "ping", "t": 1})).await;

    let reply = next_json(&mut ws).await.unwrap();
    assert_eq!(reply, json!({"type": "reject", "reason": "malformed join"}));
    assert!(next_json(&mut ws).await.is_none());
}

#[tokio::test]
async fn ping_is_echoed_and_protocol_errors_are_reported() {
    let (addr, _shutdown) = spawn_server(game(4)).await;
    let (mut ws, _) = join(addr, "p").await;

    send(&mut ws, json!({"type": "ping", "t": "abc"})).await;
    let pong = wait_for(&mut ws, |v| is_type(v, "pong")).await;
    assert_eq!(pong["t"], "abc");

    send(&mut ws, json!({"type": "join", "name": "again"})).await;
    let error = wait_for(&mut ws, |v| is_type(v, "error")).await;
    assert_eq!(error["code"], "already_joined");

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let error = wait_for(&mut ws, |v| is_type(v, "error")).await;
    assert_eq!(error["code"], "bad_message");

    // Still in the room
    let state = wait_for(&mut ws, |v| is_type(v, "state")).await;
    assert_eq!(state["snapshot"]["players"][0]["name"], "p");
}

#[tokio::test]
async fn kick_reaches_the_ball_and_starts_cooldown() {
    // Small pitch so the red spawn sits within kick reach of the centre spot
    let config = GameConfig {
        field_width: 140.0,
        field_height: 120.0,
        goal_height: 40.0,
        seed: Some(5),
        ..GameConfig::default()
    };
    let impulse = config.kick_impulse;
    let friction = config.ball_friction;
    let cooldown = config.kick_cooldown;
    let (addr, _shutdown) = spawn_server(config).await;

    let (mut ws, welcome) = join(addr, "Striker").await;
    assert_eq!(welcome["team"], "red");
    send(&mut ws, json!({"type": "input", "kick": true, "aimx": 1, "aimy": 0})).await;

    let state = wait_for(&mut ws, |v| {
        is_type(v, "state") && v["snapshot"]["ball"]["vx"].as_f64().unwrap_or(0.0) != 0.0
    })
    .await;
    let snapshot = &state["snapshot"];

    let vx = snapshot["ball"]["vx"].as_f64().unwrap() as f32;
    assert!((vx - impulse * friction).abs() < 0.01);
    assert_eq!(snapshot["ball"]["vy"].as_f64().unwrap(), 0.0);

    let player = &snapshot["players"][0];
    assert!((player["cooldown"].as_f64().unwrap() as f32 - cooldown).abs() < 1e-3);
    assert_eq!(snapshot["event"], "Striker kicked!");
}

#[tokio::test]
async fn leaving_frees_the_slot_and_notifies_others() {
    let (addr, _shutdown) = spawn_server(game(2)).await;
    let (mut a, _) = join(addr, "stay").await;
    let (mut b, _) = join(addr, "go").await;

    b.close(None).await.unwrap();
    drop(b);

    wait_for(&mut a, |v| is_type(v, "toast") && v["msg"] == "go left.").await;
    let state = wait_for(&mut a, |v| is_type(v, "state")).await;
    assert_eq!(state["snapshot"]["players"].as_array().unwrap().len(), 1);

    // The freed slot is available again and goes to the short team
    let (_c, welcome) = join(addr, "next").await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["team"], "blue");
}

#[tokio::test]
async fn silent_client_is_dropped_after_heartbeat() {
    let (addr, _shutdown) = spawn_server_with_heartbeat(game(4), Duration::from_millis(300)).await;
    let (mut watcher, _) = join(addr, "watcher").await;

    // Never read again, so no pongs go back and no messages are sent
    let (_silent, welcome) = join(addr, "silent").await;
    assert_eq!(welcome["type"], "welcome");

    // The watcher keeps reading, which answers server pings
    wait_for(&mut watcher, |v| is_type(v, "toast") && v["msg"] == "silent left.").await;
    let state = wait_for(&mut watcher, |v| is_type(v, "state")).await;
    let players = state["snapshot"]["players"].as_array().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["name"], "watcher");
}

#[tokio::test]
async fn pings_do_not_extend_the_handshake() {
    let (addr, _shutdown) = spawn_server_with_heartbeat(game(4), Duration::from_millis(300)).await;
    let mut ws = connect(addr).await;

    let started = std::time::Instant::now();
    let mut closed = false;
    while started.elapsed() < Duration::from_secs(3) {
        if ws.send(Message::Ping(Vec::new())).await.is_err() {
            closed = true;
            break;
        }
        match timeout(Duration::from_millis(100), ws.next()).await {
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(_))) | Err(_) => {}
        }
    }
    assert!(closed, "unjoined connection outlived the handshake deadline");
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let (addr, shutdown) = spawn_server(game(4)).await;
    let (mut ws, _) = join(addr, "p").await;

    shutdown.send(true).unwrap();

    loop {
        if next_json(&mut ws).await.is_none() {
            break;
        }
    }
}

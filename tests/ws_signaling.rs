mod common;

use common::{DeniedSource, FakeFactory, FakeSource, Probe};
use futures_util::{SinkExt, StreamExt};
use meshcall::client::{NullView, Session, SessionConfig};
use meshcall::{server, AppState, ClientMessage, ConnectionId, Error, ServerMessage};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, AppState) {
    let state = AppState::default();
    let app = server::router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    (addr, state)
}

async fn open(addr: SocketAddr) -> (Ws, ConnectionId) {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Connected { id } => (ws, id),
        other => panic!("expected connected, got {:?}", other),
    }
}

async fn send(ws: &mut Ws, msg: ClientMessage) {
    let text = serde_json::to_string(&msg).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

async fn recv(ws: &mut Ws) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn recv_until(ws: &mut Ws, wanted: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        let msg = recv(ws).await;
        if wanted(&msg) {
            return msg;
        }
    }
}

async fn join(ws: &mut Ws, room: &str, name: &str) -> Vec<meshcall::MemberInfo> {
    send(
        ws,
        ClientMessage::JoinRoom {
            room_id: room.to_string(),
            display_name: name.to_string(),
            avatar: "bunny".to_string(),
        },
    )
    .await;
    match recv(ws).await {
        ServerMessage::ExistingUsers { users } => users,
        other => panic!("expected existing-users, got {:?}", other),
    }
}

#[tokio::test]
async fn test_join_relay_and_disconnect_over_websocket() {
    let (addr, _state) = start_server().await;
    let (mut a, a_id) = open(addr).await;
    let (mut b, b_id) = open(addr).await;

    assert!(join(&mut a, "demo", "alice").await.is_empty());
    let roster = join(&mut b, "Demo", "bob").await;
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].id, a_id);
    assert_eq!(roster[0].display_name, "alice");

    match recv(&mut a).await {
        ServerMessage::UserJoined(member) => {
            assert_eq!(member.id, b_id);
            assert_eq!(member.avatar, "bunny");
        }
        other => panic!("expected user-joined, got {:?}", other),
    }

    send(
        &mut b,
        ClientMessage::Offer {
            sdp: json!({"type": "offer", "sdp": "v=0"}),
            to: a_id.clone(),
        },
    )
    .await;
    assert_eq!(
        recv(&mut a).await,
        ServerMessage::Offer {
            sdp: json!({"type": "offer", "sdp": "v=0"}),
            from: b_id.clone(),
            display_name: "bob".to_string(),
            avatar: "bunny".to_string(),
        }
    );

    send(
        &mut a,
        ClientMessage::Answer {
            sdp: json!({"type": "answer"}),
            to: b_id.clone(),
        },
    )
    .await;
    send(
        &mut a,
        ClientMessage::IceCandidate {
            candidate: json!({"candidate": "host"}),
            to: b_id.clone(),
        },
    )
    .await;
    assert!(matches!(recv(&mut b).await, ServerMessage::Answer { from, .. } if from == a_id));
    assert!(matches!(recv(&mut b).await, ServerMessage::IceCandidate { from, .. } if from == a_id));

    b.close(None).await.unwrap();
    assert_eq!(recv(&mut a).await, ServerMessage::UserLeft { id: b_id });
}

#[tokio::test]
async fn test_leave_then_close_announces_once() {
    let (addr, state) = start_server().await;
    let (mut a, _) = open(addr).await;
    let (mut b, b_id) = open(addr).await;
    join(&mut a, "demo", "alice").await;
    join(&mut b, "demo", "bob").await;
    recv(&mut a).await;

    send(&mut b, ClientMessage::LeaveRoom).await;
    assert_eq!(recv(&mut a).await, ServerMessage::UserLeft { id: b_id.clone() });
    b.close(None).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while state.relay.is_live(&b_id).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // The next thing alice hears is the newcomer, not a second departure.
    let (mut c, c_id) = open(addr).await;
    join(&mut c, "demo", "carol").await;
    assert!(matches!(recv(&mut a).await, ServerMessage::UserJoined(m) if m.id == c_id));
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let (addr, _state) = start_server().await;
    let (mut a, _) = open(addr).await;

    a.send(Message::Text("{\"type\":\"dance\"}".to_string())).await.unwrap();
    assert!(matches!(recv(&mut a).await, ServerMessage::Error { .. }));

    send(
        &mut a,
        ClientMessage::JoinRoom {
            room_id: "".to_string(),
            display_name: "alice".to_string(),
            avatar: "cat".to_string(),
        },
    )
    .await;
    assert!(matches!(recv(&mut a).await, ServerMessage::Error { .. }));

    assert!(join(&mut a, "demo", "alice").await.is_empty());
}

#[tokio::test]
async fn test_session_answers_offer_and_leaves() {
    let (addr, state) = start_server().await;
    let probe = Arc::new(Probe::default());

    let session = Session::connect(
        SessionConfig {
            url: format!("ws://{}/ws", addr),
            room_id: "demo".to_string(),
            display_name: "sam".to_string(),
            avatar: "panda".to_string(),
        },
        &FakeSource(probe.clone()),
        Arc::new(FakeFactory {
            name: "sam".to_string(),
            probe: probe.clone(),
        }),
        Arc::new(NullView),
    )
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while state.relay.members("demo").await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let (mut b, _) = open(addr).await;
    let roster = join(&mut b, "demo", "bob").await;
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].display_name, "sam");
    let sam_id = roster[0].id.clone();

    send(
        &mut b,
        ClientMessage::Offer {
            sdp: json!({"type": "offer"}),
            to: sam_id.clone(),
        },
    )
    .await;
    let answer = recv_until(&mut b, |m| matches!(m, ServerMessage::Answer { .. })).await;
    assert_eq!(
        answer,
        ServerMessage::Answer {
            sdp: json!({"type": "answer", "sdp": "answer-from-sam"}),
            from: sam_id.clone(),
        }
    );

    session.leave().await.unwrap();
    let left = recv_until(&mut b, |m| matches!(m, ServerMessage::UserLeft { .. })).await;
    assert_eq!(left, ServerMessage::UserLeft { id: sam_id });
    assert_eq!(Probe::get(&probe.media_released), 1);
    assert_eq!(Probe::get(&probe.transports), 1);
    assert_eq!(Probe::get(&probe.closed), 1);
}

#[tokio::test]
async fn test_session_rejects_blank_room_or_name() {
    let (addr, state) = start_server().await;
    let probe = Arc::new(Probe::default());

    for (room, name) in [("  ", "sam"), ("demo", " ")] {
        let result = Session::connect(
            SessionConfig {
                url: format!("ws://{}/ws", addr),
                room_id: room.to_string(),
                display_name: name.to_string(),
                avatar: "panda".to_string(),
            },
            &FakeSource(probe.clone()),
            Arc::new(FakeFactory {
                name: "sam".to_string(),
                probe: probe.clone(),
            }),
            Arc::new(NullView),
        )
        .await;

        match (room.trim().is_empty(), result) {
            (true, Err(Error::EmptyRoomId)) | (false, Err(Error::EmptyDisplayName)) => {}
            (_, other) => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    assert_eq!(Probe::get(&probe.media_acquired), 0);
    assert!(!state.relay.contains_room("demo").await);
}

#[tokio::test]
async fn test_session_without_media_never_joins() {
    let (addr, state) = start_server().await;

    let result = Session::connect(
        SessionConfig {
            url: format!("ws://{}/ws", addr),
            room_id: "demo".to_string(),
            display_name: "sam".to_string(),
            avatar: "panda".to_string(),
        },
        &DeniedSource,
        Arc::new(FakeFactory {
            name: "sam".to_string(),
            probe: Arc::new(Probe::default()),
        }),
        Arc::new(NullView),
    )
    .await;

    assert!(matches!(result, Err(Error::Capability(_))));
    assert!(!state.relay.contains_room("demo").await);
}

#[tokio::test]
async fn test_session_connect_failure_releases_media() {
    let probe = Arc::new(Probe::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Session::connect(
        SessionConfig {
            url: format!("ws://{}/ws", addr),
            room_id: "demo".to_string(),
            display_name: "sam".to_string(),
            avatar: "panda".to_string(),
        },
        &FakeSource(probe.clone()),
        Arc::new(FakeFactory {
            name: "sam".to_string(),
            probe: probe.clone(),
        }),
        Arc::new(NullView),
    )
    .await;

    assert!(matches!(result, Err(Error::WebSocket(_))));
    assert_eq!(Probe::get(&probe.media_released), 1);
}

//! End-to-end tests over real loopback sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

use framewire::protocol::envelope;
use framewire::serializer::MsgPackSerializer;
use framewire::{
    ClientConfig, ClientState, Connection, Envelope, ServerConfig, ServerState, TcpClient,
    TcpServer, TransportEvent,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Chat {
    seq: u32,
    text: String,
}

fn local_server() -> TcpServer {
    TcpServer::new(ServerConfig::new("127.0.0.1:0".parse().unwrap()))
}

async fn connect(addr: SocketAddr) -> (TcpClient, Arc<Connection>) {
    let client = TcpClient::new(ClientConfig::default());
    let conn = client.connect(addr).await.unwrap();
    (client, conn)
}

/// Wait for the next Connected event, skipping anything else.
async fn next_connected(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Arc<Connection> {
    loop {
        match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
            TransportEvent::Connected(conn) => return conn,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn typed_echo_roundtrip() {
    let server = local_server();
    server
        .registry()
        .register_typed(
            "Chat",
            MsgPackSerializer,
            |conn: Arc<Connection>, msg: Chat| async move {
                conn.send(
                    "Chat",
                    &Chat {
                        seq: msg.seq,
                        text: format!("echo: {}", msg.text),
                    },
                )
                .await
            },
        )
        .unwrap();
    let addr = server.start().await.unwrap();

    let (client, conn) = connect(addr).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .registry()
        .register_typed("Chat", MsgPackSerializer, move |_conn, msg: Chat| {
            let tx = tx.clone();
            async move {
                tx.send(msg).ok();
                Ok(())
            }
        })
        .unwrap();

    conn.send(
        "Chat",
        &Chat {
            seq: 1,
            text: "hello".into(),
        },
    )
    .await
    .unwrap();

    let reply = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(reply.seq, 1);
    assert_eq!(reply.text, "echo: hello");

    server.stop();
}

#[tokio::test]
async fn many_frames_arrive_in_order() {
    let server = local_server();
    server
        .registry()
        .register_typed(
            "Chat",
            MsgPackSerializer,
            |conn: Arc<Connection>, msg: Chat| async move { conn.send("Chat", &msg).await },
        )
        .unwrap();
    let addr = server.start().await.unwrap();

    let (client, conn) = connect(addr).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .registry()
        .register_typed("Chat", MsgPackSerializer, move |_conn, msg: Chat| {
            let tx = tx.clone();
            async move {
                tx.send(msg).ok();
                Ok(())
            }
        })
        .unwrap();

    let count = 200u32;
    for seq in 0..count {
        conn.send(
            "Chat",
            &Chat {
                seq,
                text: "x".repeat((seq as usize % 500) + 1),
            },
        )
        .await
        .unwrap();
    }

    for expected in 0..count {
        let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(msg.seq, expected);
    }

    server.stop();
}

#[tokio::test]
async fn encrypted_roundtrip() {
    let (server_private, server_public) = envelope::generate_keys().unwrap();
    let (client_private, client_public) = envelope::generate_keys().unwrap();

    let server = local_server();
    server
        .registry()
        .register_typed(
            "Chat",
            MsgPackSerializer,
            |conn: Arc<Connection>, msg: Chat| async move { conn.send("Chat", &msg).await },
        )
        .unwrap();
    let mut server_events = server.events();
    let addr = server.start().await.unwrap();

    let (client, conn) = connect(addr).await;
    let server_conn = next_connected(&mut server_events).await;

    server_conn.set_envelope(Envelope::sealed(server_private, client_public));
    conn.set_envelope(Envelope::sealed(client_private, server_public));
    assert!(conn.is_sealed());

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .registry()
        .register_typed("Chat", MsgPackSerializer, move |_conn, msg: Chat| {
            let tx = tx.clone();
            async move {
                tx.send(msg).ok();
                Ok(())
            }
        })
        .unwrap();

    let sent = Chat {
        seq: 9,
        text: "sealed".into(),
    };
    conn.send("Chat", &sent).await.unwrap();

    let got = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, sent);

    server.stop();
}

#[tokio::test]
async fn configured_encryption_applies_to_every_connection() {
    use framewire::protocol::envelope::EnvelopeKeys;

    let (server_private, server_public) = envelope::generate_keys().unwrap();
    let (client_private, client_public) = envelope::generate_keys().unwrap();

    let mut server_config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
    server_config.transport.encryption = Some(EnvelopeKeys {
        local_private: server_private,
        remote_public: client_public,
    });
    let server = TcpServer::new(server_config);
    server
        .registry()
        .register_typed(
            "Chat",
            MsgPackSerializer,
            |conn: Arc<Connection>, msg: Chat| async move { conn.send("Chat", &msg).await },
        )
        .unwrap();
    let addr = server.start().await.unwrap();

    let mut client_config = ClientConfig::default();
    client_config.transport.encryption = Some(EnvelopeKeys {
        local_private: client_private,
        remote_public: server_public,
    });
    let client = TcpClient::new(client_config);
    let conn = client.connect(addr).await.unwrap();
    assert!(conn.is_sealed());

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .registry()
        .register_typed("Chat", MsgPackSerializer, move |_conn, msg: Chat| {
            let tx = tx.clone();
            async move {
                tx.send(msg).ok();
                Ok(())
            }
        })
        .unwrap();

    let sent = Chat {
        seq: 4,
        text: "configured".into(),
    };
    conn.send("Chat", &sent).await.unwrap();
    let got = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, sent);

    server.stop();
}

#[tokio::test]
async fn peer_send_routes_by_transport() {
    let server = local_server();
    server
        .registry()
        .register_typed(
            "Chat",
            MsgPackSerializer,
            |conn: Arc<Connection>, msg: Chat| async move { conn.send("Chat", &msg).await },
        )
        .unwrap();
    let mut events = server.events();
    let addr = server.start().await.unwrap();

    let (client, _conn) = connect(addr).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .registry()
        .register_typed("Chat", MsgPackSerializer, move |_conn, msg: Chat| {
            let tx = tx.clone();
            async move {
                tx.send(msg).ok();
                Ok(())
            }
        })
        .unwrap();

    let server_conn = next_connected(&mut events).await;
    let peer = framewire::Peer::new("router");
    peer.add_connection(server.connections(), &server_conn);

    let msg = Chat {
        seq: 11,
        text: "routed".into(),
    };
    peer.send("tcp", "Chat", &msg).await.unwrap();
    let got = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(got, msg);

    let err = peer.send("pipe", "Chat", &msg).await.unwrap_err();
    assert!(matches!(err, framewire::FramewireError::NotConnected));

    server.stop();
}

#[tokio::test]
async fn garbage_stream_tears_connection_down() {
    let server = local_server();
    let mut events = server.events();
    let addr = server.start().await.unwrap();

    let mut raw = tokio::net::TcpStream::connect(addr).await.unwrap();
    let _ = next_connected(&mut events).await;

    // A length prefix far beyond the reassembly capacity.
    raw.write_all(&[0xFF; 256]).await.unwrap();

    let disconnected = timeout(WAIT, async {
        loop {
            match events.recv().await.unwrap() {
                TransportEvent::Disconnected(conn) => break conn,
                _ => continue,
            }
        }
    })
    .await
    .unwrap();

    assert!(!disconnected.is_connected());
    assert_eq!(server.connections().len(), 0);

    server.stop();
}

#[tokio::test]
async fn unknown_command_does_not_kill_connection() {
    let server = local_server();
    server
        .registry()
        .register_typed(
            "Chat",
            MsgPackSerializer,
            |conn: Arc<Connection>, msg: Chat| async move { conn.send("Chat", &msg).await },
        )
        .unwrap();
    let addr = server.start().await.unwrap();

    let (client, conn) = connect(addr).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .registry()
        .register_typed("Chat", MsgPackSerializer, move |_conn, msg: Chat| {
            let tx = tx.clone();
            async move {
                tx.send(msg).ok();
                Ok(())
            }
        })
        .unwrap();

    // Nothing on the server answers to this name.
    conn.send_body("NoSuchCommand", b"ignored").await.unwrap();
    conn.send(
        "Chat",
        &Chat {
            seq: 2,
            text: "still here".into(),
        },
    )
    .await
    .unwrap();

    let reply = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(reply.text, "still here");
    assert!(conn.is_connected());

    server.stop();
}

#[tokio::test]
async fn builtin_ping_refreshes_activity() {
    let server = local_server();
    let mut events = server.events();
    let addr = server.start().await.unwrap();

    let (_client, conn) = connect(addr).await;
    let server_conn = next_connected(&mut events).await;
    let before = server_conn.last_activity();

    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.send_body("Ping", &[1]).await.unwrap();

    timeout(WAIT, async {
        while server_conn.stats().frames_received() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(server_conn.last_activity() > before);
    assert_eq!(server_conn.stats().frames_received(), 1);

    server.stop();
}

#[tokio::test]
async fn peer_binding_rebinds_connection_id() {
    let server = local_server();
    let mut events = server.events();
    let addr = server.start().await.unwrap();

    let (_client, _conn) = connect(addr).await;
    let server_conn = next_connected(&mut events).await;
    let original_id = server_conn.id();

    let peer = framewire::Peer::new("player-42");
    peer.add_connection(server.connections(), &server_conn);

    assert_eq!(server_conn.id(), peer.connection_id());
    assert!(server.connections().get(&original_id).is_none());
    let rebound = server.connections().get(peer.connection_id()).unwrap();
    assert!(Arc::ptr_eq(&rebound, &server_conn));
    assert_eq!(
        server_conn.peer().unwrap().application_id(),
        "player-42"
    );

    server.stop();
}

#[tokio::test]
async fn peer_replaces_same_transport_connection() {
    let server = local_server();
    let mut events = server.events();
    let addr = server.start().await.unwrap();

    let peer = framewire::Peer::new("player-7");

    let (_client_a, _conn_a) = connect(addr).await;
    let first = next_connected(&mut events).await;
    peer.add_connection(server.connections(), &first);

    let (_client_b, _conn_b) = connect(addr).await;
    let second = next_connected(&mut events).await;
    peer.add_connection(server.connections(), &second);

    assert!(!first.is_connected());
    assert_eq!(peer.connection_count(), 1);
    let current = peer.connection(second.transport_name()).unwrap();
    assert!(Arc::ptr_eq(&current, &second));
    assert_eq!(second.id(), peer.connection_id());

    server.stop();
}

#[tokio::test]
async fn concurrent_starts_agree_on_address() {
    let server = local_server();
    let (a, b) = tokio::join!(server.start(), server.start());
    let a = a.unwrap();
    let b = b.unwrap();

    assert_ne!(a.port(), 0);
    assert_eq!(a, b);
    assert_eq!(server.state(), ServerState::Listening);

    server.stop();
}

#[tokio::test]
async fn server_start_is_reentrant() {
    let server = local_server();
    let addr = server.start().await.unwrap();
    assert_eq!(server.state(), ServerState::Listening);

    let again = server.start().await.unwrap();
    assert_eq!(again, addr);
    assert_eq!(server.state(), ServerState::Listening);

    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn client_states_track_lifecycle() {
    let server = local_server();
    let addr = server.start().await.unwrap();

    let client = TcpClient::new(ClientConfig::default());
    assert_eq!(client.state(), ClientState::Disconnected);

    let conn = client.connect(addr).await.unwrap();
    assert_eq!(client.state(), ClientState::Connected);

    client.disconnect();
    assert_eq!(client.state(), ClientState::Disconnected);
    timeout(WAIT, async {
        while conn.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    server.stop();
}

#[tokio::test]
async fn send_after_close_fails() {
    let server = local_server();
    let addr = server.start().await.unwrap();

    let (client, conn) = connect(addr).await;
    client.disconnect();

    let err = conn.send_body("Chat", b"too late").await.unwrap_err();
    assert!(matches!(err, framewire::FramewireError::NotConnected));

    server.stop();
}

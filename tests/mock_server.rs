//! End-to-end tests of the client against an in-process scripted manager.

use asterisk_ami_tokio::{
    AmiClient, AmiConfig, AmiError, ConnectionState, EventRouter, Packet, PacketKind,
    PacketReader,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const GREETING: &str = "Asterisk Call Manager/5.0.1\r\n";
const LOGIN_OK: &str = "Response: Success\r\nMessage: Authentication accepted\r\n\r\n";
const NO_FIELDS: [(&str, &str); 0] = [];

/// What the mock does after reading each action.
enum Step {
    Reply(&'static str),
    Delayed(Duration, &'static str),
    /// Reply with the request's ActionID after a pause.
    EchoActionId(Duration),
    Silent,
    Close,
}

struct MockServer {
    addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Packet>,
}

impl MockServer {
    async fn next_action(&mut self) -> Packet {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .expect("timeout waiting for action")
            .expect("server task ended")
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn spawn_server(greeting: Option<&'static str>, steps: Vec<Step>) -> MockServer {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    let (tx, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener
            .accept()
            .await
            .unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let Some(greeting) = greeting else {
            return;
        };
        if write_half
            .write_all(greeting.as_bytes())
            .await
            .is_err()
        {
            return;
        }

        let mut reader = PacketReader::new(BufReader::new(read_half));
        let mut steps = steps.into_iter();
        loop {
            let Ok(packet) = reader
                .read_packet()
                .await
            else {
                return;
            };
            let action_id = packet
                .action_id()
                .unwrap_or("")
                .to_string();
            let _ = tx.send(packet);

            let reply = match steps.next() {
                Some(Step::Reply(r)) => r.to_string(),
                Some(Step::Delayed(pause, r)) => {
                    tokio::time::sleep(pause).await;
                    r.to_string()
                }
                Some(Step::EchoActionId(pause)) => {
                    tokio::time::sleep(pause).await;
                    format!("Response: Success\r\nActionID: {}\r\n\r\n", action_id)
                }
                Some(Step::Silent) => continue,
                Some(Step::Close) | None => return,
            };
            if write_half
                .write_all(reply.as_bytes())
                .await
                .is_err()
            {
                return;
            }
        }
    });

    MockServer { addr, received }
}

fn client_for(server: &MockServer, config: AmiConfig, router: Arc<EventRouter>) -> AmiClient {
    let config = config
        .with_server("127.0.0.1")
        .with_port(server.addr.port());
    AmiClient::new(config, router)
}

async fn logged_in(steps: Vec<Step>) -> (AmiClient, Arc<EventRouter>, MockServer) {
    logged_in_with(AmiConfig::new(), steps).await
}

async fn logged_in_with(
    config: AmiConfig,
    steps: Vec<Step>,
) -> (AmiClient, Arc<EventRouter>, MockServer) {
    let mut all = vec![Step::Reply(LOGIN_OK)];
    all.extend(steps);
    let mut server = spawn_server(Some(GREETING), all).await;
    let router = Arc::new(EventRouter::new());
    let client = client_for(&server, config, router.clone());
    client
        .connect(None, Some("foo"), Some("bar"))
        .await
        .expect("login should succeed");
    let login = server
        .next_action()
        .await;
    assert_eq!(login.get("Action"), Some("Login"));
    (client, router, server)
}

#[tokio::test]
async fn connect_logs_in() {
    let mut server = spawn_server(Some(GREETING), vec![Step::Reply(LOGIN_OK)]).await;
    let client = client_for(&server, AmiConfig::new(), Arc::new(EventRouter::new()));
    let mut state = client.subscribe_state();

    client
        .connect(None, Some("foo"), Some("bar"))
        .await
        .unwrap();

    assert_eq!(client.state(), ConnectionState::LoggedIn);
    assert_eq!(*state.borrow_and_update(), ConnectionState::LoggedIn);
    assert_eq!(
        client
            .greeting()
            .await
            .as_deref(),
        Some("Asterisk Call Manager/5.0.1")
    );

    let login = server
        .next_action()
        .await;
    let expected: Packet = [("Action", "Login"), ("Username", "foo"), ("Secret", "bar")]
        .into_iter()
        .collect();
    assert_eq!(login, expected);
}

#[tokio::test]
async fn connect_uses_configured_credentials() {
    let mut server = spawn_server(Some(GREETING), vec![Step::Reply(LOGIN_OK)]).await;
    let config = AmiConfig::new().with_credentials("admin", "s3cret");
    let client = client_for(&server, config, Arc::new(EventRouter::new()));

    client
        .connect(None, None, None)
        .await
        .unwrap();

    let login = server
        .next_action()
        .await;
    assert_eq!(login.get("Username"), Some("admin"));
    assert_eq!(login.get("Secret"), Some("s3cret"));
}

#[tokio::test]
async fn embedded_port_overrides_configured_port() {
    let server = spawn_server(Some(GREETING), vec![Step::Reply(LOGIN_OK)]).await;
    let config = AmiConfig::new()
        .with_server("unreachable.invalid")
        .with_port(1);
    let client = AmiClient::new(config, Arc::new(EventRouter::new()));

    let explicit = format!("127.0.0.1:{}", server.addr.port());
    client
        .connect(Some(&explicit), None, None)
        .await
        .unwrap();
    assert!(client.is_logged_in());
}

#[tokio::test]
async fn login_failure_closes_connection() {
    let mut server = spawn_server(
        Some(GREETING),
        vec![Step::Reply(
            "Response: Error\r\nMessage: Authentication failed\r\n\r\n",
        )],
    )
    .await;
    let client = client_for(&server, AmiConfig::new(), Arc::new(EventRouter::new()));

    let err = client
        .connect(None, Some("foo"), Some("wrong"))
        .await
        .unwrap_err();
    match err {
        AmiError::AuthFailed { message } => assert_eq!(message, "Authentication failed"),
        other => panic!("expected AuthFailed, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client
        .greeting()
        .await
        .is_none());

    server
        .next_action()
        .await;
    assert!(matches!(
        client
            .ping()
            .await,
        Err(AmiError::NotConnected)
    ));
}

#[tokio::test]
async fn missing_greeting_is_connect_error() {
    let server = spawn_server(None, vec![]).await;
    let client = client_for(&server, AmiConfig::new(), Arc::new(EventRouter::new()));

    let err = client
        .connect(None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::Connect { .. }), "got {:?}", err);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn silent_greeting_is_connect_error() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();
    let holder = tokio::spawn(async move {
        let (stream, _) = listener
            .accept()
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let config = AmiConfig::new()
        .with_server("127.0.0.1")
        .with_port(port)
        .with_connect_timeout(Duration::from_millis(100));
    let client = AmiClient::new(config, Arc::new(EventRouter::new()));
    let err = client
        .connect(None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::Connect { .. }), "got {:?}", err);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    holder.abort();
}

#[tokio::test]
async fn refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();
    drop(listener);

    let config = AmiConfig::new()
        .with_server("127.0.0.1")
        .with_port(port);
    let client = AmiClient::new(config, Arc::new(EventRouter::new()));
    let err = client
        .connect(None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::Connect { .. }), "got {:?}", err);
}

#[tokio::test]
async fn response_without_events_is_returned_unmodified() {
    let (client, _router, mut server) = logged_in(vec![Step::Reply(
        "Response: Success\r\nActionID: 42\r\nMessage: Variable Set\r\n\r\n",
    )])
    .await;

    let response = client
        .send_request("SetVar", [("Variable", "FOO"), ("Value", "1"), ("ActionID", "42")])
        .await
        .unwrap();
    let expected: Packet = [
        ("Response", "Success"),
        ("ActionID", "42"),
        ("Message", "Variable Set"),
    ]
    .into_iter()
    .collect();
    assert_eq!(response, expected);

    let sent = server
        .next_action()
        .await;
    let expected: Packet = [
        ("Action", "SetVar"),
        ("Variable", "FOO"),
        ("Value", "1"),
        ("ActionID", "42"),
    ]
    .into_iter()
    .collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn ping_dispatches_interleaved_event() {
    let (client, router, server) = logged_in(vec![Step::Reply(
        "Event: Newchannel\r\nChannel: SIP/100-00000001\r\n\r\nResponse: Success\r\nPing: Pong\r\n\r\n",
    )])
    .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    assert!(router.register("Newchannel", move |ctx| {
        sink.lock()
            .unwrap()
            .push((
                ctx.packet
                    .get("Channel")
                    .map(|s| s.to_string()),
                ctx.server
                    .to_string(),
                ctx.port,
            ));
        Value::Null
    }));

    let response = client
        .send_request("Ping", NO_FIELDS)
        .await
        .unwrap();
    let expected: Packet = [("Response", "Success"), ("Ping", "Pong")]
        .into_iter()
        .collect();
    assert_eq!(response, expected);

    let seen = seen
        .lock()
        .unwrap();
    assert_eq!(
        *seen,
        vec![(
            Some("SIP/100-00000001".to_string()),
            "127.0.0.1".to_string(),
            server.addr.port()
        )]
    );
}

#[tokio::test]
async fn events_dispatched_in_order_before_response() {
    let (client, router, _server) = logged_in(vec![Step::Reply(
        "Event: Newchannel\r\n\r\n\
         Event: Newstate\r\nChannelState: 6\r\n\r\n\
         Event: Hangup\r\nCause: 16\r\n\r\n\
         Response: Success\r\nMessage: Channel status will follow\r\n\r\n",
    )])
    .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let wildcard = seen.clone();
    router.register("*", move |ctx| {
        wildcard
            .lock()
            .unwrap()
            .push(ctx.event.to_string());
        Value::Null
    });
    let exact = seen.clone();
    router.register("NEWSTATE", move |ctx| {
        exact
            .lock()
            .unwrap()
            .push(format!("exact:{}", ctx.event));
        Value::Null
    });

    let response = client
        .status(None, None)
        .await
        .unwrap();
    assert_eq!(response.response(), Some("Success"));
    assert_eq!(
        *seen
            .lock()
            .unwrap(),
        vec!["newchannel", "exact:newstate", "hangup"]
    );
}

#[tokio::test]
async fn events_after_response_wait_for_next_call() {
    let (client, router, _server) = logged_in(vec![
        Step::Reply("Response: Success\r\n\r\nEvent: Reload\r\n\r\n"),
        Step::Reply("Response: Success\r\nPing: Pong\r\n\r\n"),
    ])
    .await;

    let count = Arc::new(Mutex::new(0));
    let counter = count.clone();
    router.register("reload", move |_| {
        *counter
            .lock()
            .unwrap() += 1;
        Value::Null
    });

    client
        .events("on")
        .await
        .unwrap();
    assert_eq!(
        *count
            .lock()
            .unwrap(),
        0
    );

    client
        .ping()
        .await
        .unwrap();
    assert_eq!(
        *count
            .lock()
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn unhandled_events_and_unknown_packets_are_skipped() {
    let (client, _router, _server) = logged_in(vec![Step::Reply(
        "Event: PeerStatus\r\n\r\nJunk: packet\r\n\r\nResponse: Success\r\nPing: Pong\r\n\r\n",
    )])
    .await;

    let response = client
        .ping()
        .await
        .unwrap();
    assert_eq!(response.get("Ping"), Some("Pong"));
}

#[tokio::test]
async fn follows_response_carries_data() {
    let (client, _router, mut server) = logged_in(vec![Step::Reply(
        "Response: Follows\r\nline1\r\nline2\r\n--END CODE--\r\nActionID: 9\r\n\r\n",
    )])
    .await;

    let response = client
        .command("core show version", Some("9"))
        .await
        .unwrap();
    let expected: Packet = [
        ("Response", "Follows"),
        ("data", "line1\nline2\n"),
        ("ActionID", "9"),
    ]
    .into_iter()
    .collect();
    assert_eq!(response, expected);
    assert_eq!(response.kind(), PacketKind::Response);

    let sent = server
        .next_action()
        .await;
    assert_eq!(sent.get("Command"), Some("core show version"));
}

#[tokio::test]
async fn closed_connection_fails_request() {
    let (client, _router, _server) = logged_in(vec![Step::Close]).await;

    let err = client
        .ping()
        .await
        .unwrap_err();
    assert!(err.is_disconnect(), "got {:?}", err);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client
            .ping()
            .await,
        Err(AmiError::NotConnected)
    ));
}

#[tokio::test]
async fn tolerated_timeout_returns_empty_packet() {
    let config = AmiConfig::new().with_read_timeout(Some(Duration::from_millis(50)));
    let (client, _router, _server) = logged_in_with(config, vec![Step::Silent]).await;

    let response = client
        .send_request_with("WaitEvent", [("Timeout", "1")], true)
        .await
        .unwrap();
    assert!(response.is_empty());
    assert_eq!(response.kind(), PacketKind::Timeout);
    assert!(client.is_logged_in());
}

#[tokio::test]
async fn default_request_waits_through_timeouts() {
    let config = AmiConfig::new().with_read_timeout(Some(Duration::from_millis(20)));
    let (client, _router, _server) = logged_in_with(
        config,
        vec![Step::Delayed(
            Duration::from_millis(150),
            "Response: Success\r\nPing: Pong\r\n\r\n",
        )],
    )
    .await;

    let response = client
        .send_request("Ping", NO_FIELDS)
        .await
        .unwrap();
    assert_eq!(response.get("Ping"), Some("Pong"));
}

#[tokio::test]
async fn wait_response_pumps_events() {
    let config = AmiConfig::new().with_read_timeout(Some(Duration::from_millis(50)));
    let (client, router, _server) = logged_in_with(
        config,
        vec![Step::Reply(
            "Response: Success\r\nMessage: Events On\r\n\r\nEvent: Newexten\r\nExtension: 100\r\n\r\n",
        )],
    )
    .await;

    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = hits.clone();
    router.register("newexten", move |ctx| {
        let extension = ctx
            .packet
            .get("Extension")
            .unwrap_or("")
            .to_string();
        sink.lock()
            .unwrap()
            .push(extension.clone());
        Value::String(extension)
    });

    client
        .events("on")
        .await
        .unwrap();
    let idle = client
        .wait_response(true)
        .await
        .unwrap();
    assert!(idle.is_empty());
    assert_eq!(
        *hits
            .lock()
            .unwrap(),
        vec!["100"]
    );
}

#[tokio::test]
async fn concurrent_requests_are_serialized() {
    let (client, _router, _server) = logged_in(vec![
        Step::EchoActionId(Duration::from_millis(30)),
        Step::EchoActionId(Duration::from_millis(0)),
    ])
    .await;
    let client = Arc::new(client);

    let mut tasks = Vec::new();
    for id in ["first", "second"] {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let response = client
                .send_request("Ping", [("ActionID", id)])
                .await
                .unwrap();
            assert_eq!(response.action_id(), Some(id));
        }));
    }
    for task in tasks {
        task.await
            .unwrap();
    }
}

#[tokio::test]
async fn cancelled_request_drops_connection() {
    let (client, _router, mut server) = logged_in(vec![
        Step::EchoActionId(Duration::from_millis(200)),
        Step::EchoActionId(Duration::from_millis(0)),
    ])
    .await;

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        client.send_request("Ping", [("ActionID", "first")]),
    )
    .await;
    assert!(cancelled.is_err());
    let sent = server
        .next_action()
        .await;
    assert_eq!(sent.action_id(), Some("first"));

    // The reply to "first" is still in flight; it must never reach a later caller.
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let err = client
        .send_request("Ping", [("ActionID", "second")])
        .await
        .unwrap_err();
    assert!(matches!(err, AmiError::NotConnected), "got {:?}", err);
}

#[tokio::test]
async fn listing_wrappers_send_bare_actions() {
    let (client, _router, mut server) = logged_in(vec![
        Step::Reply("Response: Success\r\n\r\n"),
        Step::Reply("Response: Success\r\nMessage: Peer status list will follow\r\n\r\n"),
    ])
    .await;

    client
        .queues()
        .await
        .unwrap();
    let expected: Packet = [("Action", "Queues")]
        .into_iter()
        .collect();
    assert_eq!(
        server
            .next_action()
            .await,
        expected
    );

    let response = client
        .iax_peers()
        .await
        .unwrap();
    assert_eq!(response.message(), Some("Peer status list will follow"));
    let expected: Packet = [("Action", "IAXPeers")]
        .into_iter()
        .collect();
    assert_eq!(
        server
            .next_action()
            .await,
        expected
    );
}

#[tokio::test]
async fn disconnect_logs_off_and_is_idempotent() {
    let (client, _router, mut server) = logged_in(vec![Step::Reply(
        "Response: Goodbye\r\nMessage: Thanks for all the fish.\r\n\r\n",
    )])
    .await;

    client
        .disconnect()
        .await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let logoff = server
        .next_action()
        .await;
    assert_eq!(logoff.get("Action"), Some("Logoff"));

    client
        .disconnect()
        .await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client
            .ping()
            .await,
        Err(AmiError::NotConnected)
    ));
}

#[tokio::test]
async fn independent_registries_per_client() {
    let (client_a, router_a, _server_a) = logged_in(vec![Step::Reply(
        "Event: Hangup\r\n\r\nResponse: Success\r\n\r\n",
    )])
    .await;
    let (_client_b, router_b, _server_b) = logged_in(vec![]).await;

    let hits_b = Arc::new(Mutex::new(0));
    let counter = hits_b.clone();
    router_b.register("hangup", move |_| {
        *counter
            .lock()
            .unwrap() += 1;
        Value::Null
    });

    assert!(router_a.is_empty());
    client_a
        .ping()
        .await
        .unwrap();
    assert_eq!(
        *hits_b
            .lock()
            .unwrap(),
        0
    );
}

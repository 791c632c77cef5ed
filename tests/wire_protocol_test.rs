// End-to-end tests over a real TCP connection.
//
// Each test starts the server on ephemeral ports with an in-memory store and
// talks to it with the length-prefixed envelope protocol.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taskboard::protocol::{read_frame, write_frame, Envelope};
use taskboard::store::Store;
use taskboard::{RunningServer, Server, ServerConfig};
use tokio::net::TcpStream;

async fn start_server() -> RunningServer {
    let mut config = ServerConfig::default();
    config.server.bind_addr = "127.0.0.1".into();
    config.server.tcp_port = 0;
    config.server.udp_port = 0;
    config.auth.secret = Some("integration-secret".into());
    config.auth.bcrypt_cost = 4;

    let store = Arc::new(Store::in_memory().unwrap());
    Server::bind_with_store(&config, store)
        .await
        .unwrap()
        .spawn()
        .unwrap()
}

struct Client {
    stream: TcpStream,
    next_id: u32,
}

impl Client {
    async fn connect(server: &RunningServer) -> Self {
        let stream = TcpStream::connect(server.local_addr).await.unwrap();
        Self { stream, next_id: 0 }
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Value {
        write_frame(&mut self.stream, bytes).await.unwrap();
        let reply = read_frame(&mut self.stream).await.unwrap();
        serde_json::from_slice(&reply).unwrap()
    }

    async fn call(&mut self, action: &str, token: Option<&str>, payload: Value) -> Value {
        self.next_id += 1;
        let req_id = format!("req-{}", self.next_id);
        let bytes = Envelope::request(req_id.clone(), action, token.map(str::to_string), payload)
            .encode()
            .unwrap();
        let reply = self.send_raw(&bytes).await;
        assert_eq!(reply["reqId"], req_id.as_str());
        reply
    }
}

fn error_code(reply: &Value) -> &str {
    reply["payload"]["error"]["code"].as_str().unwrap_or("")
}

#[tokio::test]
async fn test_register_login_list_boards() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let reply = client
        .call("register", None, json!({"username": "alice", "password": "secret1"}))
        .await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["action"], "register");
    assert_eq!(reply["payload"]["user"]["username"], "alice");

    let reply = client
        .call("login", None, json!({"username": "alice", "password": "secret1"}))
        .await;
    assert_eq!(reply["type"], "response");
    let token = reply["payload"]["token"].as_str().unwrap().to_string();
    assert!(reply["payload"]["expiresAt"].as_i64().unwrap() > 0);

    let reply = client.call("list_boards", Some(&token), json!({})).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["payload"], json!({"boards": []}));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_protected_action_without_token() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let reply = client.call("list_boards", None, json!({})).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(error_code(&reply), "AUTH_INVALID");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_requests_keep_connection_open() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;

    let reply = client.send_raw(b"\xff\xfe not utf8").await;
    assert_eq!(error_code(&reply), "VALIDATION_ERROR");

    let reply = client
        .send_raw(br#"{"type":"request","reqId":"x-1","action":"login"#)
        .await;
    assert_eq!(error_code(&reply), "VALIDATION_ERROR");

    let reply = client.call("teleport", None, json!({})).await;
    assert_eq!(error_code(&reply), "VALIDATION_ERROR");

    let reply = client
        .call("register", None, json!({"username": "alice"}))
        .await;
    assert_eq!(error_code(&reply), "VALIDATION_ERROR");

    // Same connection still serves requests.
    let reply = client
        .call("register", None, json!({"username": "alice", "password": "secret1"}))
        .await;
    assert_eq!(reply["type"], "response");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_logout_revokes_token_across_connections() {
    let server = start_server().await;
    let mut first = Client::connect(&server).await;
    let mut second = Client::connect(&server).await;

    let reply = first
        .call("register", None, json!({"username": "alice", "password": "secret1"}))
        .await;
    let token = reply["payload"]["token"].as_str().unwrap().to_string();

    let reply = second.call("list_boards", Some(&token), json!({})).await;
    assert_eq!(reply["type"], "response");

    let reply = first.call("logout", Some(&token), json!({})).await;
    assert_eq!(reply["payload"]["message"], "logged out");

    let reply = second.call("list_boards", Some(&token), json!({})).await;
    assert_eq!(error_code(&reply), "AUTH_INVALID");

    let reply = first.call("logout", Some(&token), json!({})).await;
    assert_eq!(error_code(&reply), "AUTH_INVALID");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_membership_and_forbidden_access() {
    let server = start_server().await;
    let mut alice = Client::connect(&server).await;
    let mut bob = Client::connect(&server).await;

    let reply = alice
        .call("register", None, json!({"username": "alice", "password": "secret1"}))
        .await;
    let alice_token = reply["payload"]["token"].as_str().unwrap().to_string();
    let reply = bob
        .call("register", None, json!({"username": "bob", "password": "secret2"}))
        .await;
    let bob_token = reply["payload"]["token"].as_str().unwrap().to_string();
    let bob_id = reply["payload"]["user"]["id"].as_str().unwrap().to_string();

    let reply = alice
        .call("create_board", Some(&alice_token), json!({"name": "Groceries"}))
        .await;
    let board_id = reply["payload"]["board"]["id"].as_str().unwrap().to_string();

    let reply = bob
        .call("list_tasks", Some(&bob_token), json!({"boardId": board_id}))
        .await;
    assert_eq!(error_code(&reply), "FORBIDDEN");

    let reply = bob
        .call(
            "add_user_to_board",
            Some(&bob_token),
            json!({"boardId": board_id, "userId": bob_id}),
        )
        .await;
    assert_eq!(error_code(&reply), "FORBIDDEN");

    let reply = alice
        .call(
            "add_user_to_board",
            Some(&alice_token),
            json!({"boardId": board_id, "userId": bob_id}),
        )
        .await;
    assert_eq!(reply["payload"]["message"], "member added");

    let reply = bob.call("list_boards", Some(&bob_token), json!({})).await;
    let boards = reply["payload"]["boards"].as_array().unwrap();
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0]["role"], "MEMBER");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_idle_connections() {
    let server = start_server().await;
    let mut client = Client::connect(&server).await;
    client
        .call("register", None, json!({"username": "alice", "password": "secret1"}))
        .await;

    tokio::time::timeout(Duration::from_secs(10), server.shutdown())
        .await
        .unwrap()
        .unwrap();

    // The server side is gone: the next read sees end of stream.
    let res = read_frame(&mut client.stream).await;
    assert!(res.is_err());
}

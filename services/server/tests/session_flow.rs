use async_trait::async_trait;
use companion_core::llm_client::{GenerationError, Generator};
use companion_server::{
    config::Config,
    protocol::{FrameError, read_frame, write_frame},
    registry::SessionRegistry,
    server::serve,
    state::AppState,
};
use serde_json::{Value, json};
use std::{
    collections::HashSet,
    net::SocketAddr,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::Level;

/// Answers summary prompts with a fixed summary and character prompts with a
/// tagged reply echoing the user input, recording every character prompt.
#[derive(Default)]
struct ScriptedGenerator {
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    fail: bool,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(GenerationError::Backend("model unavailable".into()));
        }
        if prompt.starts_with("Progressively summarize") {
            return Ok("The user and the character are chatting.".into());
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        let input = prompt
            .lines()
            .find_map(|line| line.strip_prefix("User input: "))
            .unwrap_or_default();
        Ok(format!(
            " Considering '{input}'.</thinking>\n<answer>You said: {input}</answer>\n<mood>happy</mood>\n<actions>wave</actions>"
        ))
    }
}

fn test_config(characters: &Path, timeout: Duration) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        model_name: "test-model".into(),
        base_url: "http://localhost:11434".into(),
        api_key: "test".into(),
        characters_path: characters.to_path_buf(),
        default_character: "Clara".into(),
        generation_timeout: timeout,
        memory_window: 5,
        max_parked_sessions: 16,
        tools_enabled: false,
        shutdown_grace: Duration::from_secs(2),
        log_level: Level::DEBUG,
    }
}

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
    generator: Arc<ScriptedGenerator>,
    registry: Arc<SessionRegistry>,
    _characters: TempDir,
}

async fn start_server(generator: ScriptedGenerator, timeout: Duration) -> TestServer {
    let characters = tempfile::tempdir().unwrap();
    std::fs::write(
        characters.path().join("Clara.txt"),
        "a cheerful starship engineer\n\nPersonality Traits:\nCurious\nPlayful\n",
    )
    .unwrap();

    let generator = Arc::new(generator);
    let registry = Arc::new(SessionRegistry::new());
    let state = Arc::new(AppState {
        config: Arc::new(test_config(characters.path(), timeout)),
        registry: registry.clone(),
        generator: generator.clone(),
        tool_hooks: None,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, state, shutdown.clone()));

    TestServer {
        addr,
        shutdown,
        handle,
        generator,
        registry,
        _characters: characters,
    }
}

async fn exchange(stream: &mut TcpStream, request: Value) -> Value {
    write_frame(stream, &serde_json::to_vec(&request).unwrap())
        .await
        .unwrap();
    let payload = read_frame(stream).await.unwrap();
    serde_json::from_slice(&payload).unwrap()
}

/// Returns true once the server has closed the connection.
async fn is_closed(stream: &mut TcpStream) -> bool {
    tokio::time::timeout(Duration::from_secs(2), read_frame(stream))
        .await
        .map(|frame| frame.is_err())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_bootstrap_then_chat() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let identity = exchange(&mut stream, json!({"conversation_id": 0})).await;
    let uid = identity["uid"].as_str().unwrap().to_string();
    assert_eq!(uid.len(), 36);
    assert_eq!(uid.matches('-').count(), 4);
    assert_eq!(identity.as_object().unwrap().len(), 1);

    let reply = exchange(
        &mut stream,
        json!({"input": "hello", "conversation_id": uid, "character_name": "Clara"}),
    )
    .await;
    assert_eq!(reply["answer"], "You said: hello");
    assert_eq!(reply["thinking"], "Considering 'hello'.");
    assert_eq!(reply["mood"], "happy");
    assert_eq!(reply["actions"], "wave");

    let prompts = server.generator.prompts.lock().unwrap().clone();
    assert!(prompts[0].starts_with("You are Clara, a cheerful starship engineer."));
    assert!(prompts[0].contains("Personality: Curious Playful"));
}

#[tokio::test]
async fn test_first_message_with_identity_is_a_chat_turn() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let reply = exchange(
        &mut stream,
        json!({"input": "hi there", "conversation_id": "63de4c03-1216-477a-8765-dc32a618974d"}),
    )
    .await;
    assert_eq!(reply["answer"], "You said: hi there");
    assert!(
        server
            .registry
            .is_issued("63de4c03-1216-477a-8765-dc32a618974d")
            .await
    );

    let reply = exchange(&mut stream, json!({"input": "again"})).await;
    assert_eq!(reply["answer"], "You said: again");

    let prompts = server.generator.prompts.lock().unwrap().clone();
    assert!(prompts[1].contains("Human: hi there"));
}

#[tokio::test]
async fn test_unknown_character_falls_back_to_default_profile() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    exchange(&mut stream, json!({"conversation_id": 0})).await;
    let reply = exchange(
        &mut stream,
        json!({"input": "who are you?", "character_name": "Nobody"}),
    )
    .await;
    assert_eq!(reply["answer"], "You said: who are you?");

    let prompts = server.generator.prompts.lock().unwrap().clone();
    assert!(prompts[0].starts_with("You are Nobody, a cheerful starship engineer."));
}

#[tokio::test]
async fn test_empty_frame_bootstraps_identity() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    write_frame(&mut stream, b"").await.unwrap();
    let identity: Value = serde_json::from_slice(&read_frame(&mut stream).await.unwrap()).unwrap();
    assert_eq!(identity["uid"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_malformed_payload_closes_connection() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    write_frame(&mut stream, b"{not json").await.unwrap();
    assert!(is_closed(&mut stream).await);

    // The server keeps serving other connections.
    let mut other = TcpStream::connect(server.addr).await.unwrap();
    let identity = exchange(&mut other, json!({"conversation_id": 0})).await;
    assert!(identity["uid"].is_string());
}

#[tokio::test]
async fn test_truncated_frame_closes_connection() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream.write_all(&100u32.to_le_bytes()).await.unwrap();
    stream.write_all(b"{\"input\":").await.unwrap();
    stream.shutdown().await.unwrap();
    assert!(is_closed(&mut stream).await);
}

#[tokio::test]
async fn test_empty_chat_input_closes_connection() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    exchange(&mut stream, json!({"conversation_id": 0})).await;
    write_frame(&mut stream, br#"{"input": ""}"#).await.unwrap();
    assert!(is_closed(&mut stream).await);
}

#[tokio::test]
async fn test_generation_failure_closes_only_that_connection() {
    let generator = ScriptedGenerator {
        fail: true,
        ..Default::default()
    };
    let server = start_server(generator, Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    exchange(&mut stream, json!({"conversation_id": 0})).await;
    write_frame(&mut stream, br#"{"input": "hello"}"#).await.unwrap();
    assert!(is_closed(&mut stream).await);

    let mut other = TcpStream::connect(server.addr).await.unwrap();
    let identity = exchange(&mut other, json!({"conversation_id": 0})).await;
    assert!(identity["uid"].is_string());
}

#[tokio::test]
async fn test_generation_deadline_closes_connection() {
    let generator = ScriptedGenerator {
        delay: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let server = start_server(generator, Duration::from_millis(50)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    write_frame(&mut stream, br#"{"input": "hello", "conversation_id": "abc"}"#)
        .await
        .unwrap();
    assert!(is_closed(&mut stream).await);
}

#[tokio::test]
async fn test_concurrent_bootstraps_get_distinct_ids() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let addr = server.addr;
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                let identity = exchange(&mut stream, json!({"conversation_id": 0})).await;
                identity["uid"].as_str().unwrap().to_string()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()));
    }
    assert_eq!(ids.len(), 32);
}

#[tokio::test]
async fn test_reconnect_with_uid_resumes_memory() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;

    let mut first = TcpStream::connect(server.addr).await.unwrap();
    let uid = exchange(&mut first, json!({"conversation_id": 0})).await["uid"]
        .as_str()
        .unwrap()
        .to_string();
    exchange(&mut first, json!({"input": "my name is Sam"})).await;
    drop(first);

    // Give the server time to notice the close and park the memory.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut second = TcpStream::connect(server.addr).await.unwrap();
    let reply = exchange(
        &mut second,
        json!({"input": "do you remember me?", "conversation_id": uid}),
    )
    .await;
    assert_eq!(reply["answer"], "You said: do you remember me?");

    let prompts = server.generator.prompts.lock().unwrap().clone();
    assert!(prompts[1].contains("Human: my name is Sam"));
    assert!(prompts[1].contains("conversation summary): The user and the character are chatting."));
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let server = start_server(ScriptedGenerator::default(), Duration::from_secs(5)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    exchange(&mut stream, json!({"conversation_id": 0})).await;

    server.shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop in time")
        .unwrap();
    assert!(result.is_ok());
    assert!(is_closed(&mut stream).await);
}

#[tokio::test]
async fn test_shutdown_mid_turn_closes_on_a_frame_boundary() {
    let generator = ScriptedGenerator {
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let server = start_server(generator, Duration::from_secs(60)).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    write_frame(&mut stream, br#"{"input": "hello", "conversation_id": "abc"}"#)
        .await
        .unwrap();
    // Let the turn reach the generator before shutting down.
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.shutdown.cancel();

    let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut stream))
        .await
        .expect("connection was not closed");
    assert!(matches!(frame, Err(FrameError::Closed)));

    let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop within the grace period")
        .unwrap();
    assert!(result.is_ok());
}

use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};

/// Serve exactly one HTTP response and hand back the raw request text.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = vec![0_u8; 4096];
        let n = socket.read(&mut buf).await.expect("read request");
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        let response = format!(
            "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write response");
        request
    });
    (format!("http://{addr}"), task)
}

#[tokio::test]
async fn http_lookup_parses_signed_in_session_and_sends_bearer() {
    let body = r#"{"user":{"id":"u1","name":"Ada","email":"ada@example.test"},"session":{"token":"sess-tok"}}"#;
    let (base, server) = serve_once("HTTP/1.1 200 OK", body).await;

    let lookup = HttpSessionLookup::new(&format!("{base}/"), Some("cached-bearer".to_owned())).expect("client");
    let session = timeout(Duration::from_secs(5), lookup.current_session())
        .await
        .expect("lookup timed out")
        .expect("lookup ok")
        .expect("signed in");

    assert_eq!(session.user.id, "u1");
    assert_eq!(session.user.name.as_deref(), Some("Ada"));
    assert_eq!(session.session.and_then(|s| s.token).as_deref(), Some("sess-tok"));

    let request = server.await.expect("server task");
    assert!(request.starts_with("GET /api/auth/get-session "));
    assert!(request.to_ascii_lowercase().contains("authorization: bearer cached-bearer"));
}

#[tokio::test]
async fn http_lookup_treats_null_body_as_signed_out() {
    let (base, server) = serve_once("HTTP/1.1 200 OK", "null").await;
    let lookup = HttpSessionLookup::new(&base, None).expect("client");
    let session = lookup.current_session().await.expect("lookup ok");
    assert!(session.is_none());

    let request = server.await.expect("server task");
    assert!(!request.to_ascii_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn http_lookup_maps_error_status() {
    let (base, _server) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
    let lookup = HttpSessionLookup::new(&base, None).expect("client");
    let err = lookup.current_session().await.expect_err("status error");
    assert!(matches!(err, SessionError::Status(503)));
}

#[tokio::test]
async fn http_lookup_gives_up_on_silent_auth_service() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    // Accept the connection and never answer.
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let lookup = HttpSessionLookup::with_timeout(&format!("http://{addr}"), None, Duration::from_millis(200))
        .expect("client");
    let err = timeout(Duration::from_secs(5), lookup.current_session())
        .await
        .expect("lookup should time out on its own")
        .expect_err("silent server");
    assert!(matches!(&err, SessionError::Http(e) if e.is_timeout()), "unexpected error: {err}");
}

#[tokio::test]
async fn no_session_is_always_anonymous() {
    assert!(NoSession.current_session().await.expect("ok").is_none());
}

#[test]
fn session_user_tolerates_missing_optional_fields() {
    let session: Session = serde_json::from_str(r#"{"user":{"id":"u1"}}"#).expect("parse");
    assert_eq!(session.user.name, None);
    assert_eq!(session.user.email, None);
    assert!(session.session.is_none());
}

#[test]
fn static_cache_ignores_blank_tokens() {
    assert_eq!(StaticTokenCache::new(Some("  ".to_owned())).cached_token(), None);
    assert_eq!(StaticTokenCache::new(None).cached_token(), None);
    assert_eq!(StaticTokenCache::new(Some("tok".to_owned())).cached_token().as_deref(), Some("tok"));
}

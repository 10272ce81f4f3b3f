use super::*;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use netjar_core::{CacheConfig, CacheTtl};

/// Replays canned replies and records every request it sees.
#[derive(Clone, Default)]
struct ScriptedExecutor {
    replies: Arc<Mutex<VecDeque<Result<HttpResponse, NetFailure>>>>,
    seen: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedExecutor {
    fn reply(self, reply: Result<HttpResponse, NetFailure>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    fn ok(self, body: &str) -> Self {
        self.reply(Ok(response(body, &[])))
    }

    fn fail(self, kind: NetErrorKind) -> Self {
        self.reply(Err(NetFailure::new(kind, "scripted failure")))
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> HttpRequest {
        self.seen.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl HttpExecutor for ScriptedExecutor {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, NetFailure> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(NetFailure::new(NetErrorKind::RecvError, "script exhausted")))
    }
}

fn response(body: &str, headers: &[(&str, &str)]) -> HttpResponse {
    HttpResponse {
        status: 200,
        url: "https://example.com/".into(),
        headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        body: Bytes::from(body.to_string()),
        elapsed: Duration::from_millis(5),
    }
}

fn net(retries: u32) -> NetConfig {
    NetConfig { retries, ..NetConfig::unthrottled() }
}

fn cache(dir: &std::path::Path) -> Cache {
    Cache::new(&CacheConfig { dir: dir.to_path_buf(), name: "test".into(), ttl: CacheTtl::Seconds(3600), wipe: 0 })
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn test_retry_succeeds_within_budget() {
    let script = ScriptedExecutor::default()
        .fail(NetErrorKind::CouldntConnect)
        .fail(NetErrorKind::OperationTimedOut)
        .ok("done");
    let mut transport = Transport::with_executor(net(3), Cache::disabled(), script.clone()).unwrap();

    let response = transport.execute(&RequestSpec::get("https://example.com/")).await.unwrap();
    assert_eq!(response.body, Bytes::from("done"));
    assert_eq!(script.calls(), 3);
    assert_eq!(transport.stats().calls(), 3);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let script = ScriptedExecutor::default()
        .fail(NetErrorKind::CouldntConnect)
        .fail(NetErrorKind::HttpNotFound)
        .ok("too late");
    let mut transport = Transport::with_executor(net(2), Cache::disabled(), script.clone()).unwrap();

    let err = transport.execute(&RequestSpec::get("https://example.com/")).await.unwrap_err();
    assert_eq!(err.transport_code(), Some(22));
    assert_eq!(script.calls(), 2);
}

#[tokio::test]
async fn test_non_retryable_fails_fast() {
    let script = ScriptedExecutor::default().fail(NetErrorKind::TooManyRedirects).ok("unused");
    let mut transport = Transport::with_executor(net(5), Cache::disabled(), script.clone()).unwrap();

    let err = transport.execute(&RequestSpec::get("https://example.com/")).await.unwrap_err();
    assert_eq!(err.transport_code(), Some(47));
    assert!(err.to_string().contains("TOO_MANY_REDIRECTS"));
    assert_eq!(script.calls(), 1);
}

#[tokio::test]
async fn test_zero_retries_still_attempts_once() {
    let script = ScriptedExecutor::default().ok("once");
    let mut transport = Transport::with_executor(net(0), Cache::disabled(), script.clone()).unwrap();

    assert!(transport.execute(&RequestSpec::get("https://example.com/")).await.is_ok());
    assert_eq!(script.calls(), 1);
}

#[tokio::test]
async fn test_invalid_url_before_network() {
    let script = ScriptedExecutor::default().ok("unused");
    let mut transport = Transport::with_executor(net(5), Cache::disabled(), script.clone()).unwrap();

    for bad in ["not a url", "ftp://example.com/file", "https://"] {
        let err = transport.execute(&RequestSpec::get(bad)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)), "{bad}: {err}");
    }
    assert_eq!(script.calls(), 0);
}

#[tokio::test]
async fn test_headers_merged_and_body_encoded() {
    let script = ScriptedExecutor::default().ok("ok");
    let config = NetConfig { headers: vec!["Accept: text/html".into(), "X-Env: test".into()], ..net(1) };
    let mut transport = Transport::with_executor(config, Cache::disabled(), script.clone()).unwrap();

    let spec = RequestSpec::post("https://example.com/form", RequestBody::Form(vec![("q".into(), "a b".into())]))
        .header("accept", "application/json");
    transport.execute(&spec).await.unwrap();

    let req = script.request(0);
    assert_eq!(req.method, Method::Post);
    assert_eq!(header(&req, "Accept"), Some("application/json"));
    assert_eq!(header(&req, "X-Env"), Some("test"));
    assert_eq!(header(&req, "Content-Type"), Some("application/x-www-form-urlencoded"));
    assert_eq!(req.body.as_deref(), Some(&b"q=a+b"[..]));
}

#[tokio::test]
async fn test_stats_recorded() {
    let script = ScriptedExecutor::default().ok("12345");
    let mut transport = Transport::with_executor(net(1), Cache::disabled(), script.clone()).unwrap();

    transport.execute(&RequestSpec::get("https://example.com/a?b=c")).await.unwrap();

    let stats = transport.stats();
    assert_eq!(stats.received(), 5);
    assert_eq!(stats.sent(), script.request(0).wire_size());
    assert_eq!(stats.net_time(), Duration::from_millis(5));
    assert_eq!(stats.last_url(), Some("https://example.com/a?b=c"));
    assert!(transport.summary().line.contains("Requests: 1"));
}

#[tokio::test]
async fn test_throttle_records_sleep_without_sleeping() {
    let script = ScriptedExecutor::default().ok("1").ok("2").ok("3");
    let mut transport = Transport::with_executor(net(1), Cache::disabled(), script).unwrap();
    let window = (Duration::from_secs(30), Duration::from_secs(30));

    let started = Instant::now();
    transport.execute(&RequestSpec::get("https://a.example/").wait(window.0, window.1)).await.unwrap();
    transport.execute(&RequestSpec::get("https://b.example/").wait(window.0, window.1)).await.unwrap();
    assert_eq!(transport.stats().sleep_time(), Duration::ZERO);

    transport.execute(&RequestSpec::get("https://a.example/x").wait(window.0, window.1)).await.unwrap();
    assert!(transport.stats().sleep_time() > Duration::from_secs(29));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_get_url_cache_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let script = ScriptedExecutor::default().ok("v1").ok("v2").ok("v3");
    let mut transport = Transport::with_executor(net(1), cache(tmp.path()), script.clone()).unwrap();
    let spec = RequestSpec::get("https://example.com/page");

    assert_eq!(transport.get_url(&spec).await.unwrap(), Bytes::from("v1"));
    assert_eq!(transport.get_url(&spec).await.unwrap(), Bytes::from("v1"));
    assert_eq!(script.calls(), 1);

    assert_eq!(transport.get_url(&spec.clone().refresh()).await.unwrap(), Bytes::from("v2"));
    assert_eq!(transport.get_url(&spec).await.unwrap(), Bytes::from("v2"));

    assert_eq!(transport.get_url(&spec.clone().bypass_cache()).await.unwrap(), Bytes::from("v3"));
    assert_eq!(transport.get_url(&spec).await.unwrap(), Bytes::from("v2"));
    assert_eq!(script.calls(), 3);
}

#[tokio::test]
async fn test_refresh_with_disabled_cache_touches_no_files() {
    let script = ScriptedExecutor::default().ok("fresh");
    let mut transport = Transport::with_executor(net(1), Cache::disabled(), script.clone()).unwrap();
    let url = "https://example.com/netjar-refresh-check";

    let planted = transport.cache().path_for(url);
    std::fs::write(&planted, b"user file").unwrap();
    let body = transport.get_url(&RequestSpec::get(url).refresh()).await;
    let survived = planted.is_file();
    std::fs::remove_file(&planted).unwrap();

    assert_eq!(body.unwrap(), Bytes::from("fresh"));
    assert!(survived);
    assert_eq!(script.calls(), 1);
}

#[tokio::test]
async fn test_get_url_custom_key() {
    let tmp = tempfile::tempdir().unwrap();
    let script = ScriptedExecutor::default().ok("a");
    let mut transport = Transport::with_executor(net(1), cache(tmp.path()), script).unwrap();

    transport.get_url(&RequestSpec::get("https://example.com/?t=1").cache_key("home")).await.unwrap();
    assert!(transport.cache().path_for("home").is_file());
}

#[tokio::test]
async fn test_get_json_defaults() {
    let script = ScriptedExecutor::default().ok(r#"{"ok":true}"#).ok("{}");
    let mut transport = Transport::with_executor(net(1), Cache::disabled(), script.clone()).unwrap();

    let reply = transport.get_json(&RequestSpec::get("https://api.example.com/a")).await.unwrap();
    assert_eq!(reply.data(), Some(&serde_json::json!({"ok": true})));
    assert_eq!(header(&script.request(0), "X-Requested-With"), Some("XMLHttpRequest"));

    let spec = RequestSpec::get("https://api.example.com/b").header("x-requested-with", "fetch");
    transport.get_json(&spec).await.unwrap();
    let req = script.request(1);
    assert_eq!(header(&req, "X-Requested-With"), Some("fetch"));
    assert_eq!(req.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("x-requested-with")).count(), 1);
}

#[tokio::test]
async fn test_get_json_malformed_is_archived() {
    let tmp = tempfile::tempdir().unwrap();
    let script = ScriptedExecutor::default().ok("<html>blocked</html>").ok(r#"[1,2]"#);
    let mut transport = Transport::with_executor(net(1), cache(tmp.path()), script.clone()).unwrap();
    let spec = RequestSpec::get("https://api.example.com/list").quiet();

    let reply = transport.get_json(&spec).await.unwrap();
    let JsonReply::Malformed { url, data, errors } = &reply else {
        panic!("expected malformed reply, got {reply:?}");
    };
    assert_eq!(url, "https://api.example.com/list");
    assert_eq!(data, "<html>blocked</html>");
    assert!(errors.contains_key("json"));

    let cache_dir = transport.cache().dir().to_path_buf();
    let archived: Vec<String> = std::fs::read_dir(&cache_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].contains("-err"));

    // the bad reply no longer blocks the next run
    let reply = transport.get_json(&spec).await.unwrap();
    assert_eq!(reply.data(), Some(&serde_json::json!([1, 2])));
    assert_eq!(script.calls(), 2);
}

#[tokio::test]
async fn test_fetch_cookies() {
    let reply = response(
        "<html></html>",
        &[
            ("set-cookie", "sid=first; path=/"),
            ("content-type", "text/html"),
            ("set-cookie", "sid=second; path=/; HttpOnly"),
            ("set-cookie", "theme=dark"),
        ],
    );
    let script = ScriptedExecutor::default().reply(Ok(reply));
    let mut transport = Transport::with_executor(net(1), Cache::disabled(), script).unwrap();

    let cookies = transport.fetch_cookies(&RequestSpec::get("https://example.com/")).await.unwrap();
    assert_eq!(cookies.len(), 2);
    assert_eq!(cookies["sid"].value, "second");
    assert!(cookies["sid"].is_httponly());
    assert_eq!(cookies["theme"].value, "dark");
}

#[tokio::test]
async fn test_cookie_jar_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let jar_path = tmp.path().join("cookies.txt");
    let script = ScriptedExecutor::default()
        .reply(Ok(response("login", &[("set-cookie", "sid=abc123; path=/; HttpOnly")])))
        .ok("profile")
        .ok("override");
    let config = NetConfig { cookie_file: Some(jar_path.clone()), ..net(1) };
    let mut transport = Transport::with_executor(config, Cache::disabled(), script.clone()).unwrap();

    transport.execute(&RequestSpec::get("https://example.com/login")).await.unwrap();
    assert_eq!(header(&script.request(0), "Cookie"), None);
    assert!(std::fs::read_to_string(&jar_path).unwrap().contains("#HttpOnly_.example.com\tTRUE\t/\tFALSE\t0\tsid\tabc123"));

    transport.execute(&RequestSpec::get("https://example.com/profile")).await.unwrap();
    assert_eq!(header(&script.request(1), "Cookie"), Some("sid=abc123"));

    transport.execute(&RequestSpec::get("https://example.com/x").header("Cookie", "mine=1")).await.unwrap();
    assert_eq!(header(&script.request(2), "Cookie"), Some("mine=1"));

    // a fresh transport picks the jar up from disk
    let script = ScriptedExecutor::default().ok("again");
    let config = NetConfig { cookie_file: Some(jar_path), ..net(1) };
    let mut transport = Transport::with_executor(config, Cache::disabled(), script.clone()).unwrap();
    transport.execute(&RequestSpec::get("https://www.example.com/")).await.unwrap();
    assert_eq!(header(&script.request(0), "Cookie"), Some("sid=abc123"));
}

#[test]
fn test_parse_url() {
    assert!(parse_url(" https://example.com/a ").is_ok());
    assert!(matches!(parse_url("mailto:me@example.com"), Err(Error::InvalidUrl(_))));
}

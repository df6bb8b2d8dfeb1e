use sentiment_monitor::server::{self, SESSION_COOKIE};
use sentiment_monitor::{
    AppMetrics, AppState, ClassifierError, Classify, InteractionController, MetricsRegistry,
    Prediction, SentimentLabel,
};
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::{redirect, Client, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct KeywordClassifier;

impl Classify for KeywordClassifier {
    fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        if text.contains("explode") {
            return Err(ClassifierError::ModelError("inference failed".into()));
        }
        if text.contains("love") {
            Ok(Prediction::new(SentimentLabel::Positive, 0.9998))
        } else {
            Ok(Prediction::new(SentimentLabel::Negative, 0.8123))
        }
    }
}

struct TestServer {
    addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
    client: Client,
    _stop: oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with_session_ttl(Duration::from_secs(1800)).await
    }

    async fn start_with_session_ttl(ttl: Duration) -> Self {
        let registry = Arc::new(MetricsRegistry::new());
        let metrics = AppMetrics::init(&registry).unwrap();
        let controller = InteractionController::new(Arc::new(KeywordClassifier), metrics);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = stopped.await;
            };
            server::serve(listener, AppState::with_session_ttl(controller, ttl), shutdown)
                .await
                .unwrap();
        });

        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .unwrap();

        Self { addr, registry, client, _stop: stop }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Opens a session and returns its cookie pair.
    async fn new_session(&self) -> String {
        let response = self.client.get(self.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn page(&self, cookie: &str) -> String {
        let response = self.client.get(self.url("/")).header(COOKIE, cookie).send().await.unwrap();
        assert!(response.headers().get(SET_COOKIE).is_none());
        response.text().await.unwrap()
    }

    async fn post(&self, cookie: &str, path: &str, form: &[(&str, &str)]) -> StatusCode {
        let response = self
            .client
            .post(self.url(path))
            .header(COOKIE, cookie)
            .form(form)
            .send()
            .await
            .unwrap();
        if response.status() == StatusCode::SEE_OTHER {
            assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
        }
        response.status()
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let body = reqwest::get(server.url("/health")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_first_visit_sets_cookie_and_shows_idle_page() {
    let server = TestServer::start().await;
    let cookie = server.new_session().await;
    assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));

    let page = server.page(&cookie).await;
    assert!(page.contains("Analyze Sentiment"));
    assert!(!page.contains("Predicted Sentiment"));
}

#[tokio::test]
async fn test_analyze_and_feedback_flow() {
    let server = TestServer::start().await;
    let cookie = server.new_session().await;

    let status = server.post(&cookie, "/analyze", &[("text", "I love this!")]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let page = server.page(&cookie).await;
    assert!(page.contains("Predicted Sentiment: POSITIVE 😊"));
    assert!(page.contains("Confidence: 1.00"));
    assert!(page.contains("Was this prediction correct?"));

    let status = server.post(&cookie, "/feedback", &[("choice", "no")]).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let page = server.page(&cookie).await;
    assert!(page.contains("😞 We are sorry"));
    assert!(!page.contains("Was this prediction correct?"));

    // A stale second click is accepted by HTTP but not recorded
    server.post(&cookie, "/feedback", &[("choice", "yes")]).await;
    let page = server.page(&cookie).await;
    assert!(!page.contains("🙂 Yeah!"));

    let text = server.registry.encode().unwrap();
    assert!(text.contains("ml_model_requests_total 1"));
    assert!(text.contains("ml_model_confidence_count{label=\"POSITIVE\"} 1"));
    assert!(text.contains("ml_model_accuracy_feedback_count 1"));
}

#[tokio::test]
async fn test_classifier_error_is_shown_inline() {
    let server = TestServer::start().await;
    let cookie = server.new_session().await;

    server.post(&cookie, "/analyze", &[("text", "this is bad")]).await;
    server.post(&cookie, "/analyze", &[("text", "explode please")]).await;

    let page = server.page(&cookie).await;
    assert!(page.contains("Could not analyze this text"));
    assert!(page.contains("inference failed"));
    // The previous result is still shown
    assert!(page.contains("Predicted Sentiment: NEGATIVE 😡"));
    assert!(page.contains("explode please"));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let server = TestServer::start().await;
    let alice = server.new_session().await;
    let bob = server.new_session().await;
    assert_ne!(alice, bob);

    server.post(&alice, "/analyze", &[("text", "I love this!")]).await;

    assert!(server.page(&alice).await.contains("Predicted Sentiment"));
    assert!(!server.page(&bob).await.contains("Predicted Sentiment"));
}

#[tokio::test]
async fn test_invalid_feedback_choice_is_rejected() {
    let server = TestServer::start().await;
    let cookie = server.new_session().await;
    let status = server.post(&cookie, "/feedback", &[("choice", "maybe")]).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_session_json_reports_tallies() {
    let server = TestServer::start().await;
    let cookie = server.new_session().await;

    server.post(&cookie, "/analyze", &[("text", "I love this!")]).await;
    server.post(&cookie, "/feedback", &[("choice", "yes")]).await;

    let response = server
        .client
        .get(server.url("/api/session"))
        .header(COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["prediction"]["label"], "POSITIVE");
    assert_eq!(body["feedback"], "yes");
    assert_eq!(body["yes_count"], 1);
    assert_eq!(body["no_count"], 0);
    assert_eq!(body["accuracy_history"][0]["correct"], 1);
    assert!(body["last_error"].is_null());
}

#[tokio::test]
async fn test_idle_session_expires() {
    let server = TestServer::start_with_session_ttl(Duration::from_millis(300)).await;
    let cookie = server.new_session().await;
    server.post(&cookie, "/analyze", &[("text", "I love this!")]).await;
    assert!(server.page(&cookie).await.contains("Predicted Sentiment"));

    tokio::time::sleep(Duration::from_millis(600)).await;

    // The stale cookie gets a brand new Idle session
    let response = server.client.get(server.url("/")).header(COOKIE, &cookie).send().await.unwrap();
    let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(!set_cookie.starts_with(&cookie));
    let page = response.text().await.unwrap();
    assert!(!page.contains("Predicted Sentiment"));
}

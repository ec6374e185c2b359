//! HTTP surface for Promptline.
//!
//! One POST route per pipeline shape plus a health check. Request bodies
//! are read as raw bytes and parsed here, so every malformed body gets the
//! same `{"error": ...}` response as any other pre-stream failure.
//!
//! Built on Axum. Response bodies are streamed straight from the pipeline's
//! encoder; a failure mid-stream aborts the chunked body.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::{error, info};

use promptline_config::AppConfig;
use promptline_core::message::ChatRequest;
use promptline_core::provider::GenerationBackend;
use promptline_core::variant::PipelineKind;
use promptline_pipeline::{
    DocumentSource, Framing, Pipeline, PipelineError, ReloadPolicy, ResponseEncoder,
};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub direct: Pipeline,
    pub history: Pipeline,
    pub rag: Pipeline,
    pub framing: Framing,
    pub body_limit_bytes: usize,
}

impl GatewayState {
    pub fn pipeline(&self, kind: PipelineKind) -> &Pipeline {
        match kind {
            PipelineKind::Direct => &self.direct,
            PipelineKind::History => &self.history,
            PipelineKind::Rag => &self.rag,
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the three pipelines described by `config` around one backend.
///
/// Template overrides are bound here, so a template that references an
/// unknown variable stops startup instead of failing requests.
pub async fn build_state(
    config: &AppConfig,
    backend: Arc<dyn GenerationBackend>,
) -> Result<GatewayState, PipelineError> {
    let framing: Framing = config
        .gateway
        .framing
        .parse()
        .map_err(PipelineError::Misconfigured)?;
    let reload: ReloadPolicy = config
        .corpus
        .reload
        .parse()
        .map_err(PipelineError::Misconfigured)?;

    let documents = Arc::new(
        DocumentSource::open(&config.corpus.path, config.corpus.pointer.clone(), reload).await?,
    );

    let build = |kind: PipelineKind| {
        let corpus = kind.uses_corpus().then(|| Arc::clone(&documents));
        pipeline_from_config(config, kind, Arc::clone(&backend), corpus)
    };

    Ok(GatewayState {
        direct: build(PipelineKind::Direct)?,
        history: build(PipelineKind::History)?,
        rag: build(PipelineKind::Rag)?,
        framing,
        body_limit_bytes: config.gateway.body_limit_bytes,
    })
}

/// Build one pipeline from its config section.
pub fn pipeline_from_config(
    config: &AppConfig,
    kind: PipelineKind,
    backend: Arc<dyn GenerationBackend>,
    documents: Option<Arc<DocumentSource>>,
) -> Result<Pipeline, PipelineError> {
    let settings = config.pipelines.get(kind);
    let pipeline = Pipeline::new(kind, backend, settings.generation_config(kind), documents)?;
    let pipeline = match &settings.template {
        Some(source) => pipeline.with_template(source.as_str())?,
        None => pipeline,
    };
    info!(
        pipeline = %kind,
        model = %pipeline.generation().model,
        temperature = pipeline.generation().temperature,
        custom_template = settings.template.is_some(),
        "Pipeline ready"
    );
    Ok(pipeline)
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.body_limit_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(direct_handler))
        .route("/api/chat/history", post(history_handler))
        .route("/api/chat/rag", post(rag_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let backend = promptline_providers::build_from_config(&config);
    let state = Arc::new(build_state(&config, backend).await?);
    let framing = state.framing;
    let app = build_router(state);

    info!(addr = %addr, framing = %framing, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: String,
    framing: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.direct.backend_name().to_string(),
        framing: state.framing.as_str(),
    })
}

async fn direct_handler(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    run_pipeline(&state, PipelineKind::Direct, body).await
}

async fn history_handler(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    run_pipeline(&state, PipelineKind::History, body).await
}

async fn rag_handler(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    run_pipeline(&state, PipelineKind::Rag, body).await
}

async fn run_pipeline(
    state: &GatewayState,
    kind: PipelineKind,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    // Oversized or unreadable bodies keep axum's status but get the JSON shape.
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return error_json(kind, rejection.status(), rejection.body_text()),
    };
    let turns = match ChatRequest::from_slice(&body).and_then(ChatRequest::into_turns) {
        Ok(turns) => turns,
        Err(e) => return error_response(kind, e.into()),
    };

    match state.pipeline(kind).run(&turns, state.framing).await {
        Ok(encoder) => stream_response(encoder),
        Err(e) => error_response(kind, e),
    }
}

fn stream_response(encoder: ResponseEncoder) -> Response {
    let framing = encoder.framing();
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, framing.content_type());
    for (name, value) in framing.headers() {
        builder = builder.header(*name, *value);
    }

    builder
        .body(Body::from_stream(encoder))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build streaming response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

fn error_response(kind: PipelineKind, err: PipelineError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_json(kind, status, err.to_string())
}

fn error_json(kind: PipelineKind, status: StatusCode, message: String) -> Response {
    if status.is_server_error() {
        error!(pipeline = %kind, status = status.as_u16(), error = %message, "Request failed");
    } else {
        info!(pipeline = %kind, status = status.as_u16(), error = %message, "Request rejected");
    }
    (status, Json(ErrorResponse { error: message })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use promptline_core::error::BackendError;
    use promptline_core::provider::{FragmentStream, GenerationConfig};
    use promptline_core::template::RenderedPrompt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Replays fixed fragments, optionally failing at start or after the
    /// last fragment. Records prompts.
    struct StubBackend {
        fragments: Vec<&'static str>,
        reject: Option<BackendError>,
        fail_at_end: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn new(fragments: &[&'static str]) -> Self {
            Self {
                fragments: fragments.to_vec(),
                reject: None,
                fail_at_end: false,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl GenerationBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(
            &self,
            prompt: RenderedPrompt,
            _config: &GenerationConfig,
        ) -> Result<FragmentStream, BackendError> {
            self.prompts.lock().unwrap().push(prompt.into_string());
            if let Some(err) = &self.reject {
                return Err(err.clone());
            }
            let mut items: Vec<Result<String, BackendError>> =
                self.fragments.iter().map(|f| Ok(f.to_string())).collect();
            if self.fail_at_end {
                items.push(Err(BackendError::StreamInterrupted("connection reset".into())));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn test_state(backend: Arc<StubBackend>, framing: Framing) -> SharedState {
        let generation = GenerationConfig::new("gpt-3.5-turbo", 0.8);
        let documents = Arc::new(DocumentSource::from_documents([
            "What is the return window?",
            "30 days.",
        ]));
        Arc::new(GatewayState {
            direct: Pipeline::direct(backend.clone(), generation.clone()).unwrap(),
            history: Pipeline::history(backend.clone(), generation.clone()).unwrap(),
            rag: Pipeline::rag(backend, GenerationConfig::new("gpt-3.5-turbo", 0.0), documents)
                .unwrap(),
            framing,
            body_limit_bytes: 1024 * 1024,
        })
    }

    fn chat_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const CONVERSATION: &str = r#"{"messages": [
        {"role": "user", "content": "hi"},
        {"role": "assistant", "content": "hello"},
        {"role": "user", "content": "how are you"}
    ]}"#;

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(Arc::new(StubBackend::new(&[])), Framing::DataStream));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["backend"], "stub");
    }

    #[tokio::test]
    async fn direct_streams_data_stream_frames() {
        let backend = Arc::new(StubBackend::new(&["Hel", "lo", "!"]));
        let app = build_router(test_state(backend.clone(), Framing::DataStream));

        let response = app
            .oneshot(chat_request("/api/chat", r#"{"messages":[{"role":"user","content":"Hello"}]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()["x-experimental-stream-data"], "true");
        assert_eq!(body_string(response).await, "0:\"Hel\"\n0:\"lo\"\n0:\"!\"\n");
        assert_eq!(backend.last_prompt(), "Hello");
    }

    #[tokio::test]
    async fn text_framing_streams_raw_completion() {
        let backend = Arc::new(StubBackend::new(&["Arr, ", "matey"]));
        let app = build_router(test_state(backend.clone(), Framing::Text));

        let response = app.oneshot(chat_request("/api/chat/history", CONVERSATION)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-experimental-stream-data").is_none());
        assert_eq!(body_string(response).await, "Arr, matey");
        assert!(backend.last_prompt().contains("user: hi\nassistant: hello\n\nuser: how are you"));
    }

    #[tokio::test]
    async fn rag_route_injects_corpus() {
        let backend = Arc::new(StubBackend::new(&["30 days."]));
        let app = build_router(test_state(backend.clone(), Framing::Text));

        let response = app.oneshot(chat_request("/api/chat/rag", CONVERSATION)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "30 days.");
        assert!(backend.last_prompt().contains("Context: What is the return window?\n\n30 days.\n"));
    }

    #[tokio::test]
    async fn empty_messages_is_bad_request_without_backend_call() {
        let backend = Arc::new(StubBackend::new(&["never"]));
        let app = build_router(test_state(backend.clone(), Framing::DataStream));

        let response = app.oneshot(chat_request("/api/chat", r#"{"messages": []}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("at least one message"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let backend = Arc::new(StubBackend::new(&[]));
        let app = build_router(test_state(backend.clone(), Framing::DataStream));

        for body in ["not json", r#"{"messages": [{"role": "robot", "content": "x"}]}"#, "{}"] {
            let response = app.clone().oneshot(chat_request("/api/chat", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert!(json["error"].is_string());
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn backend_rejection_maps_status() {
        let mut stub = StubBackend::new(&[]);
        stub.reject = Some(BackendError::AuthenticationFailed("Invalid API key".into()));
        let app = build_router(test_state(Arc::new(stub), Framing::DataStream));

        let response = app.oneshot(chat_request("/api/chat", CONVERSATION)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "Authentication failed: Invalid API key");
    }

    #[tokio::test]
    async fn mid_stream_failure_aborts_body_after_delivered_frames() {
        let mut stub = StubBackend::new(&["Hel", "lo"]);
        stub.fail_at_end = true;
        let app = build_router(test_state(Arc::new(stub), Framing::DataStream));

        let response = app.oneshot(chat_request("/api/chat", CONVERSATION)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let mut delivered = Vec::new();
        let mut aborted = false;
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => delivered.extend_from_slice(frame.data_ref().unwrap()),
                Err(_) => {
                    aborted = true;
                    break;
                }
            }
        }
        assert!(aborted);
        assert_eq!(delivered, b"0:\"Hel\"\n0:\"lo\"\n");
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let backend = Arc::new(StubBackend::new(&[]));
        let mut state = Arc::into_inner(test_state(backend.clone(), Framing::DataStream)).unwrap();
        state.body_limit_bytes = 64;
        let app = build_router(Arc::new(state));

        let big = format!(r#"{{"messages":[{{"role":"user","content":"{}"}}]}}"#, "x".repeat(256));
        let response = app.oneshot(chat_request("/api/chat", &big)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("length limit exceeded"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn build_state_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("qa.json");
        std::fs::write(&corpus, r#"[{"q": "A", "a": "B"}]"#).unwrap();

        let mut config = AppConfig::default();
        config.corpus.path = corpus;
        config.corpus.reload = "cached".into();
        config.gateway.framing = "text".into();
        config.pipelines.direct.template = Some("Q: {message}".into());

        let backend = Arc::new(StubBackend::new(&[]));
        let state = build_state(&config, backend).await.unwrap();
        assert_eq!(state.framing, Framing::Text);
        assert_eq!(state.rag.generation().temperature, 0.0);
        assert_eq!(state.direct.template().source(), "Q: {message}");
    }

    #[tokio::test]
    async fn build_state_rejects_unreadable_cached_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.corpus.path = dir.path().join("absent.json");
        config.corpus.reload = "cached".into();

        let result = build_state(&config, Arc::new(StubBackend::new(&[]))).await;
        assert!(matches!(result, Err(PipelineError::Corpus(_))));
    }
}

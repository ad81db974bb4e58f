use argh::FromArgs;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use cropscan::{
    BatchOrchestrator, ClassCatalog, ModelSource, PipelineConfig, PredictionPipeline, RawImage,
    onnx::OnnxEngine,
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};

mod messages;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MODEL: &str = "model/mobilenet_mobile.onnx";

struct AppState {
    pipeline: PredictionPipeline<OnnxEngine>,
    /// Canonical directory that scan requests may read from.
    root: PathBuf,
}

type SharedState = Arc<AppState>;

#[derive(FromArgs)]
/// Serve crop disease classification over HTTP.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// path to the ONNX model
    #[argh(option, short = 'm', default = "PathBuf::from(DEFAULT_MODEL)")]
    model: PathBuf,

    /// class catalog, one label per line (defaults to the built-in crop classes)
    #[argh(option, short = 'c')]
    catalog: Option<PathBuf>,

    /// directory the served images live in; requests cannot read outside it
    #[argh(option, short = 'r', default = "PathBuf::from(\".\")")]
    root: PathBuf,

    /// load the model before accepting requests
    #[argh(switch)]
    preload: bool,
}

async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(messages::StatusResponse {
        state: state.pipeline.state().as_str().to_string(),
        loads: state.pipeline.load_count(),
        classes: state.pipeline.catalog().len(),
    })
}

async fn post_scan(
    State(state): State<SharedState>,
    Json(payload): Json<messages::ScanRequest>,
) -> impl IntoResponse {
    let mut images = Vec::with_capacity(payload.image_paths.len());
    for requested in &payload.image_paths {
        let Some(path) = messages::resolve_under(&state.root, requested) else {
            let error = format!("{} is outside the image root", requested.display());
            return (StatusCode::FORBIDDEN, Json(json!({ "error": error })));
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = format!("cannot read {}: {e}", requested.display());
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": error })));
            }
        };
        images.push(match messages::mime_for_path(&path) {
            Some(mime) => RawImage::new(bytes, mime),
            None => RawImage::sniffed(bytes),
        });
    }

    // Model loading and forward passes block; keep them off the async workers.
    let scanned = tokio::task::spawn_blocking(move || {
        let result = BatchOrchestrator::new(&state.pipeline)
            .run_batch(&images)
            .map_err(|e| e.to_string())?;
        serde_json::to_value(result.report()).map_err(|e| e.to_string())
    })
    .await;

    match scanned {
        Ok(Ok(report)) => {
            log::info!("Scanned {} images", payload.image_paths.len());
            (StatusCode::OK, Json(report))
        }
        Ok(Err(e)) => {
            log::error!("Scan aborted: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e })),
            )
        }
        Err(e) => {
            log::error!("Scan task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let catalog = match &args.catalog {
        Some(path) => ClassCatalog::from_file(path)?,
        None => ClassCatalog::crops(),
    };
    let config = PipelineConfig::new(ModelSource::Path(args.model), catalog);
    let state = Arc::new(AppState {
        pipeline: PredictionPipeline::new(OnnxEngine::new(), config),
        root: tokio::fs::canonicalize(&args.root).await?,
    });
    log::info!("Serving images from {}", state.root.display());

    if args.preload {
        let warm = state.clone();
        tokio::task::spawn_blocking(move || warm.pipeline.warm_up()).await??;
    }

    let app = Router::new()
        .route("/", get(|| async { "Welcome to cropscan!" }))
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .with_state(state);

    log::info!("Listening on: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use argh::FromArgs;
use cropscan::{
    BatchOrchestrator, ClassCatalog, ModelSource, PipelineConfig, PredictionPipeline, RawImage,
    onnx::OnnxEngine,
};
use std::path::PathBuf;

mod messages;

// defaults for the scanner
const DEFAULT_MODEL: &str = "model/mobilenet_mobile.onnx";

#[derive(FromArgs)]
/// Classify crop leaf photographs and print a JSON report.
struct ScanArgs {
    /// path to the ONNX model
    #[argh(option, short = 'm', default = "PathBuf::from(DEFAULT_MODEL)")]
    model: PathBuf,

    /// class catalog, one label per line (defaults to the built-in crop classes)
    #[argh(option, short = 'c')]
    catalog: Option<PathBuf>,

    /// images to classify
    #[argh(positional)]
    images: Vec<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ScanArgs = argh::from_env();

    let catalog = match &args.catalog {
        Some(path) => ClassCatalog::from_file(path)?,
        None => ClassCatalog::crops(),
    };

    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let bytes = std::fs::read(path)?;
        images.push(match messages::mime_for_path(path) {
            Some(mime) => RawImage::new(bytes, mime),
            None => RawImage::sniffed(bytes),
        });
    }

    let config = PipelineConfig::new(ModelSource::Path(args.model), catalog);
    let pipeline = PredictionPipeline::new(OnnxEngine::new(), config);

    let result = BatchOrchestrator::new(&pipeline).run_batch_with_progress(&images, |p| {
        log::info!(
            "[{:>3.0}%] {} ({})",
            p.fraction() * 100.0,
            args.images[p.index].display(),
            if p.succeeded { "ok" } else { "failed" }
        );
    })?;

    println!("{}", serde_json::to_string_pretty(&result.report())?);
    Ok(())
}

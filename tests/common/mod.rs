#![allow(dead_code)]

use cropscan::{ClassCatalog, InferenceEngine, ModelSource, PipelineConfig, RawImage, Tensor};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::{
    collections::HashSet,
    fmt,
    io::Cursor,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug)]
pub struct ScriptedError(pub &'static str);

impl fmt::Display for ScriptedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for ScriptedError {}

/// Session handed out by [`ScriptedEngine`]; `generation` is the load number.
#[derive(Debug)]
pub struct ScriptedSession {
    pub generation: usize,
}

/// Engine whose scores are the per-channel means of the tensor.
///
/// Solid red images therefore classify as "Red" with high confidence, and so
/// on. Loads and runs can be scripted to fail by call number (1-based).
#[derive(Default)]
pub struct ScriptedEngine {
    loads: AtomicUsize,
    runs: AtomicUsize,
    failing_loads: Mutex<HashSet<usize>>,
    failing_runs: Mutex<HashSet<usize>>,
    outputs: Option<usize>,
    extra_scores: usize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_load(self, call: usize) -> Self {
        self.failing_loads.lock().unwrap().insert(call);
        self
    }

    pub fn fail_run(self, call: usize) -> Self {
        self.failing_runs.lock().unwrap().insert(call);
        self
    }

    /// Reports this output width from `output_len`.
    pub fn declaring_outputs(mut self, outputs: usize) -> Self {
        self.outputs = Some(outputs);
        self
    }

    /// Appends zero scores so the output no longer matches a 3-class catalog.
    pub fn with_extra_scores(mut self, extra: usize) -> Self {
        self.extra_scores = extra;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for ScriptedEngine {
    type Session = ScriptedSession;
    type Error = ScriptedError;

    fn load(&self, _source: &ModelSource) -> Result<ScriptedSession, ScriptedError> {
        let call = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_loads.lock().unwrap().contains(&call) {
            return Err(ScriptedError("model file unreadable"));
        }
        Ok(ScriptedSession { generation: call })
    }

    fn run(&self, _session: &mut ScriptedSession, tensor: &Tensor) -> Result<Vec<f32>, ScriptedError> {
        let call = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_runs.lock().unwrap().contains(&call) {
            return Err(ScriptedError("execution provider crashed"));
        }
        let mut scores: Vec<f32> = (0..3)
            .map(|c| {
                let plane = tensor.channel(c).unwrap();
                plane.iter().sum::<f32>() / plane.len() as f32
            })
            .collect();
        scores.extend(std::iter::repeat_n(0.0, self.extra_scores));
        Ok(scores)
    }

    fn output_len(&self, _session: &ScriptedSession) -> Option<usize> {
        self.outputs
    }
}

pub fn rgb_catalog() -> ClassCatalog {
    ClassCatalog::new(["Red", "Green", "Blue"]).unwrap()
}

pub fn config() -> PipelineConfig {
    PipelineConfig::new(ModelSource::Bytes(b"scripted".to_vec().into()), rgb_catalog())
}

pub fn solid(color: [u8; 3]) -> RawImage {
    let img = RgbImage::from_pixel(40, 30, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    RawImage::new(buf.into_inner(), "image/png")
}

pub fn red() -> RawImage {
    solid([250, 10, 10])
}

pub fn green() -> RawImage {
    solid([10, 250, 10])
}

pub fn blue() -> RawImage {
    solid([10, 10, 250])
}

pub fn corrupt() -> RawImage {
    RawImage::new(b"\x89PNG not really".to_vec(), "image/png")
}

// THEORY:
// The `batch_pipeline` module is an optional concurrency facade over the
// engine. A single analysis invocation is strictly sequential (every stage
// consumes the previous stage's complete output), so the only parallelism
// the engine offers is across *independent images*: a fixed pool of workers,
// each owning its own `AnalysisPipeline`, fed through a dispatcher channel.
//
// Determinism is preserved by construction: a worker never shares state with
// another worker, and each image's result is identical to what a direct
// `AnalysisPipeline::analyze` call would have produced.

use tokio::sync::{mpsc, oneshot};

use crate::error::{AnalysisError, Result};
use crate::pipeline::{AnalysisConfig, AnalysisPipeline, AnalysisResult};

struct AnalysisTask {
    image_bytes: Vec<u8>,
    reply: oneshot::Sender<Result<AnalysisResult>>,
}

/// A worker pool that analyzes many images concurrently with a shared
/// configuration.
pub struct BatchAnalyzer {
    task_sender: mpsc::UnboundedSender<AnalysisTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl BatchAnalyzer {
    /// Spawns one worker per available CPU.
    pub fn new(config: AnalysisConfig) -> Self {
        Self::with_workers(config, num_cpus::get().max(1))
    }

    pub fn with_workers(config: AnalysisConfig, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<AnalysisTask>();

        // A single dispatcher distributes tasks round-robin to the workers.
        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<AnalysisTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_index = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_index].send(task);
                worker_index = (worker_index + 1) % worker_senders.len();
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for mut worker_receiver in worker_receivers {
            let worker_config = config;
            let worker = tokio::spawn(async move {
                let pipeline = AnalysisPipeline::new(worker_config);
                while let Some(task) = worker_receiver.recv().await {
                    let result = tokio::task::block_in_place(|| pipeline.analyze(&task.image_bytes));
                    let _ = task.reply.send(result);
                }
            });
            workers.push(worker);
        }

        Self { task_sender, workers }
    }

    /// Analyzes one image on the pool.
    pub async fn analyze(&self, image_bytes: Vec<u8>) -> Result<AnalysisResult> {
        let (reply, response) = oneshot::channel();
        self.task_sender
            .send(AnalysisTask { image_bytes, reply })
            .map_err(|_| AnalysisError::WorkerUnavailable)?;
        response.await.map_err(|_| AnalysisError::WorkerUnavailable)?
    }

    /// Analyzes a batch, returning results in submission order.
    pub async fn analyze_many(&self, images: Vec<Vec<u8>>) -> Vec<Result<AnalysisResult>> {
        let pending: Vec<_> = images.into_iter().map(|bytes| self.analyze(bytes)).collect();
        futures::future::join_all(pending).await
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::raster::PngCodec;
    use image::{Rgba, RgbaImage};

    fn png_of(rgba: [u8; 4], side: u32) -> Vec<u8> {
        PngCodec::encode_rgba(&RgbaImage::from_pixel(side, side, Rgba(rgba))).expect("png")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_results_arrive_in_submission_order() {
        let analyzer = BatchAnalyzer::with_workers(AnalysisConfig::default(), 2);
        let green = png_of([0, 255, 0, 255], 16);
        let brown = png_of([110, 60, 40, 255], 16);

        let results = analyzer.analyze_many(vec![green, brown]).await;
        assert_eq!(results.len(), 2);

        let first = results[0].as_ref().expect("green analysis");
        let second = results[1].as_ref().expect("brown analysis");
        assert_eq!(first.combined.matrix.healthy, 256);
        assert!(second.combined.matrix.healthy < 256);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_matches_direct_invocation() {
        let config = AnalysisConfig::default();
        let analyzer = BatchAnalyzer::with_workers(config, 2);
        let bytes = png_of([30, 200, 40, 255], 24);

        let direct = AnalysisPipeline::new(config).analyze(&bytes).expect("direct");
        let pooled = analyzer.analyze(bytes).await.expect("pooled");
        assert_eq!(direct, pooled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn decode_failures_propagate_per_task() {
        let analyzer = BatchAnalyzer::with_workers(AnalysisConfig::default(), 1);
        let result = analyzer.analyze(b"not an image".to_vec()).await;
        assert!(matches!(result, Err(AnalysisError::Decode(_))));
    }
}

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tiling::{
    JsonLinesSink, RunReport, SlideManifest, SourceOutcome, SourceTiles, TileExtractor, TileRecordSink, TilingError,
    save_geojson, tiles_to_geojson,
};
use tokio::{
    sync::Semaphore,
    task::{self, JoinSet},
};
use tracing::{error, info};

/// `<output>/<id>.tiles.jsonl`
pub fn records_path(output_dir: &Path, source: &str) -> PathBuf {
    output_dir.join(format!("{source}.tiles.jsonl"))
}

/// `<output>/<id>.tiles.geojson`
pub fn overlay_path(output_dir: &Path, source: &str) -> PathBuf {
    output_dir.join(format!("{source}.tiles.geojson"))
}

/// Write the records of one source plus a tile overlay at the reference magnification.
pub fn write_source_outputs(output_dir: &Path, tiles: &SourceTiles, reference_magnification: f64) -> tiling::Result<()> {
    let mut sink = JsonLinesSink::create(records_path(output_dir, &tiles.source))?;
    sink.write_source(&tiles.source, &tiles.records)?;

    let overlay = tiles_to_geojson(&tiles.records, reference_magnification)?;
    save_geojson(&overlay, overlay_path(output_dir, &tiles.source))?;
    Ok(())
}

fn failed(source: &str, err: TilingError) -> SourceOutcome {
    SourceOutcome {
        source: source.to_string(),
        result: Err(err),
    }
}

/// Extract one manifest source and write its outputs. Blocking.
///
/// `cancel` is checked before extraction and again before any output is written.
pub fn run_source(
    extractor: &TileExtractor,
    manifest: &SlideManifest,
    source: &str,
    output_dir: &Path,
    cancel: &AtomicBool,
) -> SourceOutcome {
    if cancel.load(Ordering::SeqCst) {
        return failed(source, TilingError::Cancelled);
    }

    let result = extractor.extract_source(source, manifest, manifest).and_then(|tiles| {
        if cancel.load(Ordering::SeqCst) {
            return Err(TilingError::Cancelled);
        }
        write_source_outputs(output_dir, &tiles, extractor.config().reference_magnification)?;
        info!(
            source,
            tiles = tiles.tile_count(),
            records = tiles.records.len(),
            "wrote {}",
            records_path(output_dir, source).display()
        );
        Ok(tiles)
    });

    SourceOutcome {
        source: source.to_string(),
        result,
    }
}

/// Run every manifest source with at most `jobs` sources in flight.
///
/// Queued sources wait for a permit on the async side, so dropping the
/// returned future aborts them; running ones observe `cancel`.
pub async fn run_manifest(
    extractor: Arc<TileExtractor>,
    manifest: Arc<SlideManifest>,
    output_dir: PathBuf,
    jobs: usize,
    cancel: Arc<AtomicBool>,
) -> RunReport {
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    let mut tasks = JoinSet::new();

    for id in manifest.ids() {
        let id = id.to_string();
        let extractor = Arc::clone(&extractor);
        let manifest = Arc::clone(&manifest);
        let output_dir = output_dir.clone();
        let permits = Arc::clone(&permits);
        let cancel = Arc::clone(&cancel);

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return failed(&id, TilingError::Cancelled);
            };
            let source = id.clone();
            let job = task::spawn_blocking(move || run_source(&extractor, &manifest, &source, &output_dir, &cancel));
            match job.await {
                Ok(outcome) => outcome,
                Err(err) => failed(&id, TilingError::TaskFailed(err.to_string())),
            }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => error!("Tiling task failed: {err}"),
        }
    }

    ordered_report(&manifest, outcomes)
}

/// Put outcomes back into manifest order. Sources without an outcome count as failed.
pub fn ordered_report(manifest: &SlideManifest, mut outcomes: Vec<SourceOutcome>) -> RunReport {
    let ids = manifest.ids();
    for id in &ids {
        if !outcomes.iter().any(|o| o.source == *id) {
            outcomes.push(failed(id, TilingError::TaskFailed("no outcome reported".to_string())));
        }
    }
    outcomes.sort_by_key(|o| ids.iter().position(|id| *id == o.source).unwrap_or(ids.len()));
    RunReport { outcomes }
}

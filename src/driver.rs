//! The pipeline driver: enumerate a simulation's snapshot outputs,
//! partition them into contiguous chunks, and fan the chunks over a
//! bounded worker pool.
//!
//! Each worker processes its chunk sequentially; a failure on one snapshot
//! is logged and does not poison the chunk, the pool or the run. Workers
//! share nothing but the job closure; the catalogs are consulted before
//! the pool starts, never inside it.

use cluster_common::ClusterError;
use log::{error, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Splits `items` into `n` contiguous chunks whose sizes differ by at most
/// one: the first `len % n` chunks take the extra element.
pub fn partition<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 || items.is_empty() {
        return Vec::new();
    }
    let n = n.min(items.len());
    let base = items.len() / n;
    let extra = items.len() % n;
    let mut chunks = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        chunks.push(items[start..start + size].to_vec());
        start += size;
    }
    chunks
}

/// Children of `sim_dir` whose name begins with `output_`, sorted by name.
pub fn find_snapshot_outputs(sim_dir: &Path) -> Result<Vec<PathBuf>, ClusterError> {
    let entries = std::fs::read_dir(sim_dir).map_err(|e| {
        ClusterError::SimBackend(format!(
            "cannot read simulation directory {}: {e}",
            sim_dir.display()
        ))
    })?;
    let mut outputs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("output_"))
                .unwrap_or(false)
        })
        .collect();
    if outputs.is_empty() {
        return Err(ClusterError::SimBackend(format!(
            "{} holds no output_* snapshots",
            sim_dir.display()
        )));
    }
    outputs.sort();
    Ok(outputs)
}

/// The per-run timestamp, evaluated once per pipeline invocation so every
/// figure of one run lands in the same directory.
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%m-%d-%Y_%H-%M-%S").to_string()
}

/// Directory one run's figures of `tag` land in:
/// `<figures_root>/<sim_name>/<tag>-(I-<av_z>)/<stamp>/`.
pub fn figure_dir(
    figures_root: &Path,
    sim_name: &str,
    tag: &str,
    av_z: bool,
    stamp: &str,
) -> PathBuf {
    figures_root
        .join(sim_name)
        .join(format!("{tag}-(I-{av_z})"))
        .join(stamp)
}

/// File name of one snapshot's figure.
pub fn figure_name(snap_number: u32) -> String {
    format!("Image_{snap_number:05}.png")
}

/// Outcome counts of one pipeline run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub processed: usize,
    pub failed: usize,
}

/// Fans `job` over every snapshot output of `sim_dir` with `nproc`
/// workers. The job receives one snapshot path and produces one figure;
/// errors are logged per snapshot and counted, never propagated across
/// the chunk.
pub fn run_over_simulation<F>(
    sim_dir: &Path,
    nproc: usize,
    job: F,
) -> Result<RunStats, ClusterError>
where
    F: Fn(&Path) -> Result<(), ClusterError> + Sync,
{
    let outputs = find_snapshot_outputs(sim_dir)?;
    let nproc = nproc.max(1);
    let chunks = partition(&outputs, nproc);
    info!(
        "dispatching {} snapshots over {} workers ({} chunks)",
        outputs.len(),
        nproc,
        chunks.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(chunks.len())
        .build()
        .map_err(|e| ClusterError::PipelinePlot(format!("cannot build worker pool: {e}")))?;

    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    pool.install(|| {
        chunks.par_iter().for_each(|chunk| {
            for path in chunk {
                match job(path) {
                    Ok(()) => {
                        processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        // One bad snapshot must not poison its siblings.
                        error!("snapshot {} failed: {e}", path.display());
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
    });

    let stats = RunStats {
        processed: processed.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    };
    info!(
        "pipeline finished: {} figures, {} failures",
        stats.processed, stats.failed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_five_into_three() {
        let items = vec![
            "output_00001",
            "output_00002",
            "output_00003",
            "output_00004",
            "output_00005",
        ];
        let chunks = partition(&items, 3);
        assert_eq!(
            chunks,
            vec![
                vec!["output_00001", "output_00002"],
                vec!["output_00003", "output_00004"],
                vec!["output_00005"],
            ]
        );
    }

    #[test]
    fn partition_is_balanced_and_order_preserving() {
        for len in 1..40usize {
            let items: Vec<usize> = (0..len).collect();
            for n in 1..10usize {
                let chunks = partition(&items, n);
                let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1, "len {len} n {n}: sizes {sizes:?}");
                let flat: Vec<usize> = chunks.into_iter().flatten().collect();
                assert_eq!(flat, items, "len {len} n {n}");
            }
        }
    }

    #[test]
    fn partition_more_workers_than_items() {
        let chunks = partition(&[1, 2], 5);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn outputs_are_discovered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["output_00003", "output_00001", "notes", "output_00002"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let outputs = find_snapshot_outputs(dir.path()).unwrap();
        let names: Vec<_> = outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["output_00001", "output_00002", "output_00003"]);
    }

    #[test]
    fn empty_simulation_directory_is_a_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_snapshot_outputs(dir.path()),
            Err(ClusterError::SimBackend(_))
        ));
    }

    #[test]
    fn failures_do_not_poison_other_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=6 {
            std::fs::create_dir(dir.path().join(format!("output_{i:05}"))).unwrap();
        }
        let stats = run_over_simulation(dir.path(), 2, |path| {
            let name = path.file_name().unwrap().to_str().unwrap();
            if name.ends_with("3") {
                Err(ClusterError::PipelinePlot("synthetic failure".into()))
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn figure_layout_matches_the_contract() {
        let dir = figure_dir(
            Path::new("/figs"),
            "collision_a",
            "rho",
            true,
            "01-02-2026_10-30-00",
        );
        assert_eq!(
            dir,
            PathBuf::from("/figs/collision_a/rho-(I-true)/01-02-2026_10-30-00")
        );
        assert_eq!(figure_name(42), "Image_00042.png");
    }
}

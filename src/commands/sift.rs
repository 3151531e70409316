//! Sift command - partition a folder of images into unique and similar
//!
//! Embeds every image under the chosen engine, classifies each against
//! the growing corpus, and optionally moves or copies the partitions
//! into `<target>/unique_images` and `<target>/similar_images`. With
//! `--corpus` the kept embeddings persist across runs.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use semsift::{Config, DedupPolicy, IndexStore, SiftReport, SimilarityEngine};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff",
];

/// What to do with partitioned files when a target directory is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransferMode {
    Move,
    Copy,
}

#[derive(Debug, clap::Args)]
pub struct SiftArgs {
    /// Folder containing the images
    pub folder: PathBuf,

    /// Embedding engine to use
    #[arg(long, default_value = "clip-vit-b-32")]
    pub engine: String,

    /// Search subdirectories recursively
    #[arg(long)]
    pub recursive: bool,

    /// Distance below which two images are the same (config default: 0.2)
    #[arg(long)]
    pub same_distance: Option<f32>,

    /// Distance below which two images count as similar (config default: 0.5)
    #[arg(long)]
    pub similar_distance: Option<f32>,

    /// How many similar images a cluster may keep (config default: 10)
    #[arg(long)]
    pub max_similar: Option<usize>,

    /// Images embedded per batch (config default: 32)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Move/copy partitions into this directory after classification
    #[arg(long)]
    pub target_dir: Option<PathBuf>,

    /// Whether partitioned files are moved or copied
    #[arg(long, value_enum, default_value = "move")]
    pub mode: TransferMode,

    /// SQLite snapshot holding the kept corpus across runs
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the sift command
pub fn execute(config: &Config, args: SiftArgs) -> Result<()> {
    let paths = collect_image_paths(&args.folder, args.recursive)?;
    if paths.is_empty() {
        bail!("No images found under {}", args.folder.display());
    }
    info!(count = paths.len(), "collected images");

    let engine = SimilarityEngine::from_config(config)?;

    let mut policy: DedupPolicy = config.dedup.policy();
    if let Some(same) = args.same_distance {
        policy.same_distance = same;
    }
    if let Some(similar) = args.similar_distance {
        policy.similar_distance = similar;
    }
    if let Some(max_similar) = args.max_similar {
        policy.max_similar = max_similar;
    }
    let batch_size = args.batch_size.unwrap_or(config.dedup.batch_size);

    let index = engine.index(&args.engine)?;
    if let Some(corpus) = &args.corpus {
        if corpus.exists() {
            let store = IndexStore::open(corpus)?;
            let loaded = store.load_into(&args.engine, &index)?;
            info!(entries = loaded, "loaded corpus snapshot");
        }
    }

    let classifier = engine.classifier(&args.engine, policy)?;
    let report = classifier.sift_images(engine.producer(), &args.engine, &paths, batch_size)?;

    if let Some(corpus) = &args.corpus {
        let mut store = IndexStore::open(corpus)?;
        store.save(&args.engine, &index)?;
    }

    if let Some(target_dir) = &args.target_dir {
        transfer_partitions(&report, target_dir, args.mode)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

/// Collect image files under a folder, sorted for deterministic order
fn collect_image_paths(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        bail!("{} is not a directory", folder.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();
    for entry in WalkDir::new(folder).max_depth(max_depth) {
        let entry = entry.context("Failed to walk folder")?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Move or copy partitioned files, mirroring the classification
fn transfer_partitions(report: &SiftReport, target_dir: &Path, mode: TransferMode) -> Result<()> {
    let unique_dir = target_dir.join("unique_images");
    let similar_dir = target_dir.join("similar_images");
    std::fs::create_dir_all(&unique_dir)?;
    std::fs::create_dir_all(&similar_dir)?;

    for (ids, dir) in [(&report.kept, &unique_dir), (&report.rejected, &similar_dir)] {
        for id in ids.iter() {
            let source = Path::new(id);
            let file_name = match source.file_name() {
                Some(name) => name,
                None => continue,
            };
            let dest = dir.join(file_name);
            match mode {
                TransferMode::Move => {
                    std::fs::rename(source, &dest)
                        .with_context(|| format!("Failed to move {} to {}", id, dest.display()))?;
                }
                TransferMode::Copy => {
                    std::fs::copy(source, &dest)
                        .with_context(|| format!("Failed to copy {} to {}", id, dest.display()))?;
                }
            }
        }
    }
    Ok(())
}

fn print_summary(report: &SiftReport) {
    println!(
        "\n{} kept, {} rejected, {} unavailable",
        report.kept.len().to_string().green(),
        report.rejected.len().to_string().yellow(),
        report.unavailable.len().to_string().red(),
    );

    for id in &report.rejected {
        println!("  {} {}", "similar".yellow(), id);
    }
    for id in &report.unavailable {
        println!("  {} {}", "skipped".red(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension_filter() {
        assert!(has_image_extension(Path::new("photo.JPG")));
        assert!(has_image_extension(Path::new("photo.webp")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("no_extension")));
    }

    #[test]
    fn test_collect_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "ignore.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let paths = collect_image_paths(dir.path(), false).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_non_recursive_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.png"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/deep.png"), b"x").unwrap();

        assert_eq!(collect_image_paths(dir.path(), false).unwrap().len(), 1);
        assert_eq!(collect_image_paths(dir.path(), true).unwrap().len(), 2);
    }
}

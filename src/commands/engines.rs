//! Engines command - list the embedding engine catalog

use anyhow::Result;
use semsift::Config;

/// List registered engines with fetch status
pub fn execute(config: &Config) -> Result<()> {
    let registry = config.registry()?;
    let models_dir = config.models.models_dir();

    println!("Embedding engines\n");
    println!("{:<20} {:>8} {:>6}  STATUS", "NAME", "MODALITY", "DIMS");
    println!("{}", "─".repeat(50));

    for descriptor in registry.list() {
        let status = if !descriptor.supported {
            "unsupported".to_string()
        } else {
            let model_path = descriptor
                .model_path
                .clone()
                .unwrap_or_else(|| models_dir.join(&descriptor.name).join("model.onnx"));
            if model_path.exists() {
                "✓ fetched".to_string()
            } else {
                format!("not fetched (semsift fetch {})", descriptor.name)
            }
        };

        println!(
            "{:<20} {:>8} {:>6}  {}",
            descriptor.name, descriptor.modality, descriptor.dimension, status
        );
    }

    println!("\nModels: {}", models_dir.display());
    Ok(())
}

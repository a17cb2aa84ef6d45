//! List models command

use anyhow::Result;

use crate::config::BlendrConfig;
use crate::model::{ModelStore, StoredModel};

/// List models in the cache
pub async fn list(config: BlendrConfig, verbose: bool) -> Result<()> {
    let store = ModelStore::new(config.residency.model_dir);

    if !store.root().exists() {
        println!("No model cache found at: {}", store.root().display());
        println!("\nSet BLENDR_MODEL_DIR, pass --model-dir, or use 'blendr pull <repo>'.");
        return Ok(());
    }

    println!("Models in {}:\n", store.root().display());

    let models = store.list()?;
    if models.is_empty() {
        println!("  No models found.");
        println!("\nTo add models:");
        println!("  - Use 'blendr pull llm-blender/PairRM' to download a ranker");
        println!("  - Use 'blendr pull llm-blender/gen_fuser_770m' to download a fuser");
        return Ok(());
    }

    for model in &models {
        if verbose {
            print_model_details(model);
        } else {
            println!("  {} ({})", model.id, kind(model));
        }
    }

    Ok(())
}

fn kind(model: &StoredModel) -> &'static str {
    if model.ranker.is_some() {
        "ranker"
    } else {
        "model"
    }
}

fn print_model_details(model: &StoredModel) {
    println!("  {}", model.id);
    println!("    Path: {}", model.path.display());
    println!("    Kind: {}", kind(model));

    if let Some(ref ranker) = model.ranker {
        println!("    Ranker type: {}", ranker.ranker_type);
        println!("    Model type: {}", ranker.model_type);
        println!("    Backbone: {}", ranker.model_name);
    }

    println!();
}

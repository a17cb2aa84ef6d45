//! Model cache check command

use anyhow::Result;

use crate::config::BlendrConfig;
use crate::model::{ModelConfiguration, ModelStore};

/// Check that a ranker/fuser pair resolves against the cache
pub async fn check(config: BlendrConfig, ranker: Option<String>, fuser: Option<String>) -> Result<()> {
    let default = &config.blend.default_model;
    let models = ModelConfiguration::new(
        ranker.unwrap_or_else(|| default.ranker.clone()),
        fuser.unwrap_or_else(|| default.fuser.clone()),
    );
    let store = ModelStore::new(config.residency.model_dir);

    println!("Models: {}\n", models);
    println!("Cache: {}", store.root().display());

    let resolved = store.resolve(&models)?;

    println!("Ranker: {}", resolved.ranker_path.display());
    println!("  Ranker type: {}", resolved.ranker.ranker_type);
    println!("  Model type: {}", resolved.ranker.model_type);
    println!("  Backbone: {}", resolved.ranker.model_name);
    if !resolved.ranker.extra.is_empty() {
        let mut keys: Vec<&String> = resolved.ranker.extra.keys().collect();
        keys.sort();
        println!(
            "  Other settings: {}",
            keys.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        );
    }
    println!("Fuser: {}", resolved.fuser_path.display());
    println!("\nOK");

    Ok(())
}

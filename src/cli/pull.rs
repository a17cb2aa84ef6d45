//! Pull model from HuggingFace Hub

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use hf_hub::api::sync::Api;

use crate::config::BlendrConfig;

/// Pull a model repository into the cache as `<model_dir>/<repo id>`
pub async fn pull(config: BlendrConfig, repo: String, file: Option<String>) -> Result<()> {
    let target = repo_dir(&config.residency.model_dir, &repo)?;
    std::fs::create_dir_all(&target)?;

    println!("Downloading from: {}", repo);
    println!("Downloading to: {}", target.display());

    // hf-hub's sync API blocks on network IO
    let downloaded =
        tokio::task::spawn_blocking(move || download(&repo, file.as_deref(), &target)).await??;

    println!("\nDownloaded {} file(s)", downloaded);
    Ok(())
}

/// Directory a repo id lands in, refusing ids that leave the cache
fn repo_dir(model_dir: &Path, repo: &str) -> Result<PathBuf> {
    let valid = !repo.is_empty()
        && repo
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if !valid {
        return Err(anyhow!("invalid repository id: {:?}", repo));
    }
    Ok(model_dir.join(repo))
}

fn download(repo: &str, file: Option<&str>, target: &Path) -> Result<usize> {
    let api = Api::new()?;
    let repo_api = api.model(repo.to_string());

    let files: Vec<String> = match file {
        Some(name) => vec![name.to_string()],
        None => repo_api
            .info()?
            .siblings
            .into_iter()
            .map(|s| s.rfilename)
            .filter(|name| !name.starts_with('.'))
            .collect(),
    };

    let mut downloaded = 0;
    for filename in &files {
        match repo_api.get(filename) {
            Ok(cached_path) => {
                let dest = target.join(filename);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&cached_path, &dest)?;
                println!("  Downloaded: {}", filename);
                downloaded += 1;
            }
            Err(e) => {
                eprintln!("  Failed to download {}: {}", filename, e);
            }
        }
    }

    if downloaded == 0 {
        return Err(anyhow!("nothing downloaded from {}", repo));
    }
    Ok(downloaded)
}

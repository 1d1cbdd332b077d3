use docrag_core::config::Config;
use docrag_embed::get_default_embedder;

fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let embedder = get_default_embedder(&settings.embed)?;
    let texts = vec!["რა არის დღგ?".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("id={} B={} dim={}", embedder.embedder_id(), embs.len(), embedder.dim());
    Ok(())
}

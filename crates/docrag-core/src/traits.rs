/// Text → dense vector capability.
///
/// Implementations must return one L2-normalised vector of length `dim()` per
/// input, in input order. `embedder_id` identifies model and dimensionality;
/// vectors from different ids are not comparable.
pub trait Embedder: Send + Sync {
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Single-text embedding, defined through `embed_batch` so both paths agree.
    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

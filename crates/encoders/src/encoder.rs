//! The sentence-encoder seam.

/// Maps sentences to fixed-size embedding vectors.
///
/// Implementations only provide `encode_chunk`; the provided `encode` splits
/// arbitrarily large inputs into backend-sized chunks and concatenates the
/// results in input order, so callers never worry about backend batch limits.
pub trait SentenceEncoder {
    /// Largest batch `encode_chunk` accepts at once.
    fn chunk_size(&self) -> usize {
        64
    }

    /// Embed one chunk of at most `chunk_size()` sentences.
    fn encode_chunk(&self, sentences: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed all sentences, chunked, preserving input order.
    fn encode(&self, sentences: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let chunk_size = self.chunk_size().max(1);
        let mut out = Vec::with_capacity(sentences.len());
        for chunk in sentences.chunks(chunk_size) {
            let embeddings = self.encode_chunk(chunk)?;
            anyhow::ensure!(
                embeddings.len() == chunk.len(),
                "encoder returned {} embeddings for {} sentences",
                embeddings.len(),
                chunk.len()
            );
            out.extend(embeddings);
        }
        Ok(out)
    }
}

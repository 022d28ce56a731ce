use crate::embed::{check_inputs, normalize, Embedder, Embedding};
use crate::{Error, Result};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashing embedder that needs no model download.
///
/// Each lowercase alphanumeric word contributes itself and the character
/// trigrams of the word padded with spaces; features are hashed with FNV-1a
/// into `dimension` buckets and the counts are L2-normalized. Texts that share
/// words or word fragments score higher, which is enough for offline use and
/// for tests, but it carries no semantics beyond surface form.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidInput(
                "hashing embedder dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn embed_text(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.bump(&mut vector, b"w:", word);

            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.bump(&mut vector, b"g:", &gram);
            }
        }

        // punctuation-only input has no features
        normalize(&mut vector)?;
        Ok(vector)
    }

    fn bump(&self, vector: &mut [f32], kind: &[u8], feature: &str) {
        let hash = fnv1a(kind.iter().chain(feature.as_bytes()));
        vector[(hash % self.dimension as u64) as usize] += 1.0;
    }
}

impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-trigram"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        check_inputs(texts)?;
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

fn fnv1a<'a>(bytes: impl Iterator<Item = &'a u8>) -> u64 {
    bytes.fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

//! Deterministic local backend: signed feature hashing of lowercase word tokens,
//! L2-normalized. Used for offline runs and tests; texts sharing words land
//! close together, which is all the ranking needs to be exercised end to end.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

use super::EmbeddingBackend;

#[derive(Debug, Clone)]
pub struct HashingBackend {
    dimension: usize,
}

impl HashingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// All-zero when the text has no word tokens.
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        static RE_WORD: OnceCell<Regex> = OnceCell::new();
        let re = RE_WORD.get_or_init(|| Regex::new(r"(?u)\w+").expect("word regex"));

        let mut v = vec![0.0f32; self.dimension];
        for m in re.find_iter(text) {
            let h = fnv1a(m.as_str().to_lowercase().as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

#[async_trait]
impl EmbeddingBackend for HashingBackend {
    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

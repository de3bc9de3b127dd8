//! Batch embedding keeps output rows aligned with input texts.
//!
//! Needs the local model, so the tests are ignored by default:
//! `cargo test --test embedding_order -- --ignored`

use std::sync::OnceLock;

use proptest::prelude::*;
use pulse::embedding::{EmbeddingConfig, EmbeddingService, LocalEmbeddingService};
use pulse::utils::math::cosine_similarity;

const SAMPLES: &[&str] = &[
    "Question: Overall experience? Answer: Loved the atmosphere",
    "Question: Overall experience? Answer: Too crowded at the start",
    "Question: What could improve? Answer: More water stations",
    "Question: What could improve? Answer: Clearer signage near the finish",
    "Question: Would you return? Answer: Yes",
    "Question: Would you return? Answer: Probably not, the course was too hilly",
    "Question: Staff? Answer: Volunteers were friendly and quick",
    "Question: Food? Answer: Bananas ran out early",
];

fn service() -> &'static LocalEmbeddingService {
    static SERVICE: OnceLock<LocalEmbeddingService> = OnceLock::new();
    SERVICE.get_or_init(|| {
        // Small forward passes so a single call spans several chunks
        let config = EmbeddingConfig {
            max_batch_size: 3,
            ..EmbeddingConfig::default()
        };
        LocalEmbeddingService::new(config).expect("Failed to build embedding service")
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    #[ignore = "downloads the embedding model from Hugging Face"]
    fn prop_batch_rows_match_single_embeddings(
        picks in proptest::collection::vec(0..SAMPLES.len(), 1..12)
    ) {
        let service = service();
        prop_assume!(service.is_available());

        let texts: Vec<String> = picks.iter().map(|&i| SAMPLES[i].to_string()).collect();
        let rt = runtime();
        let batch = rt.block_on(service.embed(&texts)).unwrap();

        prop_assert_eq!(batch.len(), texts.len());
        for (text, row) in texts.iter().zip(&batch) {
            let single = rt.block_on(service.embed_one(text)).unwrap();
            prop_assert_eq!(single.len(), row.len());
            prop_assert!(cosine_similarity(&single, row) > 0.999);
        }
    }
}

use std::sync::Arc;

use crate::semantic::SearchError;

use crate::corpus::CorpusStore;
use crate::semantic::SearchEngine;

use super::fixtures::{
    engine_with, sample_embedder, sample_engine, write_corpus_files, FakeEmbedder, FAKE_MODEL,
};

fn ids(results: &[crate::semantic::RankedResult]) -> Vec<i64> {
    results.iter().map(|r| r.quote.id).collect()
}

#[test]
fn test_search_returns_top_k_by_similarity() {
    let engine = sample_engine();

    let results = engine.search("letting go", 3, 0.0).unwrap();

    assert_eq!(ids(&results), vec![10, 11, 13]);
    let scores: Vec<f64> = results.iter().map(|r| r.similarity).collect();
    assert_eq!(scores, vec![1.0, 0.8, 0.6]);
}

#[test]
fn test_search_default_arguments() {
    let engine = sample_engine();

    let results = engine
        .search("letting go", crate::semantic::DEFAULT_TOP_K, crate::semantic::DEFAULT_THRESHOLD)
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[test]
fn test_results_are_sorted_descending() {
    let engine = sample_engine();

    for query in ["letting go", "silence"] {
        let results = engine.search(query, 5, -1.0).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }
}

#[test]
fn test_ties_put_later_corpus_entries_first() {
    let engine = sample_engine();

    // "silence" scores 0 against ids 10, 13 and 14
    let results = engine.search("silence", 5, -1.0).unwrap();
    assert_eq!(ids(&results), vec![12, 11, 14, 13, 10]);
}

#[test]
fn test_top_k_larger_than_corpus_is_clamped() {
    let engine = sample_engine();

    let results = engine.search("letting go", 50, -1.0).unwrap();
    assert_eq!(results.len(), 5);
}

#[test]
fn test_len_and_threshold_bounds_hold() {
    let engine = sample_engine();

    for top_k in 1..=7 {
        for threshold in [-1.0, -0.5, 0.0, 0.5, 0.7, 0.9, 1.0] {
            let results = engine.search("letting go", top_k, threshold).unwrap();
            assert!(results.len() <= top_k.min(5));
            assert!(results.iter().all(|r| r.similarity >= f64::from(threshold)));
        }
    }
}

#[test]
fn test_threshold_applies_after_ranking() {
    let engine = sample_engine();

    // top 2 are ids 10 (1.0) and 11 (0.8); id 13 (0.6) also passes 0.5 but
    // falls outside the initial selection
    let results = engine.search("letting go", 2, 0.5).unwrap();
    assert_eq!(ids(&results), vec![10, 11]);

    let results = engine.search("letting go", 2, 0.9).unwrap();
    assert_eq!(ids(&results), vec![10]);
}

#[test]
fn test_threshold_above_all_candidates_yields_empty() {
    let engine = sample_engine();

    let results = engine.search("silence", 3, 1.5).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_threshold_on_selection_matches_threshold_on_corpus() {
    let engine = sample_engine();

    // dropping low rows from the top k leaves the same set as ranking only
    // the rows over the threshold
    for top_k in 1..=5 {
        for threshold in [-0.5, 0.0, 0.5, 0.7, 0.9] {
            let results = engine.search("letting go", top_k, threshold).unwrap();
            let all = engine.search("letting go", 5, -1.0).unwrap();
            let expected: Vec<i64> = all
                .iter()
                .filter(|r| r.similarity >= f64::from(threshold))
                .take(top_k)
                .map(|r| r.quote.id)
                .collect();
            assert_eq!(ids(&results), expected);
        }
    }
}

#[test]
fn test_text_is_cleaned_but_metadata_kept() {
    let engine = sample_engine();

    let results = engine.search("letting go", 2, 0.0).unwrap();
    let cleaned = &results[1];

    assert_eq!(cleaned.quote.id, 11);
    assert_eq!(cleaned.quote.text, "I am small for all of it.");
    assert_eq!(cleaned.quote.author, "Unknown");
    assert_eq!(cleaned.quote.source, None);

    // the store itself is untouched
    assert_eq!(engine.corpus().get(1).text, "| am smal| for alI of it.");
}

#[test]
fn test_similarity_is_rounded() {
    let embedder = Arc::new(FakeEmbedder::new(&[("tilted", vec![1.0, 0.3, 0.1])]));
    let engine = engine_with(embedder);

    let results = engine.search("tilted", 5, -1.0).unwrap();
    for r in &results {
        let scaled = r.similarity * 1000.0;
        assert!((scaled - scaled.round()).abs() < 1e-3, "{} not rounded", r.similarity);
        assert!((-1.0..=1.0).contains(&r.similarity));
    }
}

#[test]
fn test_zero_query_vector_scores_zero() {
    let engine = sample_engine();

    let results = engine.search("void", 5, -1.0).unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.similarity == 0.0));
    // all tied, so reverse corpus order
    assert_eq!(ids(&results), vec![14, 13, 12, 11, 10]);
}

#[test]
fn test_search_is_deterministic() {
    let engine = sample_engine();

    let first = engine.search("silence", 4, 0.0).unwrap();
    let second = engine.search("silence", 4, 0.0).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_blank_query_is_rejected_before_embedding() {
    let embedder = Arc::new(sample_embedder());
    let engine = engine_with(embedder.clone());

    for query in ["", "   ", "\t\n"] {
        let result = engine.search(query, 3, 0.0);
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    }
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn test_zero_top_k_is_rejected_before_embedding() {
    let embedder = Arc::new(sample_embedder());
    let engine = engine_with(embedder.clone());

    assert!(matches!(
        engine.search("letting go", 0, 0.0),
        Err(SearchError::InvalidQuery(_))
    ));
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn test_query_is_embedded_untrimmed() {
    let embedder = Arc::new(sample_embedder());
    let engine = engine_with(embedder.clone());

    let results = engine.search("  letting go  ", 1, 0.0).unwrap();
    assert_eq!(ids(&results), vec![10]);
    assert_eq!(embedder.calls(), 1);
}

#[test]
fn test_embedding_failure_propagates() {
    let engine = engine_with(Arc::new(FakeEmbedder::failing()));

    assert!(matches!(
        engine.search("anything", 3, 0.0),
        Err(SearchError::Embedding(_))
    ));
}

#[test]
fn test_dimension_mismatch_is_an_error() {
    let engine = sample_engine();

    assert!(matches!(
        engine.search("wrong size", 3, 0.0),
        Err(SearchError::Index(_))
    ));
}

#[test]
fn test_model_name_comes_from_embedder() {
    assert_eq!(sample_engine().model_name(), FAKE_MODEL);
}

#[test]
fn test_empty_archive_returns_no_results() {
    let dir = tempfile::tempdir().unwrap();
    let (quotes_path, embeddings_path) = write_corpus_files(dir.path(), &[], &[]);

    let corpus = CorpusStore::load(&quotes_path, &embeddings_path).unwrap();
    assert_eq!(corpus.size(), 0);

    let embedder = Arc::new(sample_embedder());
    let engine = SearchEngine::new(Arc::new(corpus), embedder.clone());

    let results = engine.search("letting go", 3, 0.0).unwrap();
    assert!(results.is_empty());
    assert_eq!(embedder.calls(), 0);

    // validation still runs first
    assert!(matches!(
        engine.search("  ", 3, 0.0),
        Err(SearchError::InvalidQuery(_))
    ));
}

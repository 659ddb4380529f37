// src/tools/hybrid.rs
// Algorithms that don't fit the plain CRUD shape: the hybrid food
// recommendation (structured pre-filter -> embed -> cosine rerank),
// symmetric duplicate-name scoring, and recurring-task date advancement.
// Grounded on the teacher's two-stage retrieval pattern in
// `memory/storage/qdrant/multi_store.rs::search_all` (structured filter,
// then vector rerank) generalized from the teacher's fixed 3-head search
// to the spec's single-collection, structured-then-vector pipeline.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde_json::{json, Value};

use super::store::FoodEntry;
use super::vector::cosine_similarity;
use super::ToolContext;
use crate::error::CoreError;

/// Symmetric name-similarity score used by duplicate detection (spec
/// §4.5: "exact match after casefolding scores 1.0, substring containment
/// scores 0.8, anything else scores 0.0 -- no fuzzy edit-distance
/// scoring"). Symmetric: `score(a, b) == score(b, a)`.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        1.0
    } else if a.contains(&b) || b.contains(&a) {
        0.8
    } else {
        0.0
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DuplicatePair {
    pub a: String,
    pub b: String,
    pub score: f32,
}

/// All pairs scoring above the duplicate threshold (spec §4.5: candidates
/// at 0.8 or above are surfaced for confirmation, not auto-merged).
pub fn find_duplicate_pairs(entries: &[FoodEntry]) -> Vec<DuplicatePair> {
    const THRESHOLD: f32 = 0.8;
    let mut pairs = Vec::new();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let score = name_similarity(&entries[i].name, &entries[j].name);
            if score >= THRESHOLD {
                pairs.push(DuplicatePair {
                    a: entries[i].id.clone(),
                    b: entries[j].id.clone(),
                    score,
                });
            }
        }
    }
    pairs
}

/// Hybrid food recommendation (spec §4.5): structured pre-filter on
/// rating in {liked, favorite}, not merged, not eaten within the recency
/// threshold, capped at the configured candidate pool (K1); then embed
/// the caller's preference text and cosine-rerank the candidates via the
/// vector store, returning the top K2.
pub async fn recommend_food(
    ctx: &ToolContext,
    user_id: &str,
    workspace: &str,
    preference_text: &str,
) -> Result<Value, CoreError> {
    let k1 = ctx.config.tools.hybrid_candidate_pool as i64;
    let recency = Duration::days(ctx.config.tools.food_recency_threshold_days);

    let candidates = ctx
        .structured
        .food_recommendation_candidates(user_id, workspace, recency, k1)
        .await?;

    if candidates.is_empty() {
        return Ok(json!({
            "recommendations": Vec::<Value>::new(),
            "reason": "no candidates matched the structured filter",
        }));
    }

    let query_embedding = ctx.llm.embed(preference_text).await?;
    let k2 = ctx.config.tools.default_page_size.min(10) as usize;

    // Fetch exactly the K1 structured candidates' vectors and rerank
    // locally, rather than running a global ANN search and filtering its
    // results down -- a candidate can legitimately hold a vector that
    // isn't in the collection's global top-K1 nearest neighbors (spec
    // §4.5: "Retrieve vectors for the K1 candidates ... Cosine-rank and
    // return the top K2").
    let candidate_ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
    let embedded = ctx.vectors.get_by_ids("food", &candidate_ids).await?;

    let mut scored: Vec<(String, f32)> = embedded
        .iter()
        .map(|record| (record.id.clone(), cosine_similarity(&query_embedding, &record.embedding)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut recommendations: Vec<Value> = scored
        .into_iter()
        .map(|(id, score)| json!({"id": id, "score": score}))
        .collect();

    // Candidates with no stored embedding yet (e.g. created before
    // embeddings were wired up, or a compensating delete raced with this
    // read) are appended in structured order. This is also what makes
    // "If K1 < K2, return all candidates" (spec §4.5) hold even when some
    // candidates aren't embedded, instead of silently dropping them.
    let embedded_ids: std::collections::HashSet<&str> = embedded.iter().map(|r| r.id.as_str()).collect();
    for candidate in &candidates {
        if !embedded_ids.contains(candidate.id.as_str()) {
            recommendations.push(json!({"id": candidate.id, "score": Value::Null}));
        }
    }

    recommendations.truncate(k2);

    Ok(json!({"recommendations": recommendations}))
}

/// Next occurrence date for a recurring task given its rule (spec §4.5:
/// "recurrence_rule declares an interval in days, weeks, or months").
/// Returns `None` for an unrecognized or missing rule, which halts
/// further expansion for that parent rather than guessing.
pub fn next_occurrence(current: DateTime<Utc>, rule: Option<&Value>) -> Option<DateTime<Utc>> {
    let rule = rule?;
    let unit = rule.get("unit")?.as_str()?;
    let interval = rule.get("interval")?.as_i64()?;
    if interval <= 0 {
        return None;
    }

    match unit {
        "days" => Some(current + Duration::days(interval)),
        "weeks" => Some(current + Duration::weeks(interval)),
        "months" => {
            let naive = current.naive_utc();
            let mut year = naive.year();
            let mut month = naive.month() as i64 + interval;
            year += ((month - 1) / 12) as i32;
            month = ((month - 1).rem_euclid(12)) + 1;
            chrono::NaiveDate::from_ymd_opt(year, month as u32, naive.day())
                .map(|date| DateTime::from_naive_utc_and_offset(date.and_time(naive.time()), Utc))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_similarity_is_symmetric() {
        assert_eq!(name_similarity("Pizza", "pizza"), name_similarity("pizza", "Pizza"));
        assert_eq!(name_similarity("sashimi", "salmon sashimi"), name_similarity("salmon sashimi", "sashimi"));
    }

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(name_similarity("  Ramen  ", "ramen"), 1.0);
    }

    #[test]
    fn unrelated_names_score_zero() {
        assert_eq!(name_similarity("ramen", "salad"), 0.0);
    }

    #[test]
    fn next_occurrence_advances_by_days() {
        let now = Utc::now();
        let rule = json!({"unit": "days", "interval": 7});
        let next = next_occurrence(now, Some(&rule)).unwrap();
        assert_eq!((next - now).num_days(), 7);
    }

    #[test]
    fn next_occurrence_rejects_unknown_unit() {
        let now = Utc::now();
        let rule = json!({"unit": "fortnights", "interval": 1});
        assert!(next_occurrence(now, Some(&rule)).is_none());
    }

    #[tokio::test]
    async fn recommend_food_reranks_only_among_structured_candidates() {
        use super::super::store::FoodPreference;
        use super::super::vector::InMemoryVectorStore;
        use super::super::SqliteStructuredStore;
        use crate::config::CoreConfig;
        use crate::llm::fake::ScriptedLlmAdapter;
        use crate::llm::LlmAdapter;
        use sqlx::SqlitePool;
        use std::sync::Arc;

        let config = Arc::new(CoreConfig::default());
        let dims = config.tools.vector_dimensions["food"];

        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let structured = SqliteStructuredStore::new(pool);
        structured.ensure_schema().await.unwrap();

        let old_enough = Utc::now() - Duration::days(30);
        let candidate = structured
            .create_food_entry(
                "default-user",
                "default",
                "ramen",
                Some("home"),
                FoodPreference::Favorite,
                old_enough,
            )
            .await
            .unwrap();

        let vectors = InMemoryVectorStore::shared(config.tools.vector_dimensions.clone());

        let mut candidate_vector = vec![0.0; dims];
        candidate_vector[0] = 1.0;
        candidate_vector[1] = 0.1;
        vectors
            .upsert("food", &candidate.id, candidate_vector, Default::default())
            .await
            .unwrap();

        // Noise points under ids that are *not* in the structured candidate
        // set, planted closer to the query than the real candidate. A
        // blind global top-K `search` would rank these ahead of the real
        // candidate (or crowd it out of the top K1 entirely); id-scoped
        // retrieval must never see them at all.
        for i in 0..5 {
            let mut noise = vec![0.0; dims];
            noise[0] = 1.0;
            vectors
                .upsert("food", &format!("noise-{i}"), noise, Default::default())
                .await
                .unwrap();
        }

        let mut query = vec![0.0; dims];
        query[0] = 1.0;
        let llm: Arc<dyn LlmAdapter> = Arc::new(ScriptedLlmAdapter::new(Vec::new()).with_embeddings(vec![query]));

        let ctx = ToolContext {
            structured: Arc::new(structured),
            vectors,
            llm,
            config,
        };

        let result = recommend_food(&ctx, "default-user", "default", "something warm and savory")
            .await
            .unwrap();
        let recommendations = result["recommendations"].as_array().unwrap();

        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0]["id"], json!(candidate.id));
    }
}

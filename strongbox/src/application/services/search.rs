// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Search and Ranking
//!
//! Plaintext-in-memory search over decrypted titles and record fields.
//!
//! The plain search is a case-insensitive, NFC-normalized substring match on
//! titles. The ranked variant scores each field by match quality (exact >
//! prefix > substring > Levenshtein similarity above a threshold) and
//! combines fields with fixed weights: title 0.5, username 0.25, url 0.15,
//! category 0.10. Rankings are fully deterministic: ties break by
//! `modified` descending, then id ascending.

use strsim::normalized_levenshtein;
use unicode_normalization::UnicodeNormalization;

use strongbox_domain::value_objects::RecordId;

/// Field weights for the combined score.
const WEIGHT_TITLE: f64 = 0.5;
const WEIGHT_USERNAME: f64 = 0.25;
const WEIGHT_URL: f64 = 0.15;
const WEIGHT_CATEGORY: f64 = 0.10;

/// Minimum normalized Levenshtein similarity that still counts as a match.
const SIMILARITY_THRESHOLD: f64 = 0.6;

/// The searchable projection of one record.
#[derive(Debug, Clone)]
pub struct SearchableRecord {
    pub id: RecordId,
    pub title: String,
    pub username: Option<String>,
    pub url: Option<String>,
    pub category: Option<String>,
    pub modified: u64,
}

/// One ranked search result.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub id: RecordId,
    pub title: String,
    pub score: f64,
    pub modified: u64,
}

/// NFC-normalizes and lowercases for comparison.
pub fn normalize(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

/// Case-insensitive, NFC-normalized substring containment.
pub fn title_contains(title: &str, query: &str) -> bool {
    normalize(title).contains(&normalize(query))
}

/// Match quality of one field against the normalized query.
fn field_score(field: &str, query_normalized: &str) -> f64 {
    let field_normalized = normalize(field);
    if field_normalized == query_normalized {
        return 1.0;
    }
    if field_normalized.starts_with(query_normalized) {
        return 0.85;
    }
    if field_normalized.contains(query_normalized) {
        return 0.7;
    }
    let similarity = normalized_levenshtein(&field_normalized, query_normalized);
    if similarity >= SIMILARITY_THRESHOLD {
        similarity * 0.6
    } else {
        0.0
    }
}

/// Ranks records against a query.
///
/// Records with a zero combined score are dropped. The output ordering is
/// deterministic for identical inputs.
pub fn rank(candidates: &[SearchableRecord], query: &str) -> Vec<RankedHit> {
    let query_normalized = normalize(query);
    if query_normalized.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<RankedHit> = candidates
        .iter()
        .filter_map(|record| {
            let mut score = WEIGHT_TITLE * field_score(&record.title, &query_normalized);
            if let Some(username) = &record.username {
                score += WEIGHT_USERNAME * field_score(username, &query_normalized);
            }
            if let Some(url) = &record.url {
                score += WEIGHT_URL * field_score(url, &query_normalized);
            }
            if let Some(category) = &record.category {
                score += WEIGHT_CATEGORY * field_score(category, &query_normalized);
            }
            if score > 0.0 {
                Some(RankedHit {
                    id: record.id,
                    title: record.title.clone(),
                    score,
                    modified: record.modified,
                })
            } else {
                None
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.modified.cmp(&a.modified))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}

//! Fuzzy-ranking collaborator for template search.

/// Search-ready projection of one template: plaintext body and resolved
/// tag titles instead of ids.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
  pub title: String,
  pub shortcut: String,
  pub body: String,
  pub tags: Vec<String>,
}

/// One ranked hit, best first. `index` points into the candidate slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
  pub index: usize,
  pub score: f64,
}

/// Ranks candidates against a query. This is an external collaborator
/// boundary; the projection only delegates.
pub trait Ranker: Send + Sync {
  fn rank(&self, query: &str, candidates: &[SearchCandidate]) -> Vec<SearchHit>;
}

/// Default ranker: fuzzy match weighing title and shortcut above body and
/// tags.
pub struct FuzzyRanker {
  /// Hits scoring below this are dropped (0-100 scale).
  min_score: f64,
}

impl FuzzyRanker {
  pub fn new() -> Self {
    Self { min_score: 40.0 }
  }
}

impl Default for FuzzyRanker {
  fn default() -> Self {
    Self::new()
  }
}

impl Ranker for FuzzyRanker {
  fn rank(&self, query: &str, candidates: &[SearchCandidate]) -> Vec<SearchHit> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
      // Nothing to rank against; present everything unordered.
      return candidates
        .iter()
        .enumerate()
        .map(|(index, _)| SearchHit { index, score: 0.0 })
        .collect();
    }

    let mut hits: Vec<SearchHit> = candidates
      .iter()
      .enumerate()
      .filter_map(|(index, candidate)| {
        let score = score_candidate(&query, candidate);
        (score >= self.min_score).then_some(SearchHit { index, score })
      })
      .collect();

    hits.sort_by(|a, b| {
      b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
  }
}

fn score_candidate(query: &str, candidate: &SearchCandidate) -> f64 {
  let title = rapidfuzz::fuzz::partial_ratio(query.chars(), candidate.title.to_lowercase().chars());
  let shortcut =
    rapidfuzz::fuzz::ratio(query.chars(), candidate.shortcut.to_lowercase().chars());
  let body = rapidfuzz::fuzz::partial_ratio(query.chars(), candidate.body.to_lowercase().chars());
  let tags = candidate
    .tags
    .iter()
    .map(|tag| rapidfuzz::fuzz::ratio(query.chars(), tag.to_lowercase().chars()))
    .fold(0.0, f64::max);

  title.max(shortcut).max(body * 0.6).max(tags * 0.8)
}

use std::collections::HashMap;

/// Term -> normalized frequency (count / total terms).
pub type TermFrequency = HashMap<String, f64>;

/// Compute normalized term frequencies. An empty term list yields an empty map.
pub fn term_frequency<S: AsRef<str>>(terms: &[S]) -> TermFrequency {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for term in terms {
        *counts.entry(term.as_ref().to_owned()).or_insert(0) += 1;
    }
    let total = terms.len() as f64;
    counts
        .into_iter()
        .map(|(term, count)| (term, count as f64 / total))
        .collect()
}

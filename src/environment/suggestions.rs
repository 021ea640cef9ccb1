//! Fuzzy "did you mean" suggestions for undefined concept references.

/// Maximum number of suggestions attached to an error.
const MAX_SUGGESTIONS: usize = 3;

/// Edit distance between `value` and `needle`, capped at `max_dist + 1`.
fn levenshtein_with_max(value: &str, needle: &[char], max_dist: usize) -> usize {
    let n = needle.len();
    if n == 0 {
        return value.chars().count().min(max_dist + 1);
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for (i, c) in value.chars().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];

        for j in 1..=n {
            let cost = if c == needle[j - 1] { 0 } else { 1 };
            let d = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            curr[j] = d;
            row_min = row_min.min(d);
        }

        if row_min > max_dist {
            return max_dist + 1;
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n].min(max_dist + 1)
}

/// Existing addresses close to `missing`, nearest first.
///
/// Both the full address and the bare name (after the namespace) are
/// compared, so `local.prodcut_id` and `prodcut_id` find `local.product_id`.
pub fn find_similar<'a, I>(missing: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let missing_name = missing.split_once('.').map(|(_, name)| name).unwrap_or(missing);
    let needle: Vec<char> = missing_name.chars().collect();
    let max_dist = (needle.len() / 3).max(2);

    let mut scored: Vec<(usize, &String)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let name = candidate.split_once('.').map(|(_, name)| name).unwrap_or(candidate);
            let distance = levenshtein_with_max(name, &needle, max_dist);
            (distance <= max_dist).then_some((distance, candidate))
        })
        .collect();
    scored.sort();
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

//! Material resolution
//!
//! A mesh references its material by path, but the synthesized materials of
//! a node's children may carry race-specific or redirected paths that don't
//! match exactly. Resolution tries exact matches on both recorded paths
//! first, then falls back to closest-edit-distance matching.

use tracing::warn;

/// A synthesized material held for one model node
#[derive(Debug, Clone)]
pub struct MaterialRecord {
    pub full_path: String,
    pub game_path: String,
    /// Scene material handle
    pub material: usize,
}

/// Resolve `reference` against the candidate records.
///
/// Exact match on either path always wins. Otherwise the candidate with the
/// smallest edit distance is chosen, comparing the reference against full
/// paths and game paths independently; ties prefer the full-path candidate.
/// No candidates means no material (the mesh is skipped by the caller).
pub fn resolve<'a>(records: &'a [MaterialRecord], reference: &str) -> Option<&'a MaterialRecord> {
    if let Some(exact) = records
        .iter()
        .find(|r| r.full_path == reference || r.game_path == reference)
    {
        return Some(exact);
    }

    let by_full = records
        .iter()
        .min_by_key(|r| levenshtein(&r.full_path, reference))?;
    let by_game = records
        .iter()
        .min_by_key(|r| levenshtein(&r.game_path, reference))?;

    let full_distance = levenshtein(&by_full.full_path, reference);
    let game_distance = levenshtein(&by_game.game_path, reference);

    let chosen = if full_distance <= game_distance {
        by_full
    } else {
        by_game
    };

    warn!(
        %reference,
        matched = %chosen.game_path,
        "No exact material match, using closest candidate"
    );
    Some(chosen)
}

/// Compute the edit distance between two strings.
///
/// Classic unit-cost Levenshtein over a dynamic-programming table; used for
/// matching default materials against race-specific ones reported by the
/// producer.
pub fn levenshtein(s: &str, t: &str) -> usize {
    let s: Vec<char> = s.chars().collect();
    let t: Vec<char> = t.chars().collect();
    let n = s.len();
    let m = t.len();

    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut previous: Vec<usize> = (0..=m).collect();
    let mut current = vec![0usize; m + 1];

    for i in 1..=n {
        current[0] = i;
        for j in 1..=m {
            let cost = if t[j - 1] == s[i - 1] { 0 } else { 1 };
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[m]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(full: &str, game: &str, material: usize) -> MaterialRecord {
        MaterialRecord {
            full_path: full.to_string(),
            game_path: game.to_string(),
            material,
        }
    }

    #[test]
    fn test_levenshtein_known_values() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_exact_match_wins_over_fuzzy() {
        let records = vec![
            record("/mt_c0101b0001_a.mtrl", "/mt_c0101b0001_a.mtrl", 0),
            record("/mt_c0201b0001_a.mtrl", "/mt_c0201b0001_a.mtrl", 1),
        ];
        // The second record is distance 1 away, but the first matches exactly
        let chosen = resolve(&records, "/mt_c0101b0001_a.mtrl").unwrap();
        assert_eq!(chosen.material, 0);
    }

    #[test]
    fn test_fuzzy_fallback_picks_closest() {
        let records = vec![
            record("/mt_c0101b0001_a.mtrl", "/mt_c0101b0001_a.mtrl", 0),
            record("/mt_c0101h0001_hir_a.mtrl", "/mt_c0101h0001_hir_a.mtrl", 1),
        ];
        let chosen = resolve(&records, "/mt_c0201b0001_a.mtrl").unwrap();
        assert_eq!(chosen.material, 0);
    }

    #[test]
    fn test_game_path_candidate_when_closer() {
        let records = vec![
            record("C:/redirected/someverylongname.mtrl", "/mt_c0101b0001_a.mtrl", 0),
            record("C:/other/equallylongredirect.mtrl", "/mt_zzz.mtrl", 1),
        ];
        let chosen = resolve(&records, "/mt_c0201b0001_a.mtrl").unwrap();
        assert_eq!(chosen.material, 0);
    }

    #[test]
    fn test_no_candidates() {
        assert!(resolve(&[], "/mt_a.mtrl").is_none());
    }

    proptest! {
        #[test]
        fn prop_identity(s in ".{0,24}") {
            prop_assert_eq!(levenshtein(&s, &s), 0);
        }

        #[test]
        fn prop_symmetry(a in ".{0,16}", b in ".{0,16}") {
            prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
        }

        #[test]
        fn prop_empty_is_length(t in ".{0,24}") {
            prop_assert_eq!(levenshtein("", &t), t.chars().count());
        }

        #[test]
        fn prop_triangle_inequality(a in ".{0,12}", b in ".{0,12}", c in ".{0,12}") {
            prop_assert!(levenshtein(&a, &c) <= levenshtein(&a, &b) + levenshtein(&b, &c));
        }
    }
}

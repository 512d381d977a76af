//! Subtitle matching for torrent file listings
//!
//! Picks the subtitle file that belongs to a video by comparing base names,
//! then ranks the candidates with an ordered table of English-preference rules.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::models::FileEntry;

/// Extensions treated as standalone subtitle files
pub const SUBTITLE_EXTENSIONS: &[&str] = &[".srt", ".ass", ".ssa", ".vtt", ".sub", ".idx"];

/// Extensions treated as playable video files
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".webm", ".avi", ".mov", ".flv", ".wmv", ".mpeg", ".mpg", ".3gp",
];

/// Ordered scoring rules, highest priority first. The first matching pattern
/// decides the score. Patterns run against the lower-cased file name and use
/// ASCII word boundaries.
pub const SCORE_RULES: &[(&str, u32)] = &[
    (r"\.eng\.srt$", 10),
    (r"\.en\.srt$", 9),
    (r"english\.srt$", 8),
    (r"eng\.srt$", 7),
    (r"(?-u:\b)english(?-u:\b)", 6),
    (r"(?-u:\b)eng(?-u:\b)", 5),
    (r"(?-u:\b)(?:en-us|en-gb)(?-u:\b)", 4),
    (r"(?-u:\b)forced(?-u:\b)", 3),
    (r"(?-u:\b)sdh(?-u:\b)", 2),
    (r"\.srt$", 1),
];

static COMPILED_RULES: LazyLock<Vec<(Regex, u32)>> = LazyLock::new(|| {
    SCORE_RULES
        .iter()
        .map(|(pattern, score)| {
            let re = Regex::new(pattern).expect("subtitle score rules are valid regexes");
            (re, *score)
        })
        .collect()
});

/// A subtitle file together with its rule score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCandidate<'a> {
    pub file: &'a FileEntry,
    pub score: u32,
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

pub fn is_subtitle_file(name: &str) -> bool {
    has_extension(name, SUBTITLE_EXTENSIONS)
}

pub fn is_video_file(name: &str) -> bool {
    has_extension(name, VIDEO_EXTENSIONS)
}

/// Name without its final extension (`"dir/movie.mkv"` -> `"dir/movie"`)
pub fn base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Base name of a subtitle file.
///
/// Strips the final extension, then a second trailing segment of at most four
/// characters including its dot, so `movie.eng.srt`, `movie.en.srt` and
/// `movie.srt` all reduce to `movie`.
pub fn subtitle_base_name(name: &str) -> &str {
    let base = base_name(name);
    match base.rfind('.') {
        Some(idx) if base.len() - idx <= 4 => &base[..idx],
        _ => base,
    }
}

/// Score a subtitle file name against [`SCORE_RULES`]. `None` when no rule applies.
pub fn score_subtitle(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    COMPILED_RULES
        .iter()
        .find(|(re, _)| re.is_match(&lower))
        .map(|(_, score)| *score)
}

fn matches_target<'a>(target_base: &'a str) -> impl Fn(&&FileEntry) -> bool + 'a {
    move |file| is_subtitle_file(&file.name) && subtitle_base_name(&file.name) == target_base
}

/// Every subtitle file sharing the target's base name that scores, in list order
pub fn rank_subtitles<'a>(target: &str, files: &'a [FileEntry]) -> Vec<MatchCandidate<'a>> {
    let target_base = base_name(target);
    files
        .iter()
        .filter(matches_target(target_base))
        .filter_map(|file| score_subtitle(&file.name).map(|score| MatchCandidate { file, score }))
        .collect()
}

/// Best English-leaning subtitle for `target`.
///
/// Single left-to-right scan; a candidate replaces the current best only with a
/// strictly higher score, so the earliest file wins ties.
pub fn find_best_subtitle<'a>(target: &str, files: &'a [FileEntry]) -> Option<&'a FileEntry> {
    let mut best: Option<MatchCandidate<'a>> = None;
    for candidate in rank_subtitles(target, files) {
        if best.as_ref().map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    best.map(|c| c.file)
}

/// First subtitle file that differs from the target only by its extension.
///
/// No language-segment stripping and no scoring: `movie.srt` matches
/// `movie.mp4`, `movie.en.srt` does not.
pub fn find_exact_base_match<'a>(target: &str, files: &'a [FileEntry]) -> Option<&'a FileEntry> {
    let target_base = base_name(target);
    files
        .iter()
        .find(|f| is_subtitle_file(&f.name) && base_name(&f.name) == target_base)
}

/// Largest video file in the listing; the first one wins on equal size
pub fn find_largest_video(files: &[FileEntry]) -> Option<&FileEntry> {
    files
        .iter()
        .filter(|f| is_video_file(&f.name))
        .fold(None, |largest: Option<&FileEntry>, f| match largest {
            Some(l) if f.size <= l.size => Some(l),
            _ => Some(f),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<FileEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| FileEntry::new(*n, 100, i as u32))
            .collect()
    }

    #[test]
    fn test_rules_compile() {
        assert_eq!(COMPILED_RULES.len(), SCORE_RULES.len());
    }

    #[test]
    fn test_rule_table_is_strictly_descending() {
        assert!(SCORE_RULES.windows(2).all(|w| w[0].1 > w[1].1));
    }

    #[test]
    fn test_subtitle_extensions_case_insensitive() {
        assert!(is_subtitle_file("Movie.SRT"));
        assert!(is_subtitle_file("movie.idx"));
        assert!(!is_subtitle_file("movie.srt.txt"));
        assert!(is_video_file("Movie.MKV"));
        assert!(!is_video_file("movie.nfo"));
    }

    #[test]
    fn test_base_names() {
        assert_eq!(base_name("movie.mp4"), "movie");
        assert_eq!(base_name("movie"), "movie");
        assert_eq!(base_name("a.b.c.mkv"), "a.b.c");
        assert_eq!(subtitle_base_name("movie.eng.srt"), "movie");
        assert_eq!(subtitle_base_name("movie.en.srt"), "movie");
        assert_eq!(subtitle_base_name("movie.srt"), "movie");
        // ".english" is longer than four characters and stays
        assert_eq!(subtitle_base_name("movie.english.srt"), "movie.english");
    }

    #[test]
    fn test_scores() {
        assert_eq!(score_subtitle("movie.eng.srt"), Some(10));
        assert_eq!(score_subtitle("movie.EN.srt"), Some(9));
        assert_eq!(score_subtitle("movie_english.srt"), Some(8));
        assert_eq!(score_subtitle("movie_eng.srt"), Some(7));
        assert_eq!(score_subtitle("movie english.ass"), Some(6));
        assert_eq!(score_subtitle("movie.eng.ass"), Some(5));
        assert_eq!(score_subtitle("movie.en-us.vtt"), Some(4));
        assert_eq!(score_subtitle("movie.forced.ass"), Some(3));
        assert_eq!(score_subtitle("movie.sdh.ass"), Some(2));
        assert_eq!(score_subtitle("movie.fr.srt"), Some(1));
        assert_eq!(score_subtitle("movie.fr.ass"), None);
    }

    #[test]
    fn test_word_boundary_is_ascii() {
        // "engine" must not count as the word "eng"
        assert_eq!(score_subtitle("engine.ass"), None);
    }

    #[test]
    fn test_prefers_eng_srt() {
        let list = files(&["movie.mp4", "movie.eng.srt", "movie.srt"]);
        let best = find_best_subtitle("movie.mp4", &list).unwrap();
        assert_eq!(best.name, "movie.eng.srt");
    }

    #[test]
    fn test_generic_srt_fallback() {
        let list = files(&["movie.mp4", "movie.fr.srt"]);
        let best = find_best_subtitle("movie.mp4", &list).unwrap();
        assert_eq!(best.name, "movie.fr.srt");
    }

    #[test]
    fn test_no_subtitles() {
        let list = files(&["movie.mp4"]);
        assert!(find_best_subtitle("movie.mp4", &list).is_none());
        assert!(find_exact_base_match("movie.mp4", &list).is_none());
        assert!(find_best_subtitle("movie.mp4", &[]).is_none());
    }

    #[test]
    fn test_base_name_must_match() {
        let list = files(&["other.eng.srt", "movie.mp4"]);
        assert!(find_best_subtitle("movie.mp4", &list).is_none());
    }

    #[test]
    fn test_tie_keeps_first() {
        let list = files(&["movie.srt", "movie.de.srt"]);
        let best = find_best_subtitle("movie.mp4", &list).unwrap();
        assert_eq!(best.index, 0);
    }

    #[test]
    fn test_unscored_candidates_excluded() {
        let list = files(&["movie.de.ass", "movie.ass"]);
        assert!(find_best_subtitle("movie.mkv", &list).is_none());
        // ...but the exact variant does not score at all
        assert_eq!(find_exact_base_match("movie.mkv", &list).unwrap().name, "movie.ass");
    }

    #[test]
    fn test_exact_match_ignores_language_segment() {
        let list = files(&["movie.en.srt", "movie.srt"]);
        assert_eq!(find_exact_base_match("movie.mp4", &list).unwrap().index, 1);
        assert!(find_exact_base_match("movie.mp4", &list[..1]).is_none());
        assert_eq!(find_best_subtitle("movie.mp4", &list[..1]).unwrap().index, 0);
    }

    #[test]
    fn test_deterministic() {
        let list = files(&["movie.mp4", "movie.sdh.srt", "movie.forced.srt", "movie.en.srt"]);
        let first = find_best_subtitle("movie.mp4", &list).map(|f| f.index);
        for _ in 0..10 {
            assert_eq!(find_best_subtitle("movie.mp4", &list).map(|f| f.index), first);
        }
        assert_eq!(first, Some(3));
    }

    #[test]
    fn test_rank_subtitles_reports_scores() {
        let list = files(&["movie.mkv", "movie.eng.srt", "movie.srt", "notes.txt"]);
        let ranked = rank_subtitles("movie.mkv", &list);
        let scores: Vec<u32> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![10, 1]);
    }

    #[test]
    fn test_largest_video() {
        let list = vec![
            FileEntry::new("sample.mkv", 10, 0),
            FileEntry::new("movie.mkv", 900, 1),
            FileEntry::new("extras.iso", 5000, 2),
            FileEntry::new("movie-copy.mp4", 900, 3),
        ];
        assert_eq!(find_largest_video(&list).unwrap().index, 1);
        assert!(find_largest_video(&list[2..3]).is_none());
    }
}
